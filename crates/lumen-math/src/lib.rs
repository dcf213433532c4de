//! Small math helpers shared by the culling, HZB, and GI subsystems.
//!
//! Everything here is plain data and free functions so it can be exercised
//! in unit tests without a device.

pub mod bounds;
pub mod frustum;
pub mod halton;
pub mod octahedral;
pub mod toroidal;

pub use glam::{Mat4, Vec2, Vec3, Vec4};

pub mod prelude {
    pub use crate::bounds::*;
    pub use crate::frustum::*;
    pub use glam::{Mat4, Vec2, Vec3, Vec4};
}
