use lumen_math::bounds::{Rect, Vec2i};

/// Row-shelf 2D bin packer: hands out exact-size rectangles from a growing
/// free-list, splitting whichever free rect fits best. Used both by the
/// surface cache's six-card-per-mesh packer and the mesh SDF atlas.
///
/// Grounded on the same free/used-rect splitting strategy as the glyph
/// atlas packer in the teacher's font-SDF crate, generalized from floats
/// to integer texel coordinates and decoupled from glyph shapes.
pub struct AtlasAllocator {
    free_rects: Vec<Rect>,
    used_rects: Vec<Rect>,
    width: i32,
    height: i32,
}

impl AtlasAllocator {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            free_rects: vec![Rect::from_size(Vec2i::new(0, 0), width, height)],
            used_rects: Vec::new(),
            width,
            height,
        }
    }

    /// Allocates a rectangle of exactly `width` x `height` texels, or
    /// `None` if nothing in the free list is large enough.
    pub fn alloc(&mut self, width: i32, height: i32) -> Option<Rect> {
        let index = self
            .free_rects
            .iter()
            .position(|r| r.width() >= width && r.height() >= height)?;

        let area = self.free_rects.swap_remove(index);

        let allocated = Rect::from_size(area.min, width, height);

        // Split the remainder into a right-of and below-of margin, mirroring
        // the shelf-splitting rule the glyph atlas packer uses.
        let right_margin = Rect {
            min: Vec2i::new(area.min.x + width, area.min.y),
            max: Vec2i::new(area.max.x, area.min.y + height),
        };
        let bottom_margin = Rect {
            min: Vec2i::new(area.min.x, area.min.y + height),
            max: area.max,
        };

        if right_margin.area() > 0 {
            self.free_rects.push(right_margin);
        }
        if bottom_margin.area() > 0 {
            self.free_rects.push(bottom_margin);
        }

        self.free_rects.sort_unstable_by_key(|r| r.area());
        self.used_rects.push(allocated);

        Some(allocated)
    }

    pub fn used_area(&self) -> i64 {
        self.used_rects.iter().map(Rect::area).sum()
    }

    pub fn capacity(&self) -> i64 {
        self.width as i64 * self.height as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_never_overlap() {
        let mut atlas = AtlasAllocator::new(256, 256);
        let mut rects = Vec::new();
        for _ in 0..16 {
            rects.push(atlas.alloc(32, 32).expect("atlas has room for 16 32x32 tiles"));
        }

        for (i, a) in rects.iter().enumerate() {
            for b in &rects[i + 1..] {
                let overlap = a.min.x < b.max.x
                    && a.max.x > b.min.x
                    && a.min.y < b.max.y
                    && a.max.y > b.min.y;
                assert!(!overlap, "allocated rects {a:?} and {b:?} overlap");
            }
        }
    }

    #[test]
    fn used_area_never_exceeds_capacity() {
        let mut atlas = AtlasAllocator::new(64, 64);
        while atlas.alloc(8, 8).is_some() {}
        assert!(atlas.used_area() <= atlas.capacity());
    }

    #[test]
    fn oversized_request_fails_cleanly() {
        let mut atlas = AtlasAllocator::new(16, 16);
        assert!(atlas.alloc(32, 32).is_none());
    }
}
