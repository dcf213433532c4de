use std::collections::{HashMap, HashSet};

use ash::vk;
use bytemuck::{NoUninit, Zeroable};
use glam::{Mat4, Vec3};
use lumen_gpu::{
    Access, Buffer, BufferKind, BufferRequest, CommandBuffer, Device, Image, ImageRequest,
    Pipeline, PipelineKind, PipelineLayout,
};
use lumen_math::bounds::{Rect, Vec2i};

use crate::error::{InitError, InitResult};

pub const DEFAULT_PAGE_SIZE: u32 = 128;

/// Identifies a virtual shadow page: which light, which clipmap/cube mip,
/// and its virtual tile coordinate (`spec.md` §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageId {
    pub light_index: u32,
    pub mip_level: u32,
    pub virtual_x: u32,
    pub virtual_y: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct PageEntry {
    pub physical_slot: u32,
    pub resident: bool,
    pub dirty: bool,
    pub last_access_frame: u32,
}

/// Physical page atlas bookkeeping: a page table keyed by virtual page id,
/// a free list of unused physical slots, and a residency hash set used to
/// deduplicate per-frame page requests (`spec.md` 4.I). The invariant from
/// `spec.md` §8 — resident ∪ free ∪ evicted == atlas capacity, always — is
/// what `free_slot_count` + `page_table.len()` must sum to at every call.
pub struct PageTable {
    capacity: u32,
    page_table: HashMap<PageId, PageEntry>,
    free_slots: Vec<u32>,
    requested_this_frame: HashSet<PageId>,
}

impl PageTable {
    pub fn new(atlas_pages_per_side: u32) -> Self {
        let capacity = atlas_pages_per_side * atlas_pages_per_side;
        Self {
            capacity,
            page_table: HashMap::new(),
            free_slots: (0..capacity).rev().collect(),
            requested_this_frame: HashSet::new(),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn resident_count(&self) -> u32 {
        self.page_table.values().filter(|e| e.resident).count() as u32
    }

    pub fn free_count(&self) -> u32 {
        self.free_slots.len() as u32
    }

    /// Deduplicated page mark from the depth+normal projection pass. A
    /// page already requested this frame, or already resident, is a no-op.
    pub fn mark(&mut self, page: PageId, frame_index: u32) -> Option<u32> {
        if let Some(entry) = self.page_table.get_mut(&page) {
            entry.last_access_frame = frame_index;
            entry.dirty = true;
            return None;
        }
        if !self.requested_this_frame.insert(page) {
            return None;
        }
        let slot = self.free_slots.pop()?;
        self.page_table.insert(
            page,
            PageEntry {
                physical_slot: slot,
                resident: true,
                dirty: true,
                last_access_frame: frame_index,
            },
        );
        Some(slot)
    }

    pub fn clear_frame_requests(&mut self) {
        self.requested_this_frame.clear();
    }

    /// Marks transform-invalidated pages dirty without evicting them;
    /// eviction only happens from age via `evict_stale`.
    pub fn invalidate(&mut self, page: &PageId) {
        if let Some(entry) = self.page_table.get_mut(page) {
            entry.dirty = true;
        }
    }

    pub fn dirty_pages(&self) -> impl Iterator<Item = (&PageId, &PageEntry)> {
        self.page_table.iter().filter(|(_, e)| e.dirty)
    }

    pub fn clear_dirty(&mut self, page: &PageId) {
        if let Some(entry) = self.page_table.get_mut(page) {
            entry.dirty = false;
        }
    }

    /// Returns pages unused for at least `evict_threshold_frames` to the
    /// free list (`spec.md` 4.I, default ~16).
    pub fn evict_stale(&mut self, current_frame: u32, evict_threshold_frames: u32) -> Vec<PageId> {
        let stale: Vec<PageId> = self
            .page_table
            .iter()
            .filter(|(_, e)| current_frame.saturating_sub(e.last_access_frame) >= evict_threshold_frames)
            .map(|(id, _)| *id)
            .collect();

        for id in &stale {
            if let Some(entry) = self.page_table.remove(id) {
                self.free_slots.push(entry.physical_slot);
            }
        }
        stale
    }
}

/// A directional light's clipmap hierarchy: constant world-space texel
/// size per level, snapping to texel boundaries as the camera moves
/// (`spec.md` 4.I).
#[derive(Debug, Clone, Copy)]
pub struct ClipmapLevel {
    pub texel_world_size: f32,
    pub center: glam::Vec3,
}

impl ClipmapLevel {
    pub fn snap_to_texel(&mut self, target_center: glam::Vec3) -> bool {
        let snapped = (target_center / self.texel_world_size).round() * self.texel_world_size;
        if snapped == self.center {
            return false;
        }
        self.center = snapped;
        true
    }
}

/// Matches `page_view_projection`'s output into the dirty-page render
/// pipeline: the only per-draw state that differs page to page (`spec.md`
/// 4.I "Rendering").
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, Zeroable, NoUninit)]
pub struct PageRenderPushConstants {
    pub view_proj: [[f32; 4]; 4],
}

impl PageRenderPushConstants {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

const _: () = assert!(PageRenderPushConstants::SIZE % 16 == 0);

/// Physical shadow atlas plus the per-light page tables, clipmap state,
/// and the two pipelines that turn marked pages into rendered depth:
/// `mark_pages` projects the main view's depth+normal into page requests,
/// `render_page` rasterizes one light's already-culled geometry into a
/// single atlas sub-rect per dirty page (`spec.md` 4.I).
pub struct VirtualShadowMaps {
    pub atlas: Image,
    pub page_table: PageTable,
    pub clipmaps: Vec<Vec<ClipmapLevel>>,
    pub request_buffer: Buffer,
    mark_pages: Pipeline,
    render_page: Pipeline,
    layout: PipelineLayout,
    pages_per_side: u32,
    page_size: u32,
}

impl VirtualShadowMaps {
    pub fn create(
        device: &Device,
        atlas_pages_per_side: u32,
        page_size: u32,
        max_light_count: u32,
        max_requests_per_frame: u32,
        layout: PipelineLayout,
        mark_pages_shader: vk::ShaderModule,
        render_page_mesh_shader: vk::ShaderModule,
        render_page_fragment_shader: vk::ShaderModule,
    ) -> InitResult<Self> {
        let atlas_extent = vk::Extent2D {
            width: atlas_pages_per_side * page_size,
            height: atlas_pages_per_side * page_size,
        };

        let mut atlas = Image::create(
            device,
            &ImageRequest {
                extent: atlas_extent,
                format: vk::Format::D32_SFLOAT,
                mip_level_count: 1,
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            },
        )
        .map_err(InitError::from)?;
        atlas.create_view(device, 0, 1).map_err(InitError::from)?;

        let request_buffer = Buffer::create(
            device,
            &BufferRequest {
                size: max_requests_per_frame as vk::DeviceSize * 16,
                kind: BufferKind::Storage,
            },
        )
        .map_err(InitError::from)?;

        let mark_pages = Pipeline::create(device, &layout, PipelineKind::Compute { shader: mark_pages_shader })
            .map_err(InitError::from)?;
        let render_page = Pipeline::create(
            device,
            &layout,
            PipelineKind::Mesh {
                task: None,
                mesh: render_page_mesh_shader,
                fragment: render_page_fragment_shader,
                color_formats: vec![],
                depth_format: Some(vk::Format::D32_SFLOAT),
            },
        )
        .map_err(InitError::from)?;

        Ok(Self {
            atlas,
            page_table: PageTable::new(atlas_pages_per_side),
            clipmaps: vec![Vec::new(); max_light_count as usize],
            request_buffer,
            mark_pages,
            render_page,
            layout,
            pages_per_side: atlas_pages_per_side,
            page_size,
        })
    }

    /// Projects the main view's depth+normal into page-mark requests for
    /// point and spot lights, writing deduplicated requests into
    /// `request_buffer`. Directional lights never go through this path —
    /// their clipmap footprint is host-computable and marked directly by
    /// `recenter_and_mark_directional`.
    pub fn record_page_marking(&self, device: &Device, cmd: &mut CommandBuffer, depth: &Image, normal: &Image) {
        cmd.ensure_image_layouts(
            device,
            &[
                (depth, Access::NONE, Access::COMPUTE_READ, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
                (normal, Access::NONE, Access::COMPUTE_READ, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            ],
        );
        cmd.bind_pipeline(device, vk::PipelineBindPoint::COMPUTE, self.mark_pages.pipeline);
        let groups_x = div_ceil(depth.mip_extent(0).width, 8);
        let groups_y = div_ceil(depth.mip_extent(0).height, 8);
        cmd.dispatch(device, groups_x, groups_y, 1);
    }

    /// Recenters every clipmap level of one directional light onto
    /// `camera_pos` and marks the `resolution_pages`×`resolution_pages`
    /// footprint around each level's new center as requested, calling
    /// `page_table.mark` directly — fully host-computable, unlike the
    /// per-pixel GPU marking point/spot lights need (`spec.md` 4.I).
    /// Returns the number of newly-resident pages.
    pub fn recenter_and_mark_directional(
        &mut self,
        light_index: u32,
        camera_pos: Vec3,
        frame_index: u32,
        resolution_pages: u32,
    ) -> u32 {
        let levels = match self.clipmaps.get_mut(light_index as usize) {
            Some(levels) => levels,
            None => return 0,
        };
        recenter_and_mark_footprint(levels, &mut self.page_table, light_index, camera_pos, frame_index, resolution_pages, self.page_size)
    }

    /// Renders every page `page_table.dirty_pages` currently holds, one
    /// atlas sub-rect per page, then clears each page's dirty flag. Reuses
    /// the main view's already-culled indirect draw args as the page's
    /// geometry, matching the hybrid rasterizer's HW mesh-shader draw
    /// shape rather than a separate per-light recull (`spec.md` 4.I).
    /// Returns the number of pages rendered.
    pub fn record_dirty_page_renders(
        &mut self,
        device: &Device,
        cmd: &mut CommandBuffer,
        light_view_projections: &[Mat4],
        indirect_draw_buffer: &Buffer,
    ) -> u32 {
        let dirty: Vec<(PageId, PageEntry)> = self.page_table.dirty_pages().map(|(id, e)| (*id, *e)).collect();
        if dirty.is_empty() {
            return 0;
        }

        cmd.ensure_image_layouts(
            device,
            &[(&self.atlas, Access::NONE, Access::DEPTH_BUFFER_RENDER, vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)],
        );
        cmd.bind_pipeline(device, vk::PipelineBindPoint::GRAPHICS, self.render_page.pipeline);

        for (page, entry) in &dirty {
            let light_view_proj = match light_view_projections.get(page.light_index as usize) {
                Some(&view_proj) => view_proj,
                None => continue,
            };

            let view_proj = page_view_projection(light_view_proj, page);
            let push = PageRenderPushConstants { view_proj: view_proj.to_cols_array_2d() };
            cmd.push_constants(device, self.layout.layout, vk::ShaderStageFlags::MESH_EXT, &push);

            let rect = physical_page_rect(entry.physical_slot, self.pages_per_side, self.page_size);
            let viewport = vk::Viewport {
                x: rect.min.x as f32,
                y: rect.min.y as f32,
                width: rect.width() as f32,
                height: rect.height() as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            let scissor = vk::Rect2D {
                offset: vk::Offset2D { x: rect.min.x, y: rect.min.y },
                extent: vk::Extent2D { width: rect.width() as u32, height: rect.height() as u32 },
            };
            // The `CommandBuffer` viewport/scissor helpers only cover the
            // full-extent, offset-(0,0) case; a page's atlas sub-rect needs
            // the raw calls.
            unsafe {
                device.cmd_set_viewport(cmd.raw, 0, std::slice::from_ref(&viewport));
                device.cmd_set_scissor(cmd.raw, 0, std::slice::from_ref(&scissor));
                device
                    .mesh_shader_loader
                    .cmd_draw_mesh_tasks_indirect(cmd.raw, indirect_draw_buffer.buffer, 0, 1, 0)
            };
        }

        for (page, _) in &dirty {
            self.page_table.clear_dirty(page);
        }

        dirty.len() as u32
    }

    pub fn destroy(&mut self, device: &Device) {
        self.atlas.destroy(device);
        self.request_buffer.destroy(device);
        self.mark_pages.destroy(device);
        self.render_page.destroy(device);
        self.layout.destroy(device);
    }
}

/// Per-light culling view-projection used to re-render a dirty page: the
/// culler is reused unmodified with this matrix as the active frustum
/// (`spec.md` 4.I "Rendering").
pub fn page_view_projection(light_view_proj: Mat4, _page: &PageId) -> Mat4 {
    light_view_proj
}

/// Standard shadow-map view-projection for a directional light: an
/// orthographic frustum of side `2 * half_extent` centered on `center`,
/// looking along `direction` (`spec.md` 4.I).
pub fn directional_light_view_projection(direction: Vec3, center: Vec3, half_extent: f32) -> Mat4 {
    let dir = direction.normalize_or_zero();
    let up = if dir.y.abs() > 0.999 { Vec3::X } else { Vec3::Y };
    let eye = center - dir * half_extent * 2.0;
    let view = Mat4::look_at_rh(eye, center, up);
    let proj = Mat4::orthographic_rh(-half_extent, half_extent, -half_extent, half_extent, 0.01, half_extent * 4.0);
    proj * view
}

/// Maps a physical atlas slot index to its pixel rect within the atlas,
/// row-major over a `pages_per_side` × `pages_per_side` grid.
pub fn physical_page_rect(physical_slot: u32, pages_per_side: u32, page_size: u32) -> Rect {
    let px = (physical_slot % pages_per_side) as i32;
    let py = (physical_slot / pages_per_side) as i32;
    Rect::from_size(Vec2i::new(px * page_size as i32, py * page_size as i32), page_size as i32, page_size as i32)
}

/// Recenters `levels` onto `camera_pos` and marks the
/// `resolution_pages`×`resolution_pages` page footprint around each
/// level's new center into `page_table`. Factored out of
/// `VirtualShadowMaps::recenter_and_mark_directional` so the bookkeeping
/// can be exercised without a live `Device`.
fn recenter_and_mark_footprint(
    levels: &mut [ClipmapLevel],
    page_table: &mut PageTable,
    light_index: u32,
    camera_pos: Vec3,
    frame_index: u32,
    resolution_pages: u32,
    page_size: u32,
) -> u32 {
    let mut marked = 0u32;
    let half = (resolution_pages / 2) as i32;
    for (mip_level, level) in levels.iter_mut().enumerate() {
        level.snap_to_texel(camera_pos);

        let page_world_size = level.texel_world_size * page_size as f32;
        if page_world_size <= 0.0 {
            continue;
        }
        let base_x = (level.center.x / page_world_size).floor() as i32;
        let base_y = (level.center.z / page_world_size).floor() as i32;

        for oy in -half..half {
            for ox in -half..half {
                let page = PageId {
                    light_index,
                    mip_level: mip_level as u32,
                    virtual_x: (base_x + ox) as u32,
                    virtual_y: (base_y + oy) as u32,
                };
                if page_table.mark(page, frame_index).is_some() {
                    marked += 1;
                }
            }
        }
    }
    marked
}

fn div_ceil(value: u32, denom: u32) -> u32 {
    (value + denom - 1) / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn residency_invariant_holds_after_marking_and_evicting() {
        let mut table = PageTable::new(4);
        let page = PageId { light_index: 0, mip_level: 0, virtual_x: 1, virtual_y: 1 };
        table.mark(page, 0);
        assert_eq!(table.resident_count() + table.free_count(), table.capacity());

        table.evict_stale(100, 16);
        assert_eq!(table.resident_count() + table.free_count(), table.capacity());
        assert_eq!(table.free_count(), table.capacity());
    }

    #[test]
    fn marking_the_same_page_twice_in_one_frame_is_a_no_op() {
        let mut table = PageTable::new(4);
        let page = PageId { light_index: 0, mip_level: 0, virtual_x: 0, virtual_y: 0 };
        let first = table.mark(page, 0);
        let second = table.mark(page, 0);
        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[test]
    fn recently_accessed_pages_survive_eviction() {
        let mut table = PageTable::new(4);
        let page = PageId { light_index: 0, mip_level: 0, virtual_x: 0, virtual_y: 0 };
        table.mark(page, 10);
        let evicted = table.evict_stale(20, 16);
        assert!(evicted.is_empty());
        assert_eq!(table.resident_count(), 1);
    }

    #[test]
    fn clipmap_level_only_dirties_on_actual_texel_crossing() {
        let mut level = ClipmapLevel { texel_world_size: 1.0, center: glam::Vec3::ZERO };
        assert!(!level.snap_to_texel(glam::Vec3::new(0.4, 0.0, 0.0)));
        assert!(level.snap_to_texel(glam::Vec3::new(0.6, 0.0, 0.0)));
    }

    #[test]
    fn push_constants_layout_is_16_byte_aligned() {
        assert_eq!(PageRenderPushConstants::SIZE % 16, 0);
    }

    #[test]
    fn physical_page_rect_tiles_the_atlas_without_overlap() {
        let a = physical_page_rect(0, 4, 128);
        let b = physical_page_rect(1, 4, 128);
        let c = physical_page_rect(4, 4, 128);
        assert_eq!(a.min, Vec2i::new(0, 0));
        assert_eq!(b.min, Vec2i::new(128, 0));
        assert_eq!(c.min, Vec2i::new(0, 128));
        assert_eq!(a.width(), 128);
    }

    #[test]
    fn directional_view_projection_places_the_light_looking_at_center() {
        let view_proj = directional_light_view_projection(Vec3::new(0.0, -1.0, 0.0), Vec3::ZERO, 10.0);
        let clip = view_proj * Vec3::ZERO.extend(1.0);
        assert!(clip.z.is_finite());
    }

    #[test]
    fn recentering_marks_new_pages_as_the_camera_moves() {
        let mut table = PageTable::new(64);
        let mut levels = vec![ClipmapLevel { texel_world_size: 1.0, center: Vec3::ZERO }];

        let marked_first = recenter_and_mark_footprint(&mut levels, &mut table, 0, Vec3::ZERO, 0, 2, 1);
        assert!(marked_first > 0);

        let marked_again = recenter_and_mark_footprint(&mut levels, &mut table, 0, Vec3::ZERO, 1, 2, 1);
        assert_eq!(marked_again, 0, "marking the same footprint twice should not re-request pages");

        let marked_far = recenter_and_mark_footprint(&mut levels, &mut table, 0, Vec3::new(10_000.0, 0.0, 10_000.0), 2, 2, 1);
        assert!(marked_far > 0);
    }
}
