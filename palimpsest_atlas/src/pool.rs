// Copyright 2025 the Palimpsest Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use hashbrown::HashMap;
use palimpsest_driver::{
    AddressMode, ColorMatrix, Compose, DrawCall, DriverError, Filter, GraphicsDriver, MAX_SOURCES,
    PixelRect, ProgramId, QUAD_INDICES, Region, TextureId, VERTEX_FLOATS, quad_vertices,
};
use palimpsest_packing::RegionAllocator;

use crate::backend::{Backend, BackendInfo, from_packing, to_packing};
use crate::{AtlasConfig, AtlasError, AtlasImage, BackendId, ImageId, Placement};

/// A draw expressed in logical image coordinates.
///
/// Vertex destination positions are relative to the destination image and
/// source positions relative to source slot 0.
#[derive(Clone, Debug)]
pub struct AtlasDraw<'a> {
    /// Sampled images; slot 0 drives the vertex source coordinates.
    pub sources: [Option<ImageId>; MAX_SOURCES],
    /// Offset from slot 0's coordinates to slots `1..`, in logical texels.
    pub source_offsets: [[f32; 2]; MAX_SOURCES - 1],
    /// Interleaved vertices (see [`VERTEX_FLOATS`]).
    pub vertices: &'a [f32],
    /// Triangle-list indices.
    pub indices: &'a [u16],
    /// Color transform for built-in shading.
    pub color_matrix: ColorMatrix,
    /// Porter-Duff operator.
    pub composite: Compose,
    /// Sampling filter.
    pub filter: Filter,
    /// Sampling behaviour outside `src_region`.
    pub address: AddressMode,
    /// Destination clip, or `None` for the whole destination image.
    pub dst_region: Option<Region>,
    /// Source region for `address`, or `None` for the whole slot-0 image.
    pub src_region: Option<Region>,
    /// Custom program.
    pub program: Option<ProgramId>,
    /// Program uniforms.
    pub uniforms: &'a [f32],
}

impl<'a> AtlasDraw<'a> {
    /// A source-over draw of `vertices` with no sources.
    pub fn new(vertices: &'a [f32], indices: &'a [u16]) -> Self {
        Self {
            sources: [None; MAX_SOURCES],
            source_offsets: [[0.0; 2]; MAX_SOURCES - 1],
            vertices,
            indices,
            color_matrix: ColorMatrix::IDENTITY,
            composite: Compose::SrcOver,
            filter: Filter::Nearest,
            address: AddressMode::Unsafe,
            dst_region: None,
            src_region: None,
            program: None,
            uniforms: &[],
        }
    }
}

/// Owner of every backend and every logical image's placement.
#[derive(Debug)]
pub struct BackendPool {
    config: AtlasConfig,
    min_size: u32,
    max_size: u32,
    /// Live backends in creation order.
    backends: Vec<Backend>,
    next_backend: u32,
    images: HashMap<ImageId, AtlasImage>,
    next_image: u32,
    deferred: Vec<ImageId>,
    track_usage: bool,
}

#[allow(
    clippy::cast_precision_loss,
    reason = "texture coordinates are far below f32's exact integer range"
)]
fn texel(v: u32) -> f32 {
    v as f32
}

fn intersect(a: Region, b: Region) -> Region {
    let x0 = a.x.max(b.x);
    let y0 = a.y.max(b.y);
    let x1 = (a.x + a.width).min(b.x + b.width);
    let y1 = (a.y + a.height).min(b.y + b.height);
    Region::new(x0, y0, (x1 - x0).max(0.0), (y1 - y0).max(0.0))
}

/// Copies `src_rect` of `src` to `(dst_x, dst_y)` in `dst` with a plain draw.
fn copy_texture(
    driver: &mut dyn GraphicsDriver,
    src: TextureId,
    src_rect: PixelRect,
    dst: TextureId,
    dst_x: u32,
    dst_y: u32,
) -> Result<(), DriverError> {
    let src_region = Region::from(src_rect);
    let dst_region = Region::from(PixelRect::new(dst_x, dst_y, src_rect.width, src_rect.height));
    let vertices = quad_vertices(dst_region, src_region, [1.0; 4]);
    driver.draw_triangles(&DrawCall {
        destination: dst,
        sources: [Some(src), None, None, None],
        source_offsets: [[0.0; 2]; MAX_SOURCES - 1],
        vertices: &vertices,
        indices: &QUAD_INDICES,
        color_matrix: ColorMatrix::IDENTITY,
        composite: Compose::Copy,
        filter: Filter::Nearest,
        address: AddressMode::Unsafe,
        dst_region,
        src_region,
        program: None,
        uniforms: &[],
    })
}

impl BackendPool {
    /// Creates an empty pool for a driver whose textures may be at most
    /// `max_texture_size` per edge.
    pub fn new(config: AtlasConfig, max_texture_size: u32) -> Self {
        let max_size = config
            .max_size
            .map_or(max_texture_size, |m| m.min(max_texture_size))
            .max(1);
        let min_size = config.min_size.clamp(1, max_size);
        Self {
            config,
            min_size,
            max_size,
            backends: Vec::new(),
            next_backend: 0,
            images: HashMap::new(),
            next_image: 0,
            deferred: Vec::new(),
            track_usage: true,
        }
    }

    /// Pool configuration.
    pub fn config(&self) -> &AtlasConfig {
        &self.config
    }

    /// Effective smallest backend edge.
    pub fn min_size(&self) -> u32 {
        self.min_size
    }

    /// Effective largest backend edge.
    pub fn max_size(&self) -> u32 {
        self.max_size
    }

    /// Overrides the backend size bounds.
    ///
    /// Only meant for tests; existing backends keep their size.
    pub fn set_backend_sizes_for_testing(&mut self, min_size: u32, max_size: u32) {
        self.max_size = max_size.max(1);
        self.min_size = min_size.clamp(1, self.max_size);
    }

    /// Enables or disables usage counting for promotion decisions.
    ///
    /// Replays during restoration run with counting disabled so that they do
    /// not look like fresh application activity.
    pub fn set_usage_tracking(&mut self, enabled: bool) {
        self.track_usage = enabled;
    }

    /// Registers a new, unplaced image.
    pub fn new_image(&mut self, width: u32, height: u32) -> Result<ImageId, AtlasError> {
        if width == 0 || height == 0 {
            return Err(AtlasError::InvalidSize { width, height });
        }
        if width > self.max_size || height > self.max_size {
            return Err(AtlasError::NoSpace {
                width,
                height,
                max_size: self.max_size,
            });
        }
        let id = ImageId(self.next_image);
        self.next_image += 1;
        self.images.insert(id, AtlasImage::new(width, height));
        Ok(id)
    }

    /// Bookkeeping for `id`, including images awaiting their deferred free.
    pub fn image(&self, id: ImageId) -> Option<&AtlasImage> {
        self.images.get(&id)
    }

    /// Returns `true` if `id` lives on a shared backend.
    pub fn is_on_atlas(&self, id: ImageId) -> bool {
        self.images
            .get(&id)
            .and_then(|img| img.placement)
            .and_then(|p| self.backend_ref(p.backend))
            .is_some_and(|b| !b.is_isolated())
    }

    /// Backend currently hosting `id`.
    pub fn backend_of(&self, id: ImageId) -> Option<BackendId> {
        self.images.get(&id)?.placement.map(|p| p.backend)
    }

    /// Snapshot of one backend.
    pub fn backend(&self, id: BackendId) -> Option<BackendInfo> {
        self.backend_ref(id).map(Backend::info)
    }

    /// Snapshots of every live backend, in creation order.
    pub fn backends(&self) -> impl Iterator<Item = BackendInfo> + '_ {
        self.backends.iter().map(Backend::info)
    }

    /// Number of live backends.
    pub fn backend_count(&self) -> usize {
        self.backends.len()
    }

    fn backend_ref(&self, id: BackendId) -> Option<&Backend> {
        self.backends.iter().find(|b| b.id == id)
    }

    fn backend_index(&self, id: BackendId) -> Option<usize> {
        self.backends.iter().position(|b| b.id == id)
    }

    fn texture(&self, image: ImageId, placement: Placement) -> Result<TextureId, AtlasError> {
        self.backend_ref(placement.backend)
            .map(|b| b.texture)
            .ok_or(AtlasError::UnknownImage(image))
    }

    fn live(&self, id: ImageId) -> Result<&AtlasImage, AtlasError> {
        match self.images.get(&id) {
            None => Err(AtlasError::UnknownImage(id)),
            Some(img) if img.disposed => Err(AtlasError::Disposed(id)),
            Some(img) => Ok(img),
        }
    }

    fn live_mut(&mut self, id: ImageId) -> Result<&mut AtlasImage, AtlasError> {
        match self.images.get_mut(&id) {
            None => Err(AtlasError::UnknownImage(id)),
            Some(img) if img.disposed => Err(AtlasError::Disposed(id)),
            Some(img) => Ok(img),
        }
    }

    fn fits_shared(&self, width: u32, height: u32) -> bool {
        let pad = self.config.padding.saturating_mul(2);
        width.saturating_add(pad) <= self.max_size && height.saturating_add(pad) <= self.max_size
    }

    /// Doubles from the minimum size until `needed` fits, capped at the maximum.
    fn grow(&self, needed: u32) -> u32 {
        let mut size = self.min_size;
        while size < needed && size < self.max_size {
            size = size.saturating_mul(2).min(self.max_size);
        }
        size
    }

    fn next_backend_id(&mut self) -> BackendId {
        let id = BackendId(self.next_backend);
        self.next_backend += 1;
        id
    }

    /// Places `id` if it has no backend yet and returns its placement.
    ///
    /// Volatile and oversized images, and images that were isolated before
    /// their backends were forgotten, get a dedicated backend.
    pub fn ensure_placed(
        &mut self,
        driver: &mut dyn GraphicsDriver,
        id: ImageId,
    ) -> Result<Placement, AtlasError> {
        let img = self.live(id)?;
        if let Some(p) = img.placement {
            return Ok(p);
        }
        let (width, height) = (img.width, img.height);
        let isolated = img.volatile || img.prefer_isolated || !self.fits_shared(width, height);
        let placement = if isolated {
            self.create_isolated(driver, id, width, height)?
        } else {
            self.allocate_shared(driver, id, width, height)?
        };
        let img = self.live_mut(id)?;
        img.placement = Some(placement);
        img.prefer_isolated = false;
        Ok(placement)
    }

    fn create_isolated(
        &mut self,
        driver: &mut dyn GraphicsDriver,
        id: ImageId,
        width: u32,
        height: u32,
    ) -> Result<Placement, AtlasError> {
        if width > self.max_size || height > self.max_size {
            return Err(AtlasError::NoSpace {
                width,
                height,
                max_size: self.max_size,
            });
        }
        let (tw, th) = (self.grow(width), self.grow(height));
        let texture = driver.create_texture(tw, th)?;
        let backend = self.next_backend_id();
        let rect = PixelRect::new(0, 0, width, height);
        self.backends
            .push(Backend::isolated(backend, texture, tw, th, id, rect));
        tracing::debug!(?backend, ?texture, width = tw, height = th, image = ?id, "created isolated backend");
        Ok(Placement { backend, rect })
    }

    fn allocate_shared(
        &mut self,
        driver: &mut dyn GraphicsDriver,
        id: ImageId,
        width: u32,
        height: u32,
    ) -> Result<Placement, AtlasError> {
        for index in 0..self.backends.len() {
            if let Some(rect) = self.try_place_in(driver, index, width, height)? {
                return self.occupy(driver, index, id, from_packing(rect));
            }
        }

        let pad = self.config.padding.saturating_mul(2);
        let tw = self.grow(width.saturating_add(pad));
        let th = self.grow(height.saturating_add(pad));
        let texture = driver.create_texture(tw, th)?;
        let backend = self.next_backend_id();
        let mut shared = Backend::shared(backend, texture, tw, th, self.config.padding);
        let allocated = shared
            .allocator
            .as_mut()
            .map(|a| a.allocate(width, height));
        let Some(Ok(rect)) = allocated else {
            driver.dispose_texture(texture);
            return Err(AtlasError::NoSpace {
                width,
                height,
                max_size: self.max_size,
            });
        };
        shared.occupants.insert(id, from_packing(rect));
        self.backends.push(shared);
        tracing::debug!(?backend, ?texture, width = tw, height = th, "created shared backend");
        let index = self.backends.len() - 1;
        self.clear_region(driver, index, id, from_packing(rect))
    }

    /// Reserves room in backend `index`, growing its page if that helps.
    fn try_place_in(
        &mut self,
        driver: &mut dyn GraphicsDriver,
        index: usize,
        width: u32,
        height: u32,
    ) -> Result<Option<palimpsest_packing::Rect>, AtlasError> {
        let max = self.max_size;
        let Some(allocator) = self.backends[index].allocator.as_mut() else {
            return Ok(None);
        };
        if let Ok(rect) = allocator.allocate(width, height) {
            return Ok(Some(rect));
        }

        let mut grown = allocator.clone();
        let rect = loop {
            let (w, h) = grown.size();
            let next = (w.saturating_mul(2).min(max), h.saturating_mul(2).min(max));
            if next == (w, h) {
                return Ok(None);
            }
            grown.extend(next.0, next.1);
            if let Ok(rect) = grown.allocate(width, height) {
                break rect;
            }
        };
        self.extend_backend(driver, index, grown)?;
        Ok(Some(rect))
    }

    /// Swaps backend `index` onto a larger texture, keeping its contents.
    fn extend_backend(
        &mut self,
        driver: &mut dyn GraphicsDriver,
        index: usize,
        grown: RegionAllocator,
    ) -> Result<(), AtlasError> {
        let (width, height) = grown.size();
        let new_texture = driver.create_texture(width, height)?;
        let backend = &self.backends[index];
        let old = backend.texture;
        let old_rect = PixelRect::full(backend.width, backend.height);
        if let Err(err) = copy_texture(driver, old, old_rect, new_texture, 0, 0) {
            driver.dispose_texture(new_texture);
            return Err(err.into());
        }
        driver.dispose_texture(old);

        let backend = &mut self.backends[index];
        tracing::debug!(
            backend = ?backend.id,
            from = ?(backend.width, backend.height),
            to = ?(width, height),
            "extended shared backend"
        );
        backend.texture = new_texture;
        backend.width = width;
        backend.height = height;
        backend.allocator = Some(grown);
        Ok(())
    }

    fn occupy(
        &mut self,
        driver: &mut dyn GraphicsDriver,
        index: usize,
        id: ImageId,
        rect: PixelRect,
    ) -> Result<Placement, AtlasError> {
        self.backends[index].occupants.insert(id, rect);
        self.clear_region(driver, index, id, rect)
    }

    /// Clears a fresh shared region and its padding; freed space may hold old pixels.
    fn clear_region(
        &mut self,
        driver: &mut dyn GraphicsDriver,
        index: usize,
        id: ImageId,
        rect: PixelRect,
    ) -> Result<Placement, AtlasError> {
        let backend = &self.backends[index];
        let placement = Placement {
            backend: backend.id,
            rect,
        };
        let padded = from_packing(to_packing(rect).outset(self.config.padding));
        let zeros = vec![0; padded.byte_len()];
        if let Err(err) = driver.upload_pixels(backend.texture, padded, &zeros) {
            self.release_placement(driver, id, placement);
            return Err(err.into());
        }
        Ok(placement)
    }

    /// Frees `id`'s region in `placement`, destroying the backend if it empties.
    fn release_placement(
        &mut self,
        driver: &mut dyn GraphicsDriver,
        id: ImageId,
        placement: Placement,
    ) {
        let Some(index) = self.backend_index(placement.backend) else {
            return;
        };
        if self.backends[index].release(id) {
            let backend = self.backends.remove(index);
            driver.dispose_texture(backend.texture);
            tracing::debug!(backend = ?backend.id, texture = ?backend.texture, "destroyed backend");
        }
    }

    /// Moves `id` onto a dedicated backend, copying its pixels.
    ///
    /// Images that were never placed are allocated isolated directly; images
    /// already isolated are left alone.
    pub fn ensure_isolated(
        &mut self,
        driver: &mut dyn GraphicsDriver,
        id: ImageId,
    ) -> Result<Placement, AtlasError> {
        let img = self.live(id)?;
        let (width, height) = (img.width, img.height);
        let Some(current) = img.placement else {
            let placement = self.create_isolated(driver, id, width, height)?;
            let img = self.live_mut(id)?;
            img.placement = Some(placement);
            img.prefer_isolated = false;
            return Ok(placement);
        };
        if self
            .backend_ref(current.backend)
            .is_some_and(Backend::is_isolated)
        {
            return Ok(current);
        }

        let from = self.texture(id, current)?;
        let placement = self.create_isolated(driver, id, width, height)?;
        let to = self.texture(id, placement)?;
        if let Err(err) = copy_texture(driver, from, current.rect, to, 0, 0) {
            self.release_placement(driver, id, placement);
            return Err(err.into());
        }
        self.release_placement(driver, id, current);

        let img = self.live_mut(id)?;
        img.placement = Some(placement);
        img.isolation_count += 1;
        img.idle_count = 0;
        tracing::debug!(image = ?id, isolations = img.isolation_count, "isolated image");
        Ok(placement)
    }

    /// Moves an isolated image onto a shared backend.
    ///
    /// Returns `false` when the image is not isolated or no shared backend
    /// can take it.
    fn promote(&mut self, driver: &mut dyn GraphicsDriver, id: ImageId) -> Result<bool, AtlasError> {
        let img = self.live(id)?;
        let (width, height) = (img.width, img.height);
        let Some(current) = img.placement else {
            return Ok(false);
        };
        if !self
            .backend_ref(current.backend)
            .is_some_and(Backend::is_isolated)
        {
            return Ok(false);
        }

        let from = self.texture(id, current)?;
        let placement = match self.allocate_shared(driver, id, width, height) {
            Ok(p) => p,
            Err(AtlasError::NoSpace { .. }) => return Ok(false),
            Err(err) => return Err(err),
        };
        let to = self.texture(id, placement)?;
        if let Err(err) = copy_texture(driver, from, current.rect, to, placement.rect.x, placement.rect.y) {
            self.release_placement(driver, id, placement);
            return Err(err.into());
        }
        self.release_placement(driver, id, current);

        let img = self.live_mut(id)?;
        img.placement = Some(placement);
        img.idle_count = 0;
        tracing::debug!(image = ?id, backend = ?placement.backend, "promoted image to shared backend");
        Ok(true)
    }

    /// Marks `id` volatile (or not). Volatile images are isolated at once.
    pub fn set_volatile(
        &mut self,
        driver: &mut dyn GraphicsDriver,
        id: ImageId,
        volatile: bool,
    ) -> Result<(), AtlasError> {
        let img = self.live_mut(id)?;
        img.volatile = volatile;
        if volatile && img.placement.is_some() {
            self.ensure_isolated(driver, id)?;
        }
        Ok(())
    }

    fn note_destination(&mut self, id: ImageId) {
        if !self.track_usage {
            return;
        }
        if let Some(img) = self.images.get_mut(&id) {
            img.used_as_destination_count += 1;
            img.idle_count = 0;
        }
    }

    fn note_source(&mut self, id: ImageId) {
        if !self.track_usage {
            return;
        }
        if let Some(img) = self.images.get_mut(&id) {
            img.used_as_source_count += 1;
        }
    }

    /// Overwrites `rect` of `id` with `pixels`, placing the image if needed.
    ///
    /// Shared images are written in place.
    pub fn replace_pixels(
        &mut self,
        driver: &mut dyn GraphicsDriver,
        id: ImageId,
        rect: PixelRect,
        pixels: &[u8],
    ) -> Result<(), AtlasError> {
        let img = self.live(id)?;
        if !rect.fits_within(img.width, img.height) {
            return Err(AtlasError::OutOfBounds { image: id, rect });
        }
        if pixels.len() != rect.byte_len() {
            return Err(AtlasError::PixelLength {
                expected: rect.byte_len(),
                actual: pixels.len(),
            });
        }
        let placement = self.ensure_placed(driver, id)?;
        let texture = self.texture(id, placement)?;
        driver.upload_pixels(
            texture,
            rect.translate(placement.rect.x, placement.rect.y),
            pixels,
        )?;
        self.note_destination(id);
        Ok(())
    }

    /// Reads `rect` of `id`. Images that were never placed read as transparent.
    pub fn read_pixels(
        &mut self,
        driver: &mut dyn GraphicsDriver,
        id: ImageId,
        rect: PixelRect,
    ) -> Result<Vec<u8>, AtlasError> {
        let img = self.live(id)?;
        if !rect.fits_within(img.width, img.height) {
            return Err(AtlasError::OutOfBounds { image: id, rect });
        }
        let Some(placement) = img.placement else {
            return Ok(vec![0; rect.byte_len()]);
        };
        let texture = self.texture(id, placement)?;
        Ok(driver.read_pixels(texture, rect.translate(placement.rect.x, placement.rect.y))?)
    }

    /// Draws into `dst`, isolating it first and translating every coordinate
    /// from logical image space to physical texture space.
    pub fn draw_triangles(
        &mut self,
        driver: &mut dyn GraphicsDriver,
        dst: ImageId,
        draw: &AtlasDraw<'_>,
    ) -> Result<(), AtlasError> {
        let dst_bounds = self.live(dst)?.bounds();
        for src in draw.sources.iter().flatten() {
            if *src == dst {
                return Err(AtlasError::SourceIsDestination(dst));
            }
            self.live(*src)?;
        }
        if draw.vertices.is_empty() || draw.indices.is_empty() {
            return Ok(());
        }

        let dst_placement = self.ensure_isolated(driver, dst)?;
        let mut placements = [None; MAX_SOURCES];
        for (slot, src) in draw.sources.iter().enumerate() {
            if let Some(src) = src {
                placements[slot] = Some((*src, self.ensure_placed(driver, *src)?));
            }
        }
        let destination = self.texture(dst, dst_placement)?;
        let mut sources = [None; MAX_SOURCES];
        for (slot, entry) in placements.iter().enumerate() {
            if let Some((src, placement)) = entry {
                sources[slot] = Some(self.texture(*src, *placement)?);
            }
        }

        let (dx, dy) = (texel(dst_placement.rect.x), texel(dst_placement.rect.y));
        let origin = placements[0].map(|(_, p)| (texel(p.rect.x), texel(p.rect.y)));

        let mut vertices = draw.vertices.to_vec();
        for v in vertices.chunks_exact_mut(VERTEX_FLOATS) {
            v[0] += dx;
            v[1] += dy;
            if let Some((sx, sy)) = origin {
                v[2] += sx;
                v[3] += sy;
            }
        }

        let mut source_offsets = draw.source_offsets;
        if let Some((sx, sy)) = origin {
            for (offset, entry) in source_offsets.iter_mut().zip(&placements[1..]) {
                if let Some((_, p)) = entry {
                    offset[0] += texel(p.rect.x) - sx;
                    offset[1] += texel(p.rect.y) - sy;
                }
            }
        }

        let dst_full = Region::from(dst_bounds);
        let dst_region = intersect(draw.dst_region.unwrap_or(dst_full), dst_full).translate(dx, dy);
        let src_region = match (placements[0], origin) {
            (Some((_, p)), Some((sx, sy))) => draw
                .src_region
                .unwrap_or_else(|| Region::from(PixelRect::full(p.rect.width, p.rect.height)))
                .translate(sx, sy),
            _ => draw.src_region.unwrap_or_default(),
        };

        driver.draw_triangles(&DrawCall {
            destination,
            sources,
            source_offsets,
            vertices: &vertices,
            indices: draw.indices,
            color_matrix: draw.color_matrix,
            composite: draw.composite,
            filter: draw.filter,
            address: draw.address,
            dst_region,
            src_region,
            program: draw.program,
            uniforms: draw.uniforms,
        })?;

        self.note_destination(dst);
        for src in draw.sources.iter().flatten() {
            self.note_source(*src);
        }
        Ok(())
    }

    /// Once-per-frame placement pass.
    ///
    /// Flushes deferred frees, then walks isolated, shareable images: an image
    /// written this cycle stays put with its idle count reset; an image only
    /// read this cycle gains one idle cycle and is promoted once it reaches
    /// the threshold for its isolation count; an image not used at all is
    /// left untouched. Per-cycle counters are reset afterwards.
    pub fn reconcile(&mut self, driver: &mut dyn GraphicsDriver) -> Result<(), AtlasError> {
        self.flush_deferred(driver);

        let mut candidates: Vec<ImageId> = self
            .images
            .iter()
            .filter(|(_, img)| !img.volatile && !img.disposed)
            .filter(|(_, img)| self.fits_shared(img.width, img.height))
            .filter(|(_, img)| {
                img.placement
                    .and_then(|p| self.backend_ref(p.backend))
                    .is_some_and(Backend::is_isolated)
            })
            .map(|(id, _)| *id)
            .collect();
        candidates.sort_unstable();

        let mut promoted = 0_usize;
        for id in candidates {
            let Some(img) = self.images.get_mut(&id) else {
                continue;
            };
            if img.used_as_destination_count > 0 {
                img.idle_count = 0;
                continue;
            }
            if img.used_as_source_count == 0 {
                continue;
            }
            img.idle_count += 1;
            let threshold = self.config.promotion_threshold(img.isolation_count);
            if u64::from(img.idle_count) >= threshold && self.promote(driver, id)? {
                promoted += 1;
            }
        }

        for img in self.images.values_mut() {
            img.used_as_source_count = 0;
            img.used_as_destination_count = 0;
        }
        if promoted > 0 {
            tracing::debug!(promoted, backends = self.backends.len(), "reconciled atlas");
        }
        Ok(())
    }

    /// Queues `id` for release at the next flush. Never fails.
    ///
    /// Returns `false` if the image was unknown or already disposed.
    pub fn mark_disposed(&mut self, id: ImageId) -> bool {
        match self.images.get_mut(&id) {
            Some(img) if !img.disposed => {
                img.disposed = true;
                self.deferred.push(id);
                true
            }
            Some(_) => {
                tracing::warn!(image = ?id, "image disposed twice");
                false
            }
            None => false,
        }
    }

    /// Releases every queued image, destroying backends that become empty.
    ///
    /// Returns the number of images released.
    pub fn flush_deferred(&mut self, driver: &mut dyn GraphicsDriver) -> usize {
        let pending = core::mem::take(&mut self.deferred);
        let count = pending.len();
        for id in pending {
            let Some(img) = self.images.remove(&id) else {
                continue;
            };
            if let Some(placement) = img.placement {
                self.release_placement(driver, id, placement);
            }
        }
        if count > 0 {
            tracing::debug!(count, backends = self.backends.len(), "flushed deferred disposals");
        }
        count
    }

    /// Drops every backend without driver calls, after the driver lost them.
    ///
    /// Images stay registered but unplaced; images that were isolated will
    /// be isolated again on their next placement. Queued disposals complete.
    pub fn forget_backends(&mut self) {
        for id in self.deferred.drain(..) {
            self.images.remove(&id);
        }
        for img in self.images.values_mut() {
            if let Some(p) = img.placement.take() {
                img.prefer_isolated = self
                    .backends
                    .iter()
                    .find(|b| b.id == p.backend)
                    .is_some_and(Backend::is_isolated);
            }
            img.used_as_source_count = 0;
            img.used_as_destination_count = 0;
            img.idle_count = 0;
        }
        tracing::debug!(backends = self.backends.len(), "forgot backends");
        self.backends.clear();
    }

    /// Like [`forget_backends`](Self::forget_backends), for a context that is
    /// still alive: textures are disposed first.
    pub fn release_backends(&mut self, driver: &mut dyn GraphicsDriver) {
        for backend in &self.backends {
            driver.dispose_texture(backend.texture);
        }
        self.forget_backends();
    }

    /// Releases every texture and image.
    pub fn teardown(&mut self, driver: &mut dyn GraphicsDriver) {
        for backend in self.backends.drain(..) {
            driver.dispose_texture(backend.texture);
        }
        self.images.clear();
        self.deferred.clear();
    }
}
