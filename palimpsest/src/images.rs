// Copyright 2025 the Palimpsest Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use hashbrown::HashMap;
use palimpsest_atlas::{AtlasDraw, BackendPool, ImageId};
use palimpsest_driver::{
    AddressMode, ColorMatrix, Compose, Filter, GraphicsDriver, MAX_SOURCES, PixelRect, Region,
};
use parking_lot::{Mutex, MutexGuard};

use crate::graph::{DependencyGraph, Node};
use crate::image::{RestorableImage, crop};
use crate::log::{LogEntry, RecordedDraw};
use crate::shader::ShaderRegistry;
use crate::{Config, Error, Result, ShaderId};

/// Arguments of [`Images::draw_triangles`], in logical image coordinates.
///
/// Vertex destination positions are relative to the destination image and
/// source positions relative to `sources[0]`.
#[derive(Clone, Debug)]
pub struct DrawTriangles<'a> {
    /// Sampled images.
    pub sources: [Option<ImageId>; MAX_SOURCES],
    /// Offset from slot 0's coordinates to slots `1..`.
    pub source_offsets: [[f32; 2]; MAX_SOURCES - 1],
    /// Interleaved vertices, see [`palimpsest_driver::VERTEX_FLOATS`].
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
    /// Destination clip, or `None` for the whole destination.
    pub dst_region: Option<Region>,
    /// Source region, or `None` for the whole of `sources[0]`.
    pub src_region: Option<Region>,
    /// Custom shader; `None` uses built-in shading.
    pub shader: Option<ShaderId>,
    /// Shader uniforms.
    pub uniforms: &'a [f32],
    /// Drop the sources' history after this draw.
    ///
    /// Useful for scratch images that are drawn once and then discarded: the
    /// destination is marked stale instead of recording the draw, and each
    /// source restores as cleared.
    pub evict: bool,
}

impl<'a> DrawTriangles<'a> {
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
            shader: None,
            uniforms: &[],
            evict: false,
        }
    }
}

#[derive(Debug)]
pub(crate) struct State<D> {
    pub(crate) driver: D,
    pub(crate) config: Config,
    pub(crate) pool: BackendPool,
    pub(crate) images: HashMap<ImageId, RestorableImage>,
    pub(crate) shaders: ShaderRegistry,
    pub(crate) graph: DependencyGraph,
    /// A restore was requested or did not complete.
    pub(crate) restore_pending: bool,
}

impl<D: GraphicsDriver> State<D> {
    pub(crate) fn image(&self, id: ImageId) -> Result<&RestorableImage> {
        match self.images.get(&id) {
            None => Err(Error::UnknownImage(id)),
            Some(img) if img.disposed => Err(Error::Disposed(id)),
            Some(img) => Ok(img),
        }
    }

    pub(crate) fn image_mut(&mut self, id: ImageId) -> Result<&mut RestorableImage> {
        match self.images.get_mut(&id) {
            None => Err(Error::UnknownImage(id)),
            Some(img) if img.disposed => Err(Error::Disposed(id)),
            Some(img) => Ok(img),
        }
    }

    fn checked_rect(&self, id: ImageId, rect: Option<PixelRect>) -> Result<PixelRect> {
        let img = self.image(id)?;
        let rect = rect.unwrap_or_else(|| img.bounds());
        if !rect.fits_within(img.width, img.height) {
            return Err(Error::OutOfBounds { image: id, rect });
        }
        Ok(rect)
    }

    fn new_image(&mut self, width: u32, height: u32) -> Result<ImageId> {
        let id = self.pool.new_image(width, height)?;
        self.images.insert(id, RestorableImage::new(width, height));
        Ok(id)
    }

    fn replace_pixels(
        &mut self,
        id: ImageId,
        pixels: &[u8],
        rect: Option<PixelRect>,
    ) -> Result<()> {
        let rect = self.checked_rect(id, rect)?;
        if pixels.len() != rect.byte_len() {
            return Err(Error::InvalidPixelLength {
                expected: rect.byte_len(),
                actual: pixels.len(),
            });
        }

        self.mark_dependents_stale(Node::Image(id));
        self.pool
            .replace_pixels(&mut self.driver, id, rect, pixels)?;

        let max_log_len = self.config.max_log_len;
        let img = self.image_mut(id)?;
        if img.volatile {
            return Ok(());
        }
        if rect == img.bounds() {
            img.set_base(pixels.to_vec());
            self.graph.clear_dependencies(Node::Image(id));
        } else if img.stale || img.evicted {
            // History is already gone; a partial write cannot rebuild it.
        } else if img.log.is_empty() {
            img.patch_base(rect, pixels);
        } else if img.log.len() >= max_log_len {
            img.make_stale();
            self.graph.clear_dependencies(Node::Image(id));
        } else {
            img.log.push(LogEntry::ReplacePixels {
                rect,
                pixels: pixels.to_vec(),
            });
        }
        Ok(())
    }

    fn draw_triangles(&mut self, dst: ImageId, draw: &DrawTriangles<'_>) -> Result<()> {
        self.image(dst)?;
        for src in draw.sources.iter().flatten() {
            if *src == dst {
                return Err(Error::SourceIsDestination(dst));
            }
            self.image(*src)?;
        }
        let program = draw.shader.map(|s| self.shaders.program(s)).transpose()?;
        if draw.vertices.is_empty() || draw.indices.is_empty() {
            return Ok(());
        }

        self.mark_dependents_stale(Node::Image(dst));
        let atlas_draw = AtlasDraw {
            sources: draw.sources,
            source_offsets: draw.source_offsets,
            vertices: draw.vertices,
            indices: draw.indices,
            color_matrix: draw.color_matrix,
            composite: draw.composite,
            filter: draw.filter,
            address: draw.address,
            dst_region: draw.dst_region,
            src_region: draw.src_region,
            program,
            uniforms: draw.uniforms,
        };
        self.pool
            .draw_triangles(&mut self.driver, dst, &atlas_draw)?;

        self.record_draw(dst, draw)?;
        if draw.evict {
            for src in draw.sources.iter().flatten() {
                self.evict(*src)?;
            }
        }
        Ok(())
    }

    fn record_draw(&mut self, dst: ImageId, draw: &DrawTriangles<'_>) -> Result<()> {
        let mut sources_restorable = true;
        for src in draw.sources.iter().flatten() {
            sources_restorable &= self.image(*src)?.is_restorable();
        }
        let max_log_len = self.config.max_log_len;
        let img = self.image_mut(dst)?;
        if img.volatile || img.stale {
            return Ok(());
        }
        if draw.evict || !sources_restorable || img.log.len() >= max_log_len {
            img.make_stale();
            self.graph.clear_dependencies(Node::Image(dst));
            return Ok(());
        }

        let entry = LogEntry::DrawTriangles(Box::new(RecordedDraw::record(draw)));
        let deps = entry.dependencies();
        img.log.push(entry);
        for dep in deps {
            self.graph.add_dependency(Node::Image(dst), dep);
        }
        Ok(())
    }

    /// Drops `id`'s history after an evicting draw.
    fn evict(&mut self, id: ImageId) -> Result<()> {
        self.mark_dependents_stale(Node::Image(id));
        let img = self.image_mut(id)?;
        if img.volatile {
            return Ok(());
        }
        img.clear_history();
        img.stale = false;
        img.evicted = true;
        self.graph.clear_dependencies(Node::Image(id));
        Ok(())
    }

    fn pixels(&mut self, id: ImageId, rect: Option<PixelRect>) -> Result<Vec<u8>> {
        let rect = self.checked_rect(id, rect)?;
        self.restore_if_needed()?;

        let img = self.image(id)?;
        let bounds = img.bounds();
        if img.volatile || !(img.stale || !img.log.is_empty()) {
            return Ok(self.pool.read_pixels(&mut self.driver, id, rect)?);
        }

        let full = self.pool.read_pixels(&mut self.driver, id, bounds)?;
        let out = if rect == bounds {
            full.clone()
        } else {
            crop(&full, bounds.width, rect)
        };
        self.image_mut(id)?.set_base(full);
        self.graph.clear_dependencies(Node::Image(id));
        Ok(out)
    }

    fn mark_disposed(&mut self, id: ImageId) {
        let Some(img) = self.images.get(&id) else {
            return;
        };
        if img.disposed {
            tracing::warn!(image = ?id, "image disposed twice");
            return;
        }
        if let Some(img) = self.images.get_mut(&id) {
            img.clear_history();
            img.disposed = true;
        }
        self.mark_dependents_stale(Node::Image(id));
        self.graph.remove_node(Node::Image(id));
        self.pool.mark_disposed(id);
    }

    fn set_volatile(&mut self, id: ImageId, volatile: bool) -> Result<()> {
        let img = self.image_mut(id)?;
        if img.volatile == volatile {
            return Ok(());
        }
        img.volatile = volatile;
        img.clear_history();
        img.evicted = false;
        // Leaving volatile mode: the live pixels become the base at the next resolve.
        img.stale = !volatile;
        self.graph.clear_dependencies(Node::Image(id));
        self.mark_dependents_stale(Node::Image(id));
        self.pool.set_volatile(&mut self.driver, id, volatile)?;
        Ok(())
    }

    fn dispose_shader(&mut self, id: ShaderId) -> Result<()> {
        if self.shaders.dispose(&mut self.driver, id)? {
            self.mark_dependents_stale(Node::Shader(id));
            self.graph.remove_node(Node::Shader(id));
        } else {
            tracing::warn!(shader = ?id, "shader disposed twice");
        }
        Ok(())
    }

    fn put_images_on_atlas(&mut self) -> Result<()> {
        if self.driver.is_context_lost() {
            return Ok(());
        }
        self.pool.reconcile(&mut self.driver)?;
        Ok(())
    }
}

/// Thread-safe image manager over a [`GraphicsDriver`].
///
/// See the [crate documentation](crate) for an overview.
#[derive(Debug)]
pub struct Images<D> {
    state: Mutex<State<D>>,
}

impl<D: GraphicsDriver> Images<D> {
    /// Takes ownership of `driver`.
    ///
    /// The configured maximum backend size is clamped to the driver's
    /// maximum texture size.
    pub fn new(driver: D, config: Config) -> Self {
        let pool = BackendPool::new(config.atlas.clone(), driver.max_texture_size());
        Self {
            state: Mutex::new(State {
                driver,
                config,
                pool,
                images: HashMap::new(),
                shaders: ShaderRegistry::default(),
                graph: DependencyGraph::default(),
                restore_pending: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<D>> {
        self.state.lock()
    }

    /// Releases every texture and program and returns the driver.
    pub fn teardown(self) -> D {
        let State {
            mut driver,
            mut pool,
            mut shaders,
            ..
        } = self.state.into_inner();
        pool.teardown(&mut driver);
        shaders.teardown(&mut driver);
        driver
    }

    /// Registers a transparent `width × height` image.
    ///
    /// No texture is allocated until the image is first written or drawn.
    pub fn new_image(&self, width: u32, height: u32) -> Result<ImageId> {
        self.lock().new_image(width, height)
    }

    /// Disposes an image. Never fails; unknown or disposed handles are
    /// ignored.
    ///
    /// Images whose history reads from it become stale. Its texture space is
    /// released at the next [`flush_deferred`](Self::flush_deferred).
    pub fn mark_disposed(&self, id: ImageId) {
        self.lock().mark_disposed(id);
    }

    /// Overwrites `rect` (default: the whole image) with premultiplied RGBA8
    /// `pixels`.
    pub fn replace_pixels(&self, id: ImageId, pixels: &[u8], rect: Option<PixelRect>) -> Result<()> {
        self.lock().replace_pixels(id, pixels, rect)
    }

    /// Draws triangles into `dst`.
    pub fn draw_triangles(&self, dst: ImageId, draw: &DrawTriangles<'_>) -> Result<()> {
        self.lock().draw_triangles(dst, draw)
    }

    /// Reads `rect` (default: the whole image), restoring first if the
    /// context was lost.
    pub fn pixels(&self, id: ImageId, rect: Option<PixelRect>) -> Result<Vec<u8>> {
        self.lock().pixels(id, rect)
    }

    /// Marks an image as frequently rewritten.
    ///
    /// Volatile images record no history, always live on a dedicated
    /// texture, and come back cleared after a context loss.
    pub fn set_volatile(&self, id: ImageId, volatile: bool) -> Result<()> {
        self.lock().set_volatile(id, volatile)
    }

    /// Compiles a shader and retains its source for recompilation.
    pub fn new_shader(&self, source: &str) -> Result<ShaderId> {
        let mut state = self.lock();
        let state = &mut *state;
        state.shaders.create(&mut state.driver, source)
    }

    /// Releases a shader. Images whose history uses it become stale.
    pub fn dispose_shader(&self, id: ShaderId) -> Result<()> {
        self.lock().dispose_shader(id)
    }

    /// Captures every stale image's pixels into a fresh base snapshot.
    ///
    /// Does nothing while the context is lost. Returns the number of images
    /// resolved.
    pub fn resolve_stale_images(&self) -> Result<usize> {
        self.lock().resolve_stale_images()
    }

    /// Rebuilds every texture from recorded history if the context was lost.
    ///
    /// Returns `true` if a restore ran.
    pub fn restore_if_needed(&self) -> Result<bool> {
        self.lock().restore_if_needed()
    }

    /// Runs the once-per-frame placement pass of the backend pool.
    pub fn put_images_on_atlas(&self) -> Result<()> {
        self.lock().put_images_on_atlas()
    }

    /// Releases texture space of disposed images. Returns how many were
    /// released.
    pub fn flush_deferred(&self) -> usize {
        let mut state = self.lock();
        let state = &mut *state;
        state.pool.flush_deferred(&mut state.driver)
    }

    /// End-of-frame housekeeping: flush disposals, reconcile placement and
    /// resolve stale images.
    pub fn end_frame(&self) -> Result<()> {
        let mut state = self.lock();
        state.put_images_on_atlas()?;
        state.resolve_stale_images()?;
        Ok(())
    }

    /// Returns `true` if `id` lives on a shared texture.
    pub fn is_on_atlas(&self, id: ImageId) -> bool {
        self.lock().pool.is_on_atlas(id)
    }

    /// Moves `id` to a dedicated texture, as a draw into it would.
    pub fn ensure_isolated(&self, id: ImageId) -> Result<()> {
        let mut state = self.lock();
        let state = &mut *state;
        state.pool.ensure_isolated(&mut state.driver, id)?;
        Ok(())
    }

    /// Whether `id`'s history has been invalidated and awaits a resolve.
    pub fn is_stale(&self, id: ImageId) -> Result<bool> {
        Ok(self.lock().image(id)?.stale)
    }

    /// Current base snapshot of `id`; `None` means transparent.
    pub fn base_pixels(&self, id: ImageId) -> Result<Option<Vec<u8>>> {
        Ok(self.lock().image(id)?.base.clone())
    }

    /// Number of recorded operations on top of `id`'s base snapshot.
    pub fn log_len(&self, id: ImageId) -> Result<usize> {
        Ok(self.lock().image(id)?.log.len())
    }

    /// Makes the next [`restore_if_needed`](Self::restore_if_needed) run
    /// even though the context is intact.
    pub fn force_restore(&self) {
        self.lock().restore_pending = true;
    }

    /// Number of live backend textures.
    pub fn backend_count(&self) -> usize {
        self.lock().pool.backend_count()
    }

    /// Overrides the backend size bounds. Existing backends keep their size.
    pub fn set_backend_sizes_for_testing(&self, min_size: u32, max_size: u32) {
        self.lock().pool.set_backend_sizes_for_testing(min_size, max_size);
    }

    /// Runs `f` with exclusive access to the driver.
    pub fn with_driver<R>(&self, f: impl FnOnce(&mut D) -> R) -> R {
        f(&mut self.lock().driver)
    }
}
