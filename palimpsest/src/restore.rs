// Copyright 2025 the Palimpsest Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Invalidation, resolution and replay of recorded history.

use palimpsest_atlas::ImageId;
use palimpsest_driver::{GraphicsDriver, PixelRect};

use crate::graph::Node;
use crate::images::State;
use crate::log::LogEntry;
use crate::{Error, Result};

impl<D: GraphicsDriver> State<D> {
    /// Marks every image that reads from `node`, directly or not, as stale.
    ///
    /// When `node` has been disposed, the invalidated images are also
    /// flagged as orphaned until their next snapshot.
    pub(crate) fn mark_dependents_stale(&mut self, node: Node) {
        let orphaned = match node {
            Node::Image(id) => self.images.get(&id).is_none_or(|img| img.disposed),
            Node::Shader(id) => self.shaders.program(id).is_err(),
        };
        let dependents = self.graph.transitive_dependents(node);
        for dependent in dependents {
            let Node::Image(id) = dependent else {
                continue;
            };
            if let Some(img) = self.images.get_mut(&id)
                && !img.disposed
                && !img.volatile
            {
                img.make_stale();
                img.orphaned |= orphaned;
            }
            self.graph.clear_dependencies(dependent);
        }
    }

    /// Reads every stale image back into its base snapshot.
    #[tracing::instrument(skip_all)]
    pub(crate) fn resolve_stale_images(&mut self) -> Result<usize> {
        if self.driver.is_context_lost() {
            return Ok(0);
        }
        let mut stale: Vec<ImageId> = self
            .images
            .iter()
            .filter(|(_, img)| img.stale && !img.disposed && !img.volatile)
            .map(|(id, _)| *id)
            .collect();
        stale.sort_unstable();

        for &id in &stale {
            let bounds = self.image(id)?.bounds();
            let pixels = self.pool.read_pixels(&mut self.driver, id, bounds)?;
            self.image_mut(id)?.set_base(pixels);
        }
        if !stale.is_empty() {
            tracing::info!(count = stale.len(), "resolved stale images");
        }
        Ok(stale.len())
    }

    /// Recreates every texture and program from recorded history.
    ///
    /// Every history is checked before any texture is touched. A failure
    /// leaves the restore pending, so the next call tries again.
    #[tracing::instrument(skip_all)]
    pub(crate) fn restore_if_needed(&mut self) -> Result<bool> {
        let lost = self.driver.is_context_lost();
        if !lost && !self.restore_pending {
            return Ok(false);
        }
        self.restore_pending = true;
        let order = self.plan_restore()?;

        if lost {
            self.driver.reset_context()?;
            self.pool.forget_backends();
        } else {
            self.pool.release_backends(&mut self.driver);
        }
        let shaders = self.shaders.recompile(&mut self.driver, !lost)?;

        self.pool.set_usage_tracking(false);
        let replayed = self.replay_all(&order);
        self.pool.set_usage_tracking(true);
        replayed?;

        self.restore_pending = false;
        tracing::info!(images = order.len(), shaders, lost, "restored images");
        Ok(true)
    }

    /// Replay order of every live image, or the first reason replay would fail.
    fn plan_restore(&self) -> Result<Vec<ImageId>> {
        let live: Vec<ImageId> = self
            .images
            .iter()
            .filter(|(_, img)| !img.disposed)
            .map(|(id, _)| *id)
            .collect();
        let (order, stalled) = self.graph.sorted(&live);
        if stalled > 0 {
            return Err(Error::BrokenInvariant("image history contains a cycle"));
        }

        for &id in &order {
            let img = self.image(id)?;
            if img.volatile || img.evicted {
                continue;
            }
            if img.stale {
                return Err(if img.orphaned {
                    Error::DanglingDependency(id)
                } else {
                    Error::BrokenInvariant("stale image at restore")
                });
            }
            for entry in &img.log {
                let LogEntry::DrawTriangles(draw) = entry else {
                    continue;
                };
                let sources_live = draw
                    .sources
                    .iter()
                    .flatten()
                    .all(|src| self.images.get(src).is_some_and(|img| !img.disposed));
                let shader_live = draw
                    .shader
                    .is_none_or(|shader| self.shaders.program(shader).is_ok());
                if !sources_live || !shader_live {
                    return Err(Error::DanglingDependency(id));
                }
            }
        }
        Ok(order)
    }

    fn replay_all(&mut self, order: &[ImageId]) -> Result<()> {
        for &id in order {
            self.replay(id)?;
        }

        // Collapse replayed logs so the next loss starts from a snapshot.
        for &id in order {
            let img = self.image(id)?;
            if img.log.is_empty() {
                continue;
            }
            let bounds = img.bounds();
            let pixels = self.pool.read_pixels(&mut self.driver, id, bounds)?;
            self.image_mut(id)?.set_base(pixels);
            self.graph.clear_dependencies(Node::Image(id));
        }
        Ok(())
    }

    fn replay(&mut self, id: ImageId) -> Result<()> {
        let img = self.image_mut(id)?;
        if img.volatile || img.evicted {
            // Placement is lazy; a cleared image needs no texture yet.
            return Ok(());
        }
        let bounds = img.bounds();
        let base = img.base.take();
        let log = core::mem::take(&mut img.log);

        let result = self.replay_history(id, bounds, base.as_deref(), &log);

        let img = self.image_mut(id)?;
        img.base = base;
        img.log = log;
        result
    }

    fn replay_history(
        &mut self,
        id: ImageId,
        bounds: PixelRect,
        base: Option<&[u8]>,
        log: &[LogEntry],
    ) -> Result<()> {
        if let Some(base) = base {
            self.pool
                .replace_pixels(&mut self.driver, id, bounds, base)?;
        }
        for entry in log {
            match entry {
                LogEntry::ReplacePixels { rect, pixels } => {
                    self.pool
                        .replace_pixels(&mut self.driver, id, *rect, pixels)?;
                }
                LogEntry::DrawTriangles(draw) => {
                    let program = draw
                        .shader
                        .map(|shader| self.shaders.program(shader))
                        .transpose()
                        .map_err(|_| Error::DanglingDependency(id))?;
                    self.pool
                        .draw_triangles(&mut self.driver, id, &draw.as_atlas_draw(program))?;
                }
            }
        }
        Ok(())
    }
}
