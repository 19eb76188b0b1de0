// Copyright 2025 the Palimpsest Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use palimpsest_atlas::{AtlasDraw, ImageId};
use palimpsest_driver::{
    AddressMode, ColorMatrix, Compose, Filter, MAX_SOURCES, PixelRect, ProgramId, Region,
};
use smallvec::SmallVec;

use crate::ShaderId;
use crate::graph::Node;
use crate::images::DrawTriangles;

/// One recorded pixel-affecting operation.
#[derive(Clone, Debug)]
pub(crate) enum LogEntry {
    ReplacePixels { rect: PixelRect, pixels: Vec<u8> },
    DrawTriangles(Box<RecordedDraw>),
}

/// Owned copy of a [`DrawTriangles`] call.
#[derive(Clone, Debug)]
pub(crate) struct RecordedDraw {
    pub(crate) sources: [Option<ImageId>; MAX_SOURCES],
    pub(crate) source_offsets: [[f32; 2]; MAX_SOURCES - 1],
    pub(crate) vertices: Vec<f32>,
    pub(crate) indices: Vec<u16>,
    pub(crate) color_matrix: ColorMatrix,
    pub(crate) composite: Compose,
    pub(crate) filter: Filter,
    pub(crate) address: AddressMode,
    pub(crate) dst_region: Option<Region>,
    pub(crate) src_region: Option<Region>,
    pub(crate) shader: Option<ShaderId>,
    pub(crate) uniforms: Vec<f32>,
}

impl RecordedDraw {
    pub(crate) fn record(draw: &DrawTriangles<'_>) -> Self {
        Self {
            sources: draw.sources,
            source_offsets: draw.source_offsets,
            vertices: draw.vertices.to_vec(),
            indices: draw.indices.to_vec(),
            color_matrix: draw.color_matrix,
            composite: draw.composite,
            filter: draw.filter,
            address: draw.address,
            dst_region: draw.dst_region,
            src_region: draw.src_region,
            shader: draw.shader,
            uniforms: draw.uniforms.to_vec(),
        }
    }

    /// Rebuilds the pool-level draw, with `program` standing in for the shader.
    pub(crate) fn as_atlas_draw(&self, program: Option<ProgramId>) -> AtlasDraw<'_> {
        AtlasDraw {
            sources: self.sources,
            source_offsets: self.source_offsets,
            vertices: &self.vertices,
            indices: &self.indices,
            color_matrix: self.color_matrix,
            composite: self.composite,
            filter: self.filter,
            address: self.address,
            dst_region: self.dst_region,
            src_region: self.src_region,
            program,
            uniforms: &self.uniforms,
        }
    }
}

impl LogEntry {
    /// Images and shaders this entry reads.
    pub(crate) fn dependencies(&self) -> SmallVec<[Node; MAX_SOURCES + 1]> {
        let mut deps = SmallVec::new();
        if let Self::DrawTriangles(draw) = self {
            for src in draw.sources.iter().flatten() {
                if !deps.contains(&Node::Image(*src)) {
                    deps.push(Node::Image(*src));
                }
            }
            if let Some(shader) = draw.shader {
                deps.push(Node::Shader(shader));
            }
        }
        deps
    }
}

#[cfg(test)]
mod tests {
    use super::{LogEntry, RecordedDraw};
    use crate::graph::Node;
    use crate::images::DrawTriangles;
    use crate::{ImageId, ShaderId};
    use palimpsest_driver::{PixelRect, QUAD_INDICES};

    #[test]
    fn draw_dependencies_are_unique_and_include_the_shader() {
        let vertices = [0.0; 32];
        let mut draw = DrawTriangles::new(&vertices, &QUAD_INDICES);
        draw.sources = [Some(ImageId(3)), Some(ImageId(3)), None, Some(ImageId(1))];
        draw.shader = Some(ShaderId(0));
        let entry = LogEntry::DrawTriangles(Box::new(RecordedDraw::record(&draw)));
        assert_eq!(
            entry.dependencies().as_slice(),
            [
                Node::Image(ImageId(3)),
                Node::Image(ImageId(1)),
                Node::Shader(ShaderId(0))
            ]
        );
    }

    #[test]
    fn pixel_writes_read_nothing() {
        let entry = LogEntry::ReplacePixels {
            rect: PixelRect::full(1, 1),
            pixels: vec![0; 4],
        };
        assert!(entry.dependencies().is_empty(), "no dependencies");
    }
}
