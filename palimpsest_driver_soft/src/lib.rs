// Copyright 2025 the Palimpsest Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Palimpsest Soft Driver: a CPU implementation of [`GraphicsDriver`].
//!
//! [`SoftDriver`] keeps every texture as premultiplied RGBA8 in memory and
//! rasterizes [`DrawCall`]s with a simple edge-function rasterizer. It exists
//! so that the atlas and restoration layers can be tested pixel-exactly
//! without a GPU:
//!
//! - [`SoftDriver::lose_context`] simulates device loss: every texture and
//!   program is dropped and all calls fail with [`DriverError::ContextLost`]
//!   until [`GraphicsDriver::reset_context`].
//! - [`SoftDriver::fail_next`] injects a one-shot failure into the next
//!   fallible call.
//! - [`SoftDriver::events`] records every call, in order, for assertions.
//!
//! Custom programs use a one-directive language (`fill r g b a`, `uniform`,
//! `source k`, `sum n`); see the `program` module docs.
//!
//! It is not a conformance reference: triangle edges follow a
//! first-triangle-wins rule per draw call rather than a GPU fill convention.

mod program;
mod raster;

use palimpsest_driver::{
    DrawCall, DriverError, GraphicsDriver, MAX_SOURCES, PixelRect, ProgramId, TextureId,
};

use program::Program;
use raster::Texture;

/// Default value of [`GraphicsDriver::max_texture_size`].
pub const DEFAULT_MAX_TEXTURE_SIZE: u32 = 4096;

/// Call recorded by the soft driver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// A texture was created.
    CreateTexture {
        /// New handle.
        texture: TextureId,
        /// Width in texels.
        width: u32,
        /// Height in texels.
        height: u32,
    },
    /// A texture was disposed.
    DisposeTexture(TextureId),
    /// Pixels were uploaded.
    Upload {
        /// Target texture.
        texture: TextureId,
        /// Rectangle written.
        rect: PixelRect,
    },
    /// Pixels were read back.
    Read {
        /// Source texture.
        texture: TextureId,
        /// Rectangle read.
        rect: PixelRect,
    },
    /// A draw call was executed.
    Draw {
        /// Destination texture.
        destination: TextureId,
        /// Source slots.
        sources: [Option<TextureId>; MAX_SOURCES],
        /// Custom program, if any.
        program: Option<ProgramId>,
    },
    /// A program was compiled.
    CreateProgram(ProgramId),
    /// A program was disposed.
    DisposeProgram(ProgramId),
    /// The context was lost.
    ContextLost,
    /// The context was reset.
    ContextReset,
}

/// In-memory graphics driver.
#[derive(Debug)]
pub struct SoftDriver {
    textures: Vec<Option<Texture>>,
    programs: Vec<Option<Program>>,
    max_texture_size: u32,
    context_lost: bool,
    pending_failure: Option<DriverError>,
    events: Vec<Event>,
}

impl Default for SoftDriver {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TEXTURE_SIZE)
    }
}

impl SoftDriver {
    /// Creates a driver whose textures may be at most `max_texture_size` per edge.
    pub fn new(max_texture_size: u32) -> Self {
        Self {
            textures: Vec::new(),
            programs: Vec::new(),
            max_texture_size,
            context_lost: false,
            pending_failure: None,
            events: Vec::new(),
        }
    }

    /// Recorded calls, oldest first.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Forgets recorded calls but keeps resources.
    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Simulates device loss: every texture and program becomes invalid.
    pub fn lose_context(&mut self) {
        tracing::debug!(
            textures = self.live_textures(),
            programs = self.programs.iter().flatten().count(),
            "simulated context loss"
        );
        for slot in &mut self.textures {
            *slot = None;
        }
        for slot in &mut self.programs {
            *slot = None;
        }
        self.context_lost = true;
        self.events.push(Event::ContextLost);
    }

    /// Makes the next fallible call fail with `error`.
    pub fn fail_next(&mut self, error: DriverError) {
        self.pending_failure = Some(error);
    }

    /// Number of live textures.
    pub fn live_textures(&self) -> usize {
        self.textures.iter().flatten().count()
    }

    /// Size of a live texture.
    pub fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)> {
        self.texture(texture).map(|t| (t.width, t.height))
    }

    fn texture(&self, texture: TextureId) -> Option<&Texture> {
        self.textures.get(texture.0 as usize)?.as_ref()
    }

    fn check(&mut self) -> Result<(), DriverError> {
        if self.context_lost {
            return Err(DriverError::ContextLost);
        }
        match self.pending_failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn checked_rect(
        &self,
        texture: TextureId,
        rect: PixelRect,
    ) -> Result<&Texture, DriverError> {
        let t = self
            .texture(texture)
            .ok_or(DriverError::InvalidTexture(texture))?;
        if !rect.fits_within(t.width, t.height) {
            return Err(DriverError::OutOfBounds { texture, rect });
        }
        Ok(t)
    }
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "handle counts stay far below u32::MAX"
)]
fn next_id(len: usize) -> u32 {
    len as u32
}

impl GraphicsDriver for SoftDriver {
    fn max_texture_size(&self) -> u32 {
        self.max_texture_size
    }

    fn create_texture(&mut self, width: u32, height: u32) -> Result<TextureId, DriverError> {
        self.check()?;
        if width == 0 || height == 0 || width > self.max_texture_size || height > self.max_texture_size
        {
            return Err(DriverError::Device(format!(
                "unsupported texture size {width}x{height}"
            )));
        }
        let texture = TextureId(next_id(self.textures.len()));
        self.textures.push(Some(Texture::new(width, height)));
        self.events.push(Event::CreateTexture {
            texture,
            width,
            height,
        });
        Ok(texture)
    }

    fn dispose_texture(&mut self, texture: TextureId) {
        if let Some(slot) = self.textures.get_mut(texture.0 as usize) {
            if slot.take().is_some() {
                self.events.push(Event::DisposeTexture(texture));
            }
        }
    }

    fn upload_pixels(
        &mut self,
        texture: TextureId,
        rect: PixelRect,
        pixels: &[u8],
    ) -> Result<(), DriverError> {
        self.check()?;
        self.checked_rect(texture, rect)?;
        if pixels.len() != rect.byte_len() {
            return Err(DriverError::OutOfBounds { texture, rect });
        }
        if let Some(Some(t)) = self.textures.get_mut(texture.0 as usize) {
            t.write(rect, pixels);
        }
        self.events.push(Event::Upload { texture, rect });
        Ok(())
    }

    fn read_pixels(&mut self, texture: TextureId, rect: PixelRect) -> Result<Vec<u8>, DriverError> {
        self.check()?;
        let pixels = self.checked_rect(texture, rect)?.read(rect);
        self.events.push(Event::Read { texture, rect });
        Ok(pixels)
    }

    fn create_program(&mut self, source: &str) -> Result<ProgramId, DriverError> {
        self.check()?;
        let program = Program::parse(source)?;
        let id = ProgramId(next_id(self.programs.len()));
        self.programs.push(Some(program));
        self.events.push(Event::CreateProgram(id));
        Ok(id)
    }

    fn dispose_program(&mut self, program: ProgramId) {
        if let Some(slot) = self.programs.get_mut(program.0 as usize) {
            if slot.take().is_some() {
                self.events.push(Event::DisposeProgram(program));
            }
        }
    }

    fn draw_triangles(&mut self, call: &DrawCall<'_>) -> Result<(), DriverError> {
        self.check()?;
        let dst_index = call.destination.0 as usize;
        if self.texture(call.destination).is_none() {
            return Err(DriverError::InvalidTexture(call.destination));
        }
        for source in call.sources.iter().flatten() {
            if *source == call.destination {
                return Err(DriverError::InvalidDraw("source is the destination"));
            }
            if self.texture(*source).is_none() {
                return Err(DriverError::InvalidTexture(*source));
            }
        }
        let program = match call.program {
            Some(id) => Some(
                self.programs
                    .get(id.0 as usize)
                    .and_then(Option::as_ref)
                    .ok_or(DriverError::InvalidProgram(id))?,
            ),
            None => None,
        };

        let Some(mut dst) = self.textures[dst_index].take() else {
            return Err(DriverError::InvalidTexture(call.destination));
        };
        let sources = call.sources.map(|s| s.and_then(|id| self.texture(id)));
        let result = raster::draw(&mut dst, call, sources, program);
        self.textures[dst_index] = Some(dst);
        result?;

        self.events.push(Event::Draw {
            destination: call.destination,
            sources: call.sources,
            program: call.program,
        });
        Ok(())
    }

    fn is_context_lost(&self) -> bool {
        self.context_lost
    }

    fn reset_context(&mut self) -> Result<(), DriverError> {
        if let Some(err) = self.pending_failure.take() {
            return Err(err);
        }
        self.context_lost = false;
        self.events.push(Event::ContextReset);
        Ok(())
    }
}
