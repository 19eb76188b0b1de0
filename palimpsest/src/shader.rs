// Copyright 2025 the Palimpsest Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use hashbrown::HashMap;
use palimpsest_driver::{GraphicsDriver, ProgramId};

use crate::{Error, Result, ShaderId};

#[derive(Clone, Debug)]
enum Shader {
    Live { source: String, program: ProgramId },
    /// Tombstone; handles are never reused.
    Disposed,
}

/// Retained shader sources and their current driver programs.
#[derive(Debug, Default)]
pub(crate) struct ShaderRegistry {
    shaders: HashMap<ShaderId, Shader>,
    next: u32,
}

impl ShaderRegistry {
    pub(crate) fn create(
        &mut self,
        driver: &mut dyn GraphicsDriver,
        source: &str,
    ) -> Result<ShaderId> {
        let program = driver.create_program(source)?;
        let id = ShaderId(self.next);
        self.next += 1;
        self.shaders.insert(
            id,
            Shader::Live {
                source: source.to_owned(),
                program,
            },
        );
        Ok(id)
    }

    /// Current program of a live shader.
    pub(crate) fn program(&self, id: ShaderId) -> Result<ProgramId> {
        match self.shaders.get(&id) {
            Some(Shader::Live { program, .. }) => Ok(*program),
            Some(Shader::Disposed) => Err(Error::ShaderDisposed(id)),
            None => Err(Error::UnknownShader(id)),
        }
    }

    /// Releases the program and leaves a tombstone.
    ///
    /// Returns `false` if the shader was already disposed.
    pub(crate) fn dispose(&mut self, driver: &mut dyn GraphicsDriver, id: ShaderId) -> Result<bool> {
        let shader = self.shaders.get_mut(&id).ok_or(Error::UnknownShader(id))?;
        match core::mem::replace(shader, Shader::Disposed) {
            Shader::Live { program, .. } => {
                driver.dispose_program(program);
                Ok(true)
            }
            Shader::Disposed => Ok(false),
        }
    }

    /// Compiles every live shader again. Old programs are disposed first
    /// unless the context that owned them is gone.
    pub(crate) fn recompile(
        &mut self,
        driver: &mut dyn GraphicsDriver,
        dispose_old: bool,
    ) -> Result<usize> {
        let mut ids: Vec<ShaderId> = self.shaders.keys().copied().collect();
        ids.sort_unstable();
        let mut count = 0;
        for id in ids {
            if let Some(Shader::Live { source, program }) = self.shaders.get_mut(&id) {
                if dispose_old {
                    driver.dispose_program(*program);
                }
                *program = driver.create_program(source)?;
                count += 1;
            }
        }
        Ok(count)
    }

    pub(crate) fn teardown(&mut self, driver: &mut dyn GraphicsDriver) {
        for (_, shader) in self.shaders.drain() {
            if let Shader::Live { program, .. } = shader {
                driver.dispose_program(program);
            }
        }
    }
}
