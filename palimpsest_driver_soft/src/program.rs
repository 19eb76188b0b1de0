// Copyright 2025 the Palimpsest Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A one-line shading language for exercising custom programs.
//!
//! Each program consists of a single directive; blank lines and lines
//! starting with `//` are ignored.
//!
//! - `fill r g b a`: constant premultiplied color, components in `[0, 1]`.
//! - `uniform`: the first four uniforms as a premultiplied color.
//! - `source k`: sample source slot `k`.
//! - `sum n`: sum of source slots `0..n`, clamped per channel.

use palimpsest_driver::{DriverError, MAX_SOURCES};

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Program {
    Fill([f32; 4]),
    Uniform,
    Source(usize),
    Sum(usize),
}

fn compile_error(msg: impl Into<String>) -> DriverError {
    DriverError::Compile(msg.into())
}

fn parse_slot(arg: Option<&str>, max: usize) -> Result<usize, DriverError> {
    let arg = arg.ok_or_else(|| compile_error("missing source slot"))?;
    let slot: usize = arg
        .parse()
        .map_err(|_| compile_error(format!("bad source slot `{arg}`")))?;
    if slot > max {
        return Err(compile_error(format!("source slot {slot} exceeds {max}")));
    }
    Ok(slot)
}

impl Program {
    pub(crate) fn parse(source: &str) -> Result<Self, DriverError> {
        let mut directives = source
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with("//"));
        let line = directives
            .next()
            .ok_or_else(|| compile_error("empty program"))?;
        if directives.next().is_some() {
            return Err(compile_error("more than one directive"));
        }

        let mut words = line.split_whitespace();
        let program = match words.next() {
            Some("fill") => {
                let mut rgba = [0.0; 4];
                for c in &mut rgba {
                    let word = words
                        .next()
                        .ok_or_else(|| compile_error("fill needs four components"))?;
                    *c = word
                        .parse()
                        .map_err(|_| compile_error(format!("bad component `{word}`")))?;
                }
                Self::Fill(rgba)
            }
            Some("uniform") => Self::Uniform,
            Some("source") => Self::Source(parse_slot(words.next(), MAX_SOURCES - 1)?),
            Some("sum") => Self::Sum(parse_slot(words.next(), MAX_SOURCES)?),
            Some(other) => return Err(compile_error(format!("unknown directive `{other}`"))),
            None => return Err(compile_error("empty program")),
        };
        if words.next().is_some() {
            return Err(compile_error("trailing tokens"));
        }
        Ok(program)
    }

    pub(crate) fn shade(&self, uniforms: &[f32], sample: impl Fn(usize) -> [f32; 4]) -> [f32; 4] {
        match *self {
            Self::Fill(c) => c,
            Self::Uniform => core::array::from_fn(|i| uniforms.get(i).copied().unwrap_or(0.0)),
            Self::Source(slot) => sample(slot),
            Self::Sum(n) => {
                let mut acc = [0.0_f32; 4];
                for slot in 0..n {
                    let c = sample(slot);
                    for (a, c) in acc.iter_mut().zip(c) {
                        *a += c;
                    }
                }
                acc.map(|c| c.min(1.0))
            }
        }
    }
}
