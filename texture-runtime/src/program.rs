//! Program sources and their declared interface.

use crate::{common::*, texture::TextureFormat};
use once_cell::sync::Lazy;
use regex::Regex;

/// Gather program copying `x[rowIndexMap[p], colIndexMap[p]]` into every
/// output texel `p`.
pub const MAP_INPUT_PROGRAM: &str = include_str!("programs/map_input.glsl");

static KERNEL_PRAGMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*#pragma\s+kernel\s+(\w+)\s*$").unwrap());
static SAMPLER_UNIFORM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*uniform\s+(i?)sampler2D\s+(\w+)\s*;").unwrap());

/// Handle to a compiled program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct Program {
    id: usize,
}

impl Program {
    pub fn new(id: usize) -> Self {
        Self { id }
    }
}

/// A sampler uniform declared by a program.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sampler {
    pub name: String,
    pub format: TextureFormat,
}

/// The interface a program source declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramInterface {
    pub kernel: String,
    pub samplers: Vec<Sampler>,
}

impl ProgramInterface {
    /// Reads the `#pragma kernel` directive and the sampler uniforms of a source.
    pub fn parse(source: &str) -> Result<Self> {
        let kernel = {
            let mut iter = KERNEL_PRAGMA.captures_iter(source);
            let kernel = iter
                .next()
                .ok_or_else(|| format_err!("the '#pragma kernel' directive is missing"))?[1]
                .to_string();
            ensure!(
                iter.next().is_none(),
                "the '#pragma kernel' directive is specified more than once"
            );
            kernel
        };

        let samplers: Vec<_> = SAMPLER_UNIFORM
            .captures_iter(source)
            .map(|caps| {
                let format = if caps[1].is_empty() {
                    TextureFormat::Float
                } else {
                    TextureFormat::Int
                };
                Sampler {
                    name: caps[2].to_string(),
                    format,
                }
            })
            .collect();

        {
            let mut names = HashSet::new();
            for sampler in &samplers {
                ensure!(
                    names.insert(&sampler.name),
                    "the sampler '{}' is declared more than once",
                    sampler.name
                );
            }
        }

        Ok(Self { kernel, samplers })
    }

    pub fn sampler(&self, name: &str) -> Option<&Sampler> {
        self.samplers.iter().find(|sampler| sampler.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_map_input_program() {
        let interface = ProgramInterface::parse(MAP_INPUT_PROGRAM).unwrap();
        assert_eq!(interface.kernel, "map_input");
        assert_eq!(
            interface.samplers,
            vec![
                Sampler {
                    name: "x".into(),
                    format: TextureFormat::Float
                },
                Sampler {
                    name: "rowIndexMap".into(),
                    format: TextureFormat::Int
                },
                Sampler {
                    name: "colIndexMap".into(),
                    format: TextureFormat::Int
                },
            ]
        );
    }

    #[test]
    fn parse_rejects_missing_kernel() {
        let source = "uniform sampler2D x;\nvoid main() {}\n";
        assert!(ProgramInterface::parse(source).is_err());
    }

    #[test]
    fn parse_rejects_duplicated_sampler() {
        let source = "#pragma kernel map_input\nuniform sampler2D x;\nuniform isampler2D x;\n";
        assert!(ProgramInterface::parse(source).is_err());
    }
}
