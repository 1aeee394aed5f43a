//! Assembler back-end for the Viua VM
//!
//! Turns assembly source into a bytecode image in distinct stages:
//! expansion to one-instruction-per-line form, gathering of functions
//! and blocks, independent verification passes, and emission with jump
//! resolution and static linking. The inverse direction lives in
//! [`disassembler`].

pub mod disassembler;
pub mod expand;
pub mod gather;
pub mod generate;
pub mod options;
pub mod program;
pub mod tokens;
pub mod verify;

pub use expand::expand_source;
pub use gather::{gather_blocks, gather_functions, Invocables};
pub use generate::generate;
pub use options::CompileOptions;
pub use verify::verify_all;

use thiserror::Error;

/// Name of the synthesized process entry function
pub const ENTRY_FUNCTION_NAME: &str = "__entry";

/// A fatal assembler diagnostic
///
/// Messages carry their severity prefix and, where available, a source
/// line number resolved through the expanded-to-source map.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AsmError {
    pub message: String,
}

impl AsmError {
    /// A `fatal:` diagnostic without source position
    pub fn fatal(message: impl std::fmt::Display) -> Self {
        Self {
            message: format!("fatal: {}", message),
        }
    }

    /// A `fatal:` diagnostic pointing at a source line (1-based)
    pub fn fatal_at(message: impl std::fmt::Display, source_line: usize) -> Self {
        Self {
            message: format!("fatal: {} at line {}", message, source_line + 1),
        }
    }

    /// An `error:` diagnostic without source position
    pub fn error(message: impl std::fmt::Display) -> Self {
        Self {
            message: format!("error: {}", message),
        }
    }
}

/// Assembly convenience wrapper: expand, gather, verify, generate
///
/// Warnings are printed to stdout as they are found; the first fatal
/// diagnostic aborts. `links` are module paths given on the command
/// line in addition to `.link:` directives in the source.
pub fn assemble(
    lines: &[String],
    links: &[String],
    options: &CompileOptions,
) -> Result<viua_bytecode::Image, AsmError> {
    let (expanded, source_map) = expand_source(lines);
    let functions = gather_functions(&expanded, &source_map)?;
    let blocks = gather_blocks(&expanded, &source_map)?;
    verify_all(&expanded, &source_map, &functions, &blocks, options)?;
    generate(&expanded, &source_map, functions, blocks, links, options)
}
