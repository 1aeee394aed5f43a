//! Assembler configuration
//!
//! One record threaded through all passes; no process-wide flags.

/// Compilation options for a single assembler invocation
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Emit a jump table and skip `__entry` synthesis
    pub as_lib: bool,

    pub verbose: bool,
    pub debug: bool,
    /// Extra per-line dispatch tracing on top of `debug`
    pub scream: bool,

    /// Enable every warning
    pub warning_all: bool,
    /// Treat every warning as an error
    pub error_all: bool,

    /// Warn about functions not ending with `end`
    pub warning_missing_end: bool,
    /// Treat a missing `end` as an error
    pub error_missing_end: bool,
    /// Treat `halt` as the last instruction of `main` as an error
    pub error_halt_is_last: bool,
}

impl CompileOptions {
    /// Whether the missing-`end` check should fail the build
    pub fn missing_end_is_error(&self) -> bool {
        self.error_missing_end || self.error_all
    }

    /// Whether the missing-`end` check should warn
    pub fn missing_end_is_warning(&self) -> bool {
        self.warning_missing_end || self.warning_all
    }

    /// Whether `main` ending in `halt` should fail the build
    pub fn halt_is_last_is_error(&self) -> bool {
        self.error_halt_is_last || self.error_all
    }
}
