//! Native extension interface
//!
//! A native module is a shared object exporting two parallel arrays:
//! `exports_names` (NUL-terminated C strings, NULL-terminated array) and
//! `exports_pointers` (function pointers). Each exported function reads
//! its arguments from the frame it is handed and leaves its return value
//! in register 0 of the frame's local set.

mod loader;

pub use loader::{Library, LoadError};

use crate::vm::frame::Frame;
use crate::vm::registers::RegisterSet;
use crate::vm::value::ValueCell;
use crate::vm::VmResult;
use std::path::{Path, PathBuf};

/// Signature of a function exported by a native module
///
/// Receives the callee frame, the function's static register set (null
/// when it has none) and the global register set.
pub type ForeignFn = unsafe extern "C" fn(*mut Frame, *mut RegisterSet, *mut RegisterSet);

/// A method dispatched on a pure-native type through `msg`
///
/// Registered programmatically under `Type::method`; receives the
/// receiver value and the callee frame.
pub type ForeignMethod = fn(&ValueCell, &mut Frame) -> VmResult<()>;

/// Module search path resolved once at engine construction
///
/// Candidates are probed in order: the working directory, then every
/// `VIUAPATH` entry (colon-separated), with a leading `~` expanded
/// through `HOME`.
#[derive(Debug, Clone)]
pub struct ModuleSearchPath {
    entries: Vec<PathBuf>,
}

impl ModuleSearchPath {
    /// Resolve the search path from `VIUAPATH` and `HOME`
    pub fn from_env() -> Self {
        let mut entries = vec![PathBuf::from(".")];
        if let Ok(viuapath) = std::env::var("VIUAPATH") {
            for entry in viuapath.split(':').filter(|entry| !entry.is_empty()) {
                entries.push(expand_home(entry));
            }
        }
        Self { entries }
    }

    /// A search path with explicit entries, for embedding and tests
    pub fn with_entries<P: Into<PathBuf>>(entries: Vec<P>) -> Self {
        Self {
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }

    /// Locate `<module>.so` in the search path
    pub fn find(&self, module: &str) -> Option<PathBuf> {
        let file_name = format!("{}.so", module);
        self.entries
            .iter()
            .map(|entry| entry.join(&file_name))
            .find(|candidate| candidate.is_file())
    }
}

fn expand_home(entry: &str) -> PathBuf {
    if let Some(rest) = entry.strip_prefix('~') {
        if let Ok(home) = std::env::var("HOME") {
            return Path::new(&home).join(rest.trim_start_matches('/'));
        }
    }
    PathBuf::from(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_home() {
        std::env::set_var("HOME", "/home/tester");
        assert_eq!(
            expand_home("~/lib/viua"),
            PathBuf::from("/home/tester/lib/viua")
        );
        assert_eq!(expand_home("/usr/lib"), PathBuf::from("/usr/lib"));
    }

    #[test]
    fn test_find_missing_module() {
        let path = ModuleSearchPath::with_entries(vec!["/nonexistent"]);
        assert!(path.find("mathlib").is_none());
    }
}
