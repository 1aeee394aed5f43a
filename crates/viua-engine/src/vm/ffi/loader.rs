//! Dynamic library loading for native modules
//!
//! Thin wrapper over `dlopen`/`dlsym`/`dlclose`. Handles stay open for
//! the engine's lifetime; function pointers extracted from a library are
//! only valid while its handle lives.

use std::ffi::{c_void, CStr, CString};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during library loading
#[derive(Debug, Error)]
pub enum LoadError {
    /// Library file not found or could not be loaded
    #[error("failed to link library: {path}: {detail}")]
    NotFound { path: String, detail: String },

    /// Symbol not found in library
    #[error("failed to extract symbol '{symbol}' from module: {library}")]
    SymbolNotFound { symbol: String, library: String },

    /// Path contained interior NUL or was not valid UTF-8
    #[error("invalid module path: {0}")]
    InvalidPath(String),
}

/// An open dynamic library handle
pub struct Library {
    handle: *mut c_void,
    path: String,
}

impl Library {
    /// Load a shared object with `dlopen(RTLD_LAZY)`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path = path
            .as_ref()
            .to_str()
            .ok_or_else(|| LoadError::InvalidPath(format!("{:?}", path.as_ref())))?
            .to_string();
        let c_path =
            CString::new(path.as_str()).map_err(|_| LoadError::InvalidPath(path.clone()))?;

        let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_LAZY) };
        if handle.is_null() {
            return Err(LoadError::NotFound {
                detail: last_dl_error(),
                path,
            });
        }

        Ok(Self { handle, path })
    }

    /// Extract a symbol, transmuted to the requested function type
    ///
    /// # Safety
    ///
    /// The caller must guarantee the symbol's true signature matches `T`
    /// and must not use the pointer after this library is dropped.
    pub unsafe fn get<T: Copy>(&self, symbol: &str) -> Result<T, LoadError> {
        let c_symbol = CString::new(symbol)
            .map_err(|_| LoadError::InvalidPath(symbol.to_string()))?;

        // Clear any stale error state before the lookup.
        libc::dlerror();
        let pointer = libc::dlsym(self.handle, c_symbol.as_ptr());
        if !libc::dlerror().is_null() || pointer.is_null() {
            return Err(LoadError::SymbolNotFound {
                symbol: symbol.to_string(),
                library: self.path.clone(),
            });
        }

        Ok(std::mem::transmute_copy(&pointer))
    }

    /// The path this library was loaded from
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        unsafe {
            libc::dlclose(self.handle);
        }
    }
}

fn last_dl_error() -> String {
    unsafe {
        let err = libc::dlerror();
        if err.is_null() {
            "unknown error".to_string()
        } else {
            CStr::from_ptr(err).to_string_lossy().into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_not_found() {
        let result = Library::open("/nonexistent/library.so");
        assert!(matches!(result, Err(LoadError::NotFound { .. })));
    }
}
