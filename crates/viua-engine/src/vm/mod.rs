//! Core runtime types shared across the engine

pub mod cpu;
pub mod ffi;
pub mod frame;
pub mod registers;
pub mod value;

use thiserror::Error;
use viua_bytecode::DecodeError;

/// Capacity of the global register set and of the initial frame's locals
pub const DEFAULT_REGISTER_SIZE: usize = 256;

/// Maximum call stack depth; exceeding it raises `StackOverflow`
pub const MAX_STACK_SIZE: usize = 8192;

/// A runtime exception
///
/// Engine-internal failures are promoted to this type with a canonical
/// `kind` so user code can catch them the same way it catches values it
/// threw itself. The kind doubles as the exception's type name during
/// catcher matching.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct RuntimeException {
    pub kind: String,
    pub message: String,
}

impl RuntimeException {
    /// A generic exception of type `Exception`
    pub fn new(message: impl Into<String>) -> Self {
        Self::of_kind("Exception", message)
    }

    /// An exception with an explicit type name
    pub fn of_kind(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Register or argument index outside its set's capacity
    pub fn out_of_range(message: impl Into<String>) -> Self {
        Self::of_kind("OutOfRange", message)
    }

    /// Value has the wrong dynamic type for the operation
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::of_kind("TypeError", message)
    }

    /// Call stack grew past `MAX_STACK_SIZE`
    pub fn stack_overflow() -> Self {
        Self::of_kind("StackOverflow", "stack size exceeded with call to native function")
    }

    /// Read from an empty register slot
    pub fn null_deref(message: impl Into<String>) -> Self {
        Self::of_kind("NullDeref", message)
    }

    /// Broken frame staging (call without frame, double frame, ...)
    pub fn bad_frame(message: impl Into<String>) -> Self {
        Self::of_kind("BadFrame", message)
    }

    /// Illegal register set id in a `ress` instruction
    pub fn bad_ress(message: impl Into<String>) -> Self {
        Self::of_kind("BadRess", message)
    }
}

impl From<DecodeError> for RuntimeException {
    fn from(err: DecodeError) -> Self {
        RuntimeException::new(format!("bytecode decode failure: {}", err))
    }
}

/// Engine execution result
pub type VmResult<T> = Result<T, RuntimeException>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exception_display() {
        let ex = RuntimeException::out_of_range("register index out of bounds: 300");
        assert_eq!(ex.to_string(), "OutOfRange: register index out of bounds: 300");
    }

    #[test]
    fn test_kinds() {
        assert_eq!(RuntimeException::new("boom").kind, "Exception");
        assert_eq!(RuntimeException::type_error("x").kind, "TypeError");
        assert_eq!(RuntimeException::stack_overflow().kind, "StackOverflow");
        assert_eq!(RuntimeException::bad_ress("x").kind, "BadRess");
    }
}
