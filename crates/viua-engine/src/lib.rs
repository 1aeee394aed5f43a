//! Viua VM execution engine
//!
//! A strictly single-threaded register machine: one instruction pointer,
//! one call stack, cooperative execution until `halt` or an unrecoverable
//! exception. Values live in shared slots owned by register sets; frames
//! and try-frames form the activation and recovery records.

pub mod vm;

pub use vm::cpu::Cpu;
pub use vm::ffi::{ForeignFn, ForeignMethod, Library, LoadError, ModuleSearchPath};
pub use vm::frame::{Catcher, Frame, TryFrame};
pub use vm::registers::RegisterSet;
pub use vm::value::{Prototype, Value, ValueCell};
pub use vm::{RuntimeException, VmResult, DEFAULT_REGISTER_SIZE, MAX_STACK_SIZE};
