//! Call and exception-handling activation records

use crate::vm::registers::RegisterSet;
use rustc_hash::FxHashMap;

/// A call-stack activation record
///
/// Created by `frame`, filled by `param`/`paref`/`paptr`, pushed by the
/// call family, popped by `end` or exception unwind. Frames are
/// move-only; there is no copy path.
#[derive(Debug)]
pub struct Frame {
    pub return_address: usize,
    pub args: RegisterSet,
    pub regset: RegisterSet,
    pub function_name: String,
    /// Caller register receiving the return value; 0 discards it
    pub place_return_value_in: i32,
    /// Whether the return register index is itself resolved through a
    /// register (caller used an `@` operand)
    pub resolve_return_value_register: bool,
}

impl Frame {
    /// Allocate a frame with `args_size` argument slots and `regs_size`
    /// local registers
    pub fn new(return_address: usize, args_size: usize, regs_size: usize) -> Self {
        Self {
            return_address,
            args: RegisterSet::new(args_size),
            regset: RegisterSet::new(regs_size),
            function_name: String::new(),
            place_return_value_in: 0,
            resolve_return_value_register: false,
        }
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        // Arguments passed by reference live in the caller's frame;
        // release the handles without touching the shared cells.
        self.args.drop_all();
    }
}

/// One recovery path registered by `catch`
#[derive(Debug, Clone)]
pub struct Catcher {
    pub type_name: String,
    pub block_name: String,
    /// Code offset of the catcher block
    pub address: usize,
}

/// An exception-handling activation record
///
/// Created by `tryframe`, populated by `catch`, committed by `try`.
#[derive(Debug, Default)]
pub struct TryFrame {
    /// Where `leave` resumes: the instruction after the committing `try`
    pub return_address: usize,
    /// Call stack depth at commit time; unwind trims frames back to it
    pub frame_depth: usize,
    pub block_name: String,
    /// Catchers keyed by the exception type name they recover from
    pub catchers: FxHashMap<String, Catcher>,
}

impl TryFrame {
    pub fn new() -> Self {
        Self::default()
    }
}
