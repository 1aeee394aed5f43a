//! The execution engine
//!
//! `Cpu` owns the bytecode image, the register sets, the call and
//! try-frame stacks, the typesystem, and the foreign-function
//! registries. `run()` drives the dispatch loop until `halt`, an `end`
//! on the last frame, or an unrecoverable exception.
//!
//! Every opcode handler decodes its own operands and returns the next
//! instruction pointer as a `VmResult`; the loop centralizes exception
//! unwinding so handlers never deal with try-frames directly.

mod arithmetic;
mod calls;
mod control;
mod exceptions;
mod io;
mod modules;
mod prototypes;
mod registers;
mod strings;
mod vectors;

use crate::vm::ffi::{ForeignFn, ForeignMethod, Library, ModuleSearchPath};
use crate::vm::frame::{Frame, TryFrame};
use crate::vm::registers::{RegisterSet, REFERENCE};
use crate::vm::value::{cell, Prototype, Value, ValueCell};
use crate::vm::{RuntimeException, VmResult, DEFAULT_REGISTER_SIZE, MAX_STACK_SIZE};
use rustc_hash::FxHashMap;
use std::rc::Rc;
use viua_bytecode::{BytecodeReader, Image, IntOp, Opcode};

/// Name of the synthesized process entry function
pub const ENTRY_FUNCTION_NAME: &str = "__entry";

/// Which register set `ress` has selected
#[derive(Debug, Clone, PartialEq, Eq)]
enum RegisterSetId {
    Global,
    Local,
    /// Static set of the named function, created lazily at switch time
    Static(String),
}

/// Outcome of executing one instruction
enum Tick {
    /// Continue at the given instruction pointer
    Next(usize),
    /// `halt` stopped the machine
    Halted,
    /// `end` popped the last frame
    Drained,
}

/// The virtual machine
pub struct Cpu {
    pub(crate) bytecode: Vec<u8>,

    /// Global register set
    pub(crate) regset: RegisterSet,
    /// Which set register operands currently resolve against
    selector: RegisterSetId,
    /// Per-function static register sets, created lazily
    pub(crate) static_registers: FxHashMap<String, RegisterSet>,
    /// Single-slot temporary exchange register
    pub(crate) tmp: Option<ValueCell>,

    pub(crate) typesystem: FxHashMap<String, Prototype>,

    pub(crate) frames: Vec<Frame>,
    pub(crate) frame_new: Option<Frame>,
    pub(crate) tryframes: Vec<TryFrame>,
    pub(crate) try_frame_new: Option<TryFrame>,

    pub(crate) function_addresses: FxHashMap<String, usize>,
    pub(crate) block_addresses: FxHashMap<String, usize>,

    pub(crate) thrown: Option<ValueCell>,
    pub(crate) caught: Option<ValueCell>,

    return_code: i32,
    return_exception: String,
    return_message: String,

    pub(crate) ip: usize,
    instruction_counter: u64,

    pub(crate) foreign_functions: FxHashMap<String, ForeignFn>,
    pub(crate) foreign_methods: FxHashMap<String, ForeignMethod>,
    /// Open native library handles, released on drop
    pub(crate) libraries: Vec<Library>,
    pub(crate) search_path: ModuleSearchPath,

    commandline_arguments: Vec<String>,

    /// Print per-instruction dispatch traces
    pub debug: bool,
    /// Emit non-fatal runtime warnings
    pub errors: bool,
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            bytecode: Vec::new(),
            regset: RegisterSet::new(DEFAULT_REGISTER_SIZE),
            selector: RegisterSetId::Global,
            static_registers: FxHashMap::default(),
            tmp: None,
            typesystem: FxHashMap::default(),
            frames: Vec::new(),
            frame_new: None,
            tryframes: Vec::new(),
            try_frame_new: None,
            function_addresses: FxHashMap::default(),
            block_addresses: FxHashMap::default(),
            thrown: None,
            caught: None,
            return_code: 0,
            return_exception: String::new(),
            return_message: String::new(),
            ip: 0,
            instruction_counter: 0,
            foreign_functions: FxHashMap::default(),
            foreign_methods: FxHashMap::default(),
            libraries: Vec::new(),
            search_path: ModuleSearchPath::from_env(),
            commandline_arguments: Vec::new(),
            debug: false,
            errors: false,
        }
    }

    /// Load an executable image: bytecode plus function and block
    /// address tables
    pub fn load(&mut self, image: Image) -> &mut Self {
        for (name, offset) in &image.functions {
            self.function_addresses.insert(name.clone(), *offset as usize);
        }
        for (name, offset) in &image.blocks {
            self.block_addresses.insert(name.clone(), *offset as usize);
        }
        self.bytecode = image.code;
        self
    }

    /// Map a function name to a bytecode offset
    pub fn map_function(&mut self, name: impl Into<String>, address: usize) -> &mut Self {
        self.function_addresses.insert(name.into(), address);
        self
    }

    /// Map a block name to a bytecode offset
    pub fn map_block(&mut self, name: impl Into<String>, address: usize) -> &mut Self {
        self.block_addresses.insert(name.into(), address);
        self
    }

    /// Register a foreign function callable through `call` and `fcall`
    pub fn register_foreign_function(
        &mut self,
        name: impl Into<String>,
        function: ForeignFn,
    ) -> &mut Self {
        self.foreign_functions.insert(name.into(), function);
        self
    }

    /// Register a method on a pure-native type, keyed `Type::method`
    pub fn register_foreign_method(
        &mut self,
        name: impl Into<String>,
        method: ForeignMethod,
    ) -> &mut Self {
        self.foreign_methods.insert(name.into(), method);
        self
    }

    /// Inject a prototype for a pure-native type into the typesystem
    pub fn register_foreign_prototype(&mut self, prototype: Prototype) -> &mut Self {
        self.typesystem.insert(prototype.name.clone(), prototype);
        self
    }

    /// Override the module search path (defaults to `VIUAPATH`)
    pub fn set_search_path(&mut self, search_path: ModuleSearchPath) -> &mut Self {
        self.search_path = search_path;
        self
    }

    /// Arguments made visible to the program through `__entry`
    pub fn set_arguments(&mut self, arguments: Vec<String>) -> &mut Self {
        self.commandline_arguments = arguments;
        self
    }

    /// Exit state after `run()`: code, exception type name, message
    pub fn exit_condition(&self) -> (i32, &str, &str) {
        (
            self.return_code,
            &self.return_exception,
            &self.return_message,
        )
    }

    /// Instructions executed so far
    pub fn counter(&self) -> u64 {
        self.instruction_counter
    }

    /// The call stack, innermost frame last
    pub fn trace(&self) -> &[Frame] {
        &self.frames
    }

    /// The global register set
    pub fn global_registers(&self) -> &RegisterSet {
        &self.regset
    }

    // ── Register plumbing ──────────────────────────────────────────

    pub(crate) fn uregset(&mut self) -> VmResult<&mut RegisterSet> {
        match &self.selector {
            RegisterSetId::Global => Ok(&mut self.regset),
            RegisterSetId::Local => self
                .frames
                .last_mut()
                .map(|frame| &mut frame.regset)
                .ok_or_else(|| {
                    RuntimeException::bad_frame("no frame for local register set")
                }),
            RegisterSetId::Static(name) => self
                .static_registers
                .get_mut(name.as_str())
                .ok_or_else(|| RuntimeException::bad_ress("static register set vanished")),
        }
    }

    pub(crate) fn uregset_ref(&self) -> VmResult<&RegisterSet> {
        match &self.selector {
            RegisterSetId::Global => Ok(&self.regset),
            RegisterSetId::Local => self
                .frames
                .last()
                .map(|frame| &frame.regset)
                .ok_or_else(|| {
                    RuntimeException::bad_frame("no frame for local register set")
                }),
            RegisterSetId::Static(name) => self
                .static_registers
                .get(name.as_str())
                .ok_or_else(|| RuntimeException::bad_ress("static register set vanished")),
        }
    }

    /// Fetch the cell a register currently holds
    pub(crate) fn fetch(&self, index: usize) -> VmResult<ValueCell> {
        self.uregset_ref()?.get(index)
    }

    /// Store a freshly owned value into a register
    pub(crate) fn place(&mut self, index: usize, value: Value) -> VmResult<()> {
        self.uregset()?.put(index, value)
    }

    /// Read a register expected to hold an Integer
    pub(crate) fn integer_at(&self, index: usize) -> VmResult<i32> {
        let value = self.fetch(index)?;
        let value = value.borrow();
        value.as_integer().ok_or_else(|| {
            RuntimeException::type_error(format!(
                "expected Integer, got {}",
                value.type_name()
            ))
        })
    }

    /// Resolve an operand to a register index, following one level of
    /// indirection for `@` operands
    pub(crate) fn resolve(&self, operand: IntOp) -> VmResult<usize> {
        let index = if operand.by_reference {
            self.integer_at(operand.index as usize)?
        } else {
            operand.index
        };
        if index < 0 {
            return Err(RuntimeException::out_of_range(format!(
                "negative register index: {}",
                index
            )));
        }
        Ok(index as usize)
    }

    /// Resolve an operand to a plain integer (counts, literals)
    pub(crate) fn resolve_value(&self, operand: IntOp) -> VmResult<i32> {
        if operand.by_reference {
            self.integer_at(operand.index as usize)
        } else {
            Ok(operand.index)
        }
    }

    pub(crate) fn ensure_static_registers(&mut self, function_name: &str) {
        self.static_registers
            .entry(function_name.to_string())
            .or_insert_with(|| RegisterSet::new(DEFAULT_REGISTER_SIZE));
    }

    pub(crate) fn switch_to_global(&mut self) {
        self.selector = RegisterSetId::Global;
    }

    pub(crate) fn switch_to_local(&mut self) {
        self.selector = RegisterSetId::Local;
    }

    pub(crate) fn switch_to_static(&mut self, function_name: String) {
        self.selector = RegisterSetId::Static(function_name);
    }

    // ── Frame plumbing ─────────────────────────────────────────────

    pub(crate) fn take_pending_frame(&mut self) -> VmResult<Frame> {
        self.frame_new.take().ok_or_else(|| {
            RuntimeException::bad_frame(
                "function call without a frame: use `frame 0' in source code \
                 if the function takes no parameters",
            )
        })
    }

    pub(crate) fn push_frame(&mut self, frame: Frame) -> VmResult<()> {
        if self.frames.len() >= MAX_STACK_SIZE {
            return Err(RuntimeException::stack_overflow());
        }
        self.frames.push(frame);
        self.selector = RegisterSetId::Local;
        Ok(())
    }

    pub(crate) fn drop_frame(&mut self) {
        self.frames.pop();
        self.selector = if self.frames.is_empty() {
            RegisterSetId::Global
        } else {
            RegisterSetId::Local
        };
    }

    /// Read the callee's return value per the caller's disposition
    ///
    /// Returns the cell to deposit and whether it stays a reference.
    fn harvest_return(&mut self) -> VmResult<Option<(ValueCell, bool)>> {
        let frame = self
            .frames
            .last()
            .ok_or_else(|| RuntimeException::bad_frame("no frame to return from"))?;
        if frame.place_return_value_in == 0 {
            return Ok(None);
        }

        let regs = self.uregset_ref()?;
        match regs.at(0)? {
            None => Err(RuntimeException::new(
                "return value requested by frame but function did not set return register",
            )),
            Some(returned) => {
                if regs.isflagged(0, REFERENCE)? {
                    Ok(Some((Rc::clone(returned), true)))
                } else {
                    Ok(Some((cell(returned.borrow().deep_copy()), false)))
                }
            }
        }
    }

    /// Pop the top frame, depositing its return value in the caller
    ///
    /// Shared by `end` and by flat (foreign) calls.
    pub(crate) fn finish_call(&mut self) -> VmResult<()> {
        let (target, resolve_target) = {
            let frame = self
                .frames
                .last()
                .ok_or_else(|| RuntimeException::bad_frame("no frame on stack: nothing to end"))?;
            (
                frame.place_return_value_in,
                frame.resolve_return_value_register,
            )
        };

        let returned = self.harvest_return()?;
        self.drop_frame();

        if self.frames.is_empty() {
            return Ok(());
        }
        if let Some((value, is_reference)) = returned {
            let mut register = target as usize;
            if resolve_target {
                register = self.integer_at(register)? as usize;
            }
            let regs = self.uregset()?;
            regs.set(register, value)?;
            if is_reference {
                regs.flag(register, REFERENCE)?;
            }
        }
        Ok(())
    }

    // ── Exception plumbing ─────────────────────────────────────────

    /// Full type chain of a value, resolving user classes through the
    /// typesystem and built-ins through the value itself
    pub(crate) fn chain_of(&self, value: &ValueCell) -> Vec<String> {
        let value = value.borrow();
        if let Value::Object { class_name } = &*value {
            let mut chain = vec![class_name.clone()];
            self.extend_chain(class_name, &mut chain);
            if !chain.iter().any(|entry| entry == "Type") {
                chain.push("Type".to_string());
            }
            chain
        } else {
            value.inheritance_chain()
        }
    }

    fn extend_chain(&self, name: &str, chain: &mut Vec<String>) {
        if let Some(prototype) = self.typesystem.get(name) {
            for ancestor in &prototype.ancestors {
                if !chain.contains(ancestor) {
                    chain.push(ancestor.clone());
                    self.extend_chain(ancestor, chain);
                }
            }
        }
    }

    /// Unwind the try-frame stack looking for a catcher
    ///
    /// Non-matching try-frames are popped; the matching one stays so the
    /// catcher's `leave` resumes after its `try`. Call frames pushed
    /// after the matching try-frame's commit point are discarded.
    fn unwind(&mut self) -> Option<usize> {
        let thrown = self.thrown.as_ref()?.clone();
        let mut chain = self.chain_of(&thrown);
        // A catcher for `Exception` recovers from anything thrown;
        // specific type names in the chain take priority.
        if !chain.iter().any(|entry| entry == "Exception") {
            chain.push("Exception".to_string());
        }

        loop {
            let tryframe = self.tryframes.last()?;
            if let Some(catcher) = chain
                .iter()
                .find_map(|entry| tryframe.catchers.get(entry))
            {
                let address = catcher.address;
                let depth = tryframe.frame_depth;
                self.frames.truncate(depth);
                self.selector = if self.frames.is_empty() {
                    RegisterSetId::Global
                } else {
                    RegisterSetId::Local
                };
                self.caught = self.thrown.take();
                return Some(address);
            }
            self.tryframes.pop();
        }
    }

    // ── Execution ──────────────────────────────────────────────────

    fn begin(&mut self) -> VmResult<()> {
        let entry = *self
            .function_addresses
            .get(ENTRY_FUNCTION_NAME)
            .ok_or_else(|| {
                RuntimeException::new("no entry function in loaded image")
            })?;

        let mut initial = Frame::new(0, 0, DEFAULT_REGISTER_SIZE);
        initial.function_name = ENTRY_FUNCTION_NAME.to_string();
        let arguments = Value::Vector(
            self.commandline_arguments
                .iter()
                .map(|argument| cell(Value::Str(argument.clone())))
                .collect(),
        );
        initial.regset.put(1, arguments)?;

        self.frames.push(initial);
        self.selector = RegisterSetId::Local;
        self.ip = entry;
        Ok(())
    }

    /// Execute until the program stops; returns the exit code
    ///
    /// A `halt` stops with the return code as it stands; running off
    /// the end of the bytecode or draining the call stack with `end`
    /// reads the return code from register 0 of the current set.
    pub fn run(&mut self) -> i32 {
        if let Err(exception) = self.begin() {
            self.return_code = 1;
            self.return_exception = exception.kind;
            self.return_message = exception.message;
            return self.return_code;
        }

        loop {
            if self.ip >= self.bytecode.len() {
                self.return_code = self.exit_code_from_register_zero();
                break;
            }

            match self.tick() {
                Ok(Tick::Next(next)) => {
                    self.instruction_counter += 1;
                    self.ip = next;
                }
                Ok(Tick::Halted) => {
                    self.instruction_counter += 1;
                    break;
                }
                Ok(Tick::Drained) => {
                    self.instruction_counter += 1;
                    self.return_code = self.exit_code_from_register_zero();
                    break;
                }
                Err(exception) => {
                    if self.thrown.is_none() {
                        self.thrown = Some(cell(Value::Exception {
                            kind: exception.kind,
                            message: exception.message,
                        }));
                    }
                }
            }

            if self.thrown.is_some() {
                match self.unwind() {
                    Some(next) => self.ip = next,
                    None => {
                        let thrown = self.thrown.take().expect("unwind leaves thrown in place");
                        let thrown = thrown.borrow();
                        self.return_code = 1;
                        self.return_exception = thrown.type_name().to_string();
                        self.return_message = thrown.str_value();
                        return self.return_code;
                    }
                }
            }
        }

        self.return_code
    }

    fn exit_code_from_register_zero(&self) -> i32 {
        self.uregset_ref()
            .ok()
            .and_then(|regs| regs.at(0).ok().flatten().cloned())
            .and_then(|value| value.borrow().as_integer())
            .unwrap_or(0)
    }

    /// Decode and execute one instruction
    ///
    /// A `throw` returns `Next` with `thrown` set; the run loop
    /// unwinds.
    fn tick(&mut self) -> VmResult<Tick> {
        let mut reader = BytecodeReader::at(&self.bytecode, self.ip);
        let opcode = reader.read_opcode()?;

        if self.debug {
            eprintln!("[vm] byte {}: {}", self.ip, opcode.mnemonic());
        }

        let ip = self.ip;
        let next = match opcode {
            Opcode::Nop => Ok(ip + 1),
            Opcode::Halt => return Ok(Tick::Halted),

            Opcode::Izero => self.op_izero(ip),
            Opcode::Istore => self.op_istore(ip),
            Opcode::Iadd | Opcode::Isub | Opcode::Imul | Opcode::Idiv => {
                self.op_int_arithmetic(ip, opcode)
            }
            Opcode::Ilt | Opcode::Ilte | Opcode::Igt | Opcode::Igte | Opcode::Ieq => {
                self.op_int_compare(ip, opcode)
            }
            Opcode::Iinc => self.op_iinc(ip, 1),
            Opcode::Idec => self.op_iinc(ip, -1),

            Opcode::Fstore => self.op_fstore(ip),
            Opcode::Fadd | Opcode::Fsub | Opcode::Fmul | Opcode::Fdiv => {
                self.op_float_arithmetic(ip, opcode)
            }
            Opcode::Flt | Opcode::Flte | Opcode::Fgt | Opcode::Fgte | Opcode::Feq => {
                self.op_float_compare(ip, opcode)
            }

            Opcode::Bstore => self.op_bstore(ip),
            Opcode::Badd | Opcode::Bsub => self.op_byte_arithmetic(ip, opcode),
            Opcode::Binc => self.op_binc(ip, 1),
            Opcode::Bdec => self.op_binc(ip, -1),
            Opcode::Blt | Opcode::Blte | Opcode::Bgt | Opcode::Bgte | Opcode::Beq => {
                self.op_byte_compare(ip, opcode)
            }

            Opcode::Itof | Opcode::Ftoi | Opcode::Stoi | Opcode::Stof => {
                self.op_convert(ip, opcode)
            }

            Opcode::Strstore => self.op_strstore(ip),
            Opcode::Streq => self.op_streq(ip),

            Opcode::Vec => self.op_vec(ip),
            Opcode::Vinsert => self.op_vinsert(ip),
            Opcode::Vpush => self.op_vpush(ip),
            Opcode::Vpop => self.op_vpop(ip),
            Opcode::Vat => self.op_vat(ip),
            Opcode::Vlen => self.op_vlen(ip),

            Opcode::Bool => self.op_bool(ip),
            Opcode::Not => self.op_not(ip),
            Opcode::And | Opcode::Or => self.op_logic(ip, opcode),

            Opcode::Move => self.op_move(ip),
            Opcode::Copy => self.op_copy(ip),
            Opcode::Ref => self.op_ref(ip),
            Opcode::Ptr => self.op_ptr(ip),
            Opcode::Deptr => self.op_deptr(ip),
            Opcode::Swap => self.op_swap(ip),
            Opcode::Free => self.op_free(ip),
            Opcode::Empty => self.op_empty(ip),
            Opcode::Isnull => self.op_isnull(ip),
            Opcode::Isptr => self.op_isptr(ip),

            Opcode::Ress => self.op_ress(ip),
            Opcode::Tmpri => self.op_tmpri(ip),
            Opcode::Tmpro => self.op_tmpro(ip),

            Opcode::Print => self.op_print(ip, true),
            Opcode::Echo => self.op_print(ip, false),

            Opcode::Clbind => self.op_clbind(ip),
            Opcode::Closure => self.op_closure(ip),
            Opcode::Function => self.op_function(ip),
            Opcode::Fcall => self.op_fcall(ip),

            Opcode::Frame => self.op_frame(ip),
            Opcode::Param => self.op_param(ip),
            Opcode::Paref => self.op_paref(ip),
            Opcode::Paptr => self.op_paptr(ip),
            Opcode::Call => self.op_call(ip),
            Opcode::Arg => self.op_arg(ip),
            Opcode::Argc => self.op_argc(ip),

            Opcode::Jump => self.op_jump(ip),
            Opcode::Branch => self.op_branch(ip),

            Opcode::Throw => self.op_throw(ip),
            Opcode::Catch => self.op_catch(ip),
            Opcode::Pull => self.op_pull(ip),
            Opcode::Tryframe => self.op_tryframe(ip),
            Opcode::Try => self.op_try(ip),
            Opcode::Leave => self.op_leave(ip),

            Opcode::Import => self.op_import(ip),
            Opcode::Link => self.op_link(ip),

            Opcode::Class | Opcode::Prototype => self.op_class(ip),
            Opcode::Derive => self.op_derive(ip),
            Opcode::Attach => self.op_attach(ip),
            Opcode::Register => self.op_register(ip),
            Opcode::New => self.op_new(ip),
            Opcode::Msg => self.op_msg(ip),

            Opcode::End => {
                return self.op_end().map(|resumed| match resumed {
                    Some(next) => Tick::Next(next),
                    None => Tick::Drained,
                })
            }
        };
        next.map(Tick::Next)
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}
