//! Call protocol handlers: frame staging, parameter passing, the call
//! family, and callable values

use super::Cpu;
use crate::vm::frame::Frame;
use crate::vm::registers::{RegisterSet, BOUND, REFERENCE};
use crate::vm::value::{Value, ValueCell};
use crate::vm::{RuntimeException, VmResult};
use std::rc::Rc;
use viua_bytecode::{BytecodeReader, IntOp};

/// What an `fcall` register turned out to hold
enum Callee {
    Function(String),
    Closure(String, Vec<(usize, ValueCell)>),
}

impl Cpu {
    pub(super) fn op_frame(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let arguments = reader.read_reg()?;
        let registers = reader.read_reg()?;
        let next = reader.position();

        if self.frame_new.is_some() {
            return Err(RuntimeException::bad_frame(
                "requested new frame while last one is still unused",
            ));
        }
        let arguments = self.resolve_value(arguments)?;
        let registers = self.resolve_value(registers)?;
        if arguments < 0 || registers < 0 {
            return Err(RuntimeException::out_of_range(format!(
                "negative frame size: {} arguments, {} registers",
                arguments, registers
            )));
        }
        self.frame_new = Some(Frame::new(0, arguments as usize, registers as usize));
        Ok(next)
    }

    pub(super) fn op_param(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let slot = reader.read_reg()?;
        let source = reader.read_reg()?;
        let next = reader.position();

        let slot = self.resolve(slot)?;
        let source = self.resolve(source)?;
        let copied = self.fetch(source)?.borrow().deep_copy();

        let frame = self.frame_new.as_mut().ok_or_else(|| {
            RuntimeException::bad_frame("parameter passed without a frame")
        })?;
        if slot >= frame.args.size() {
            return Err(RuntimeException::out_of_range(
                "parameter register index out of bounds (greater than arguments set size) \
                 while adding parameter",
            ));
        }
        frame.args.put(slot, copied)?;
        Ok(next)
    }

    pub(super) fn op_paref(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let slot = reader.read_reg()?;
        let source = reader.read_reg()?;
        let next = reader.position();

        let slot = self.resolve(slot)?;
        let source = self.resolve(source)?;
        let shared = self.fetch(source)?;

        let frame = self.frame_new.as_mut().ok_or_else(|| {
            RuntimeException::bad_frame("parameter passed without a frame")
        })?;
        if slot >= frame.args.size() {
            return Err(RuntimeException::out_of_range(
                "parameter register index out of bounds (greater than arguments set size) \
                 while adding parameter",
            ));
        }
        frame.args.set(slot, shared)?;
        frame.args.flag(slot, REFERENCE)?;
        Ok(next)
    }

    pub(super) fn op_paptr(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let slot = reader.read_reg()?;
        let source = reader.read_reg()?;
        let next = reader.position();

        let slot = self.resolve(slot)?;
        let source = self.resolve(source)?;
        let pointee = self.fetch(source)?;

        let frame = self.frame_new.as_mut().ok_or_else(|| {
            RuntimeException::bad_frame("parameter passed without a frame")
        })?;
        if slot >= frame.args.size() {
            return Err(RuntimeException::out_of_range(
                "parameter register index out of bounds (greater than arguments set size) \
                 while adding parameter",
            ));
        }
        frame.args.put(slot, Value::Pointer(pointee))?;
        Ok(next)
    }

    /// Copy (or alias, if the caller used `paref`) an argument into a
    /// local register
    pub(super) fn op_arg(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let slot = reader.read_reg()?;
        let target = reader.read_reg()?;
        let next = reader.position();

        let slot = self.resolve(slot)?;
        let target = self.resolve(target)?;

        let frame = self
            .frames
            .last()
            .ok_or_else(|| RuntimeException::bad_frame("no frame to read arguments from"))?;
        if slot >= frame.args.size() {
            return Err(RuntimeException::out_of_range(format!(
                "invalid read: read from argument register out of bounds: {}",
                slot
            )));
        }

        let mask = frame.args.getmask(slot)?;
        let argument = frame.args.get(slot)?;
        let value = if mask & REFERENCE != 0 {
            argument
        } else {
            crate::vm::value::cell(argument.borrow().deep_copy())
        };

        let regs = self.uregset()?;
        regs.set(target, value)?;
        regs.setmask(target, mask)?;
        Ok(next)
    }

    pub(super) fn op_argc(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let target = reader.read_reg()?;
        let next = reader.position();

        let target = self.resolve(target)?;
        let count = self
            .frames
            .last()
            .map(|frame| frame.args.size())
            .ok_or_else(|| RuntimeException::bad_frame("no frame to count arguments of"))?;
        self.place(target, Value::Integer(count as i32))?;
        Ok(next)
    }

    pub(super) fn op_call(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let return_register = reader.read_reg()?;
        let name = reader.read_cstr()?;
        let return_address = reader.position();

        self.invoke(&name, return_register, return_address, Vec::new())
    }

    /// Call the function or closure held in a register
    pub(super) fn op_fcall(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let return_register = reader.read_reg()?;
        let source = reader.read_reg()?;
        let return_address = reader.position();

        let source = self.resolve(source)?;
        let value = self.fetch(source)?;
        let callee = {
            let value = value.borrow();
            match &*value {
                Value::Function(name) => Callee::Function(name.clone()),
                Value::Closure {
                    function_name,
                    registers,
                } => {
                    let captures = registers
                        .occupied()
                        .map(|index| (index, registers.get(index).expect("occupied slot")))
                        .collect();
                    Callee::Closure(function_name.clone(), captures)
                }
                other => {
                    return Err(RuntimeException::type_error(format!(
                        "fcall on a value that is not callable: {}",
                        other.type_name()
                    )))
                }
            }
        };

        match callee {
            Callee::Function(name) => {
                self.invoke(&name, return_register, return_address, Vec::new())
            }
            Callee::Closure(name, captures) => {
                self.invoke(&name, return_register, return_address, captures)
            }
        }
    }

    /// Consume the pending frame and transfer control
    ///
    /// Native targets get their frame pushed and execution jumps to
    /// their entry; foreign targets run to completion here and
    /// execution continues at the return address. Closure captures are
    /// aliased into the callee's local set before the jump.
    pub(super) fn invoke(
        &mut self,
        name: &str,
        return_register: IntOp,
        return_address: usize,
        captures: Vec<(usize, ValueCell)>,
    ) -> VmResult<usize> {
        let mut frame = self.take_pending_frame()?;
        frame.function_name = name.to_string();
        frame.return_address = return_address;
        frame.place_return_value_in = return_register.index;
        frame.resolve_return_value_register = return_register.by_reference;

        for (index, value) in captures {
            frame.regset.set(index, value)?;
            frame.regset.flag(index, REFERENCE)?;
        }

        if let Some(&address) = self.function_addresses.get(name) {
            self.push_frame(frame)?;
            Ok(address)
        } else if let Some(&function) = self.foreign_functions.get(name) {
            self.push_frame(frame)?;
            self.call_foreign(function)?;
            Ok(return_address)
        } else {
            Err(RuntimeException::new(format!(
                "call to undefined function: {}",
                name
            )))
        }
    }

    /// Run a registered foreign function against the just-pushed frame
    fn call_foreign(&mut self, function: crate::vm::ffi::ForeignFn) -> VmResult<()> {
        let frame: *mut Frame = self
            .frames
            .last_mut()
            .expect("invoke pushed the callee frame");
        let global: *mut RegisterSet = &mut self.regset;
        // The foreign side gets raw pointers for the duration of the
        // call only; the frame cannot move while it runs.
        unsafe {
            function(frame, std::ptr::null_mut(), global);
        }
        self.finish_call()
    }

    /// Pop the top frame; `Ok(None)` when the last frame is gone
    pub(super) fn op_end(&mut self) -> VmResult<Option<usize>> {
        let return_address = self
            .frames
            .last()
            .map(|frame| frame.return_address)
            .ok_or_else(|| RuntimeException::bad_frame("no frame on stack: nothing to end"))?;
        self.finish_call()?;
        if self.frames.is_empty() {
            Ok(None)
        } else {
            Ok(Some(return_address))
        }
    }

    /// Stage a register for capture by the next `closure`
    pub(super) fn op_clbind(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let target = reader.read_reg()?;
        let next = reader.position();

        let target = self.resolve(target)?;
        // The slot must exist to be captured.
        self.fetch(target)?;
        self.uregset()?.flag(target, BOUND)?;
        Ok(next)
    }

    /// Build a closure capturing every `clbind`-staged register
    pub(super) fn op_closure(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let target = reader.read_reg()?;
        let function_name = reader.read_cstr()?;
        let next = reader.position();

        let target = self.resolve(target)?;
        let size = self.uregset_ref()?.size();
        let mut captured = RegisterSet::new(size);

        let bound: Vec<usize> = {
            let regs = self.uregset_ref()?;
            regs.occupied()
                .filter(|&index| regs.isflagged(index, BOUND).unwrap_or(false))
                .collect()
        };
        for index in bound {
            let shared = self.fetch(index)?;
            captured.set(index, Rc::clone(&shared))?;
            captured.flag(index, REFERENCE)?;
            self.uregset()?.unflag(index, BOUND)?;
        }

        self.place(
            target,
            Value::Closure {
                function_name,
                registers: captured,
            },
        )?;
        Ok(next)
    }

    pub(super) fn op_function(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let target = reader.read_reg()?;
        let function_name = reader.read_cstr()?;
        let next = reader.position();

        let target = self.resolve(target)?;
        self.place(target, Value::Function(function_name))?;
        Ok(next)
    }
}
