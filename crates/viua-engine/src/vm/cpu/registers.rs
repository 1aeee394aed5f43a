//! Register move and register-set switching handlers

use super::Cpu;
use crate::vm::registers::REFERENCE;
use crate::vm::value::{cell, Value};
use crate::vm::{RuntimeException, VmResult};
use viua_bytecode::BytecodeReader;

impl Cpu {
    fn two_registers(&self, ip: usize) -> VmResult<(usize, usize, usize)> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let a = reader.read_reg()?;
        let b = reader.read_reg()?;
        let next = reader.position();
        Ok((self.resolve(a)?, self.resolve(b)?, next))
    }

    fn one_register(&self, ip: usize) -> VmResult<(usize, usize)> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let a = reader.read_reg()?;
        let next = reader.position();
        Ok((self.resolve(a)?, next))
    }

    pub(super) fn op_move(&mut self, ip: usize) -> VmResult<usize> {
        let (source, target, next) = self.two_registers(ip)?;
        self.uregset()?.move_value(source, target)?;
        Ok(next)
    }

    pub(super) fn op_copy(&mut self, ip: usize) -> VmResult<usize> {
        let (source, target, next) = self.two_registers(ip)?;
        let copied = self.fetch(source)?.borrow().deep_copy();
        self.place(target, copied)?;
        Ok(next)
    }

    /// Alias one register's value in another; the target slot shares the
    /// cell and is flagged `REFERENCE`
    pub(super) fn op_ref(&mut self, ip: usize) -> VmResult<usize> {
        let (source, target, next) = self.two_registers(ip)?;
        let shared = self.fetch(source)?;
        let regs = self.uregset()?;
        regs.set(target, shared)?;
        regs.flag(target, REFERENCE)?;
        Ok(next)
    }

    pub(super) fn op_ptr(&mut self, ip: usize) -> VmResult<usize> {
        let (source, target, next) = self.two_registers(ip)?;
        let pointee = self.fetch(source)?;
        self.place(target, Value::Pointer(pointee))?;
        Ok(next)
    }

    /// Dereference a pointer: the target receives a deep copy of the
    /// pointee
    pub(super) fn op_deptr(&mut self, ip: usize) -> VmResult<usize> {
        let (source, target, next) = self.two_registers(ip)?;
        let value = self.fetch(source)?;
        let copied = {
            let value = value.borrow();
            match &*value {
                Value::Pointer(pointee) => pointee.borrow().deep_copy(),
                other => {
                    return Err(RuntimeException::type_error(format!(
                        "expected Pointer, got {}",
                        other.type_name()
                    )))
                }
            }
        };
        self.place(target, copied)?;
        Ok(next)
    }

    pub(super) fn op_swap(&mut self, ip: usize) -> VmResult<usize> {
        let (a, b, next) = self.two_registers(ip)?;
        self.uregset()?.swap(a, b)?;
        Ok(next)
    }

    pub(super) fn op_free(&mut self, ip: usize) -> VmResult<usize> {
        let (target, next) = self.one_register(ip)?;
        self.uregset()?.free(target)?;
        Ok(next)
    }

    pub(super) fn op_empty(&mut self, ip: usize) -> VmResult<usize> {
        let (target, next) = self.one_register(ip)?;
        self.uregset()?.empty(target)?;
        Ok(next)
    }

    pub(super) fn op_isnull(&mut self, ip: usize) -> VmResult<usize> {
        let (source, target, next) = self.two_registers(ip)?;
        let is_null = self.uregset_ref()?.at(source)?.is_none();
        self.place(target, Value::Boolean(is_null))?;
        Ok(next)
    }

    pub(super) fn op_isptr(&mut self, ip: usize) -> VmResult<usize> {
        let (source, target, next) = self.two_registers(ip)?;
        let is_pointer = matches!(&*self.fetch(source)?.borrow(), Value::Pointer(_));
        self.place(target, Value::Boolean(is_pointer))?;
        Ok(next)
    }

    /// Switch the current register set: 0 global, 1 local, 2 static,
    /// 3 temp (not implemented)
    pub(super) fn op_ress(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let set_id = reader.read_i32()?;
        let next = reader.position();

        match set_id {
            0 => self.switch_to_global(),
            1 => {
                if self.frames.is_empty() {
                    return Err(RuntimeException::bad_frame(
                        "no frame for local register set",
                    ));
                }
                self.switch_to_local();
            }
            2 => {
                let function_name = self
                    .frames
                    .last()
                    .map(|frame| frame.function_name.clone())
                    .ok_or_else(|| {
                        RuntimeException::bad_frame("no frame for static register set")
                    })?;
                self.ensure_static_registers(&function_name);
                self.switch_to_static(function_name);
            }
            3 => {
                return Err(RuntimeException::bad_ress(
                    "temporary register set is not implemented",
                ))
            }
            other => {
                return Err(RuntimeException::bad_ress(format!(
                    "illegal register set ID in ress instruction: {}",
                    other
                )))
            }
        }
        Ok(next)
    }

    pub(super) fn op_tmpri(&mut self, ip: usize) -> VmResult<usize> {
        let (source, next) = self.one_register(ip)?;
        if self.tmp.is_some() {
            eprintln!(
                "warning: vm: storing in non-empty temporary register: previous value dropped"
            );
        }
        let copied = self.fetch(source)?.borrow().deep_copy();
        self.tmp = Some(cell(copied));
        Ok(next)
    }

    pub(super) fn op_tmpro(&mut self, ip: usize) -> VmResult<usize> {
        let (target, next) = self.one_register(ip)?;
        let value = self.tmp.take().ok_or_else(|| {
            RuntimeException::null_deref("(tmpro) temporary register is empty")
        })?;
        if self.uregset_ref()?.at(target)?.is_some() && self.errors {
            eprintln!(
                "warning: vm: dropping from temporary into non-empty register: \
                 possible references loss and register corruption"
            );
        }
        self.uregset()?.set(target, value)?;
        Ok(next)
    }
}
