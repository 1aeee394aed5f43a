//! Exception opcode handlers: try-frame staging, throwing, catching

use super::Cpu;
use crate::vm::frame::{Catcher, TryFrame};
use crate::vm::registers::KEEP;
use crate::vm::{RuntimeException, VmResult};
use viua_bytecode::BytecodeReader;

impl Cpu {
    pub(super) fn op_tryframe(&mut self, ip: usize) -> VmResult<usize> {
        if self.try_frame_new.is_some() {
            return Err(RuntimeException::bad_frame(
                "new block frame requested while last one is unused",
            ));
        }
        self.try_frame_new = Some(TryFrame::new());
        Ok(ip + 1)
    }

    /// Register a catcher in the pending try-frame
    pub(super) fn op_catch(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let type_name = reader.read_cstr()?;
        let block_name = reader.read_cstr()?;
        let next = reader.position();

        let address = *self.block_addresses.get(&block_name).ok_or_else(|| {
            RuntimeException::new(format!(
                "cannot register catcher for undefined block: {}",
                block_name
            ))
        })?;
        let tryframe = self.try_frame_new.as_mut().ok_or_else(|| {
            RuntimeException::bad_frame("catcher registered without a pending try frame")
        })?;
        tryframe.catchers.insert(
            type_name.clone(),
            Catcher {
                type_name,
                block_name,
                address,
            },
        );
        Ok(next)
    }

    /// Commit the pending try-frame and enter the guarded block
    pub(super) fn op_try(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let block_name = reader.read_cstr()?;
        let return_address = reader.position();

        let address = *self.block_addresses.get(&block_name).ok_or_else(|| {
            RuntimeException::new(format!("cannot enter undefined block: {}", block_name))
        })?;
        let mut tryframe = self.try_frame_new.take().ok_or_else(|| {
            RuntimeException::bad_frame("try without a pending try frame")
        })?;
        tryframe.return_address = return_address;
        tryframe.frame_depth = self.frames.len();
        tryframe.block_name = block_name;
        self.tryframes.push(tryframe);
        Ok(address)
    }

    /// Move a register's value into `thrown`; the run loop unwinds
    pub(super) fn op_throw(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let source = reader.read_reg()?;
        let next = reader.position();

        let source = self.resolve(source)?;
        let regs = self.uregset_ref()?;
        if source >= regs.size() {
            return Err(RuntimeException::out_of_range(format!(
                "invalid read: register out of bounds: {}",
                source
            )));
        }
        if regs.at(source)?.is_none() {
            return Err(RuntimeException::new(format!(
                "invalid throw: register {} is empty",
                source
            )));
        }

        // Keep the thrown value alive through frame teardown.
        self.uregset()?.setmask(source, KEEP)?;
        self.thrown = Some(self.fetch(source)?);
        Ok(next)
    }

    /// Move `caught` into a register
    pub(super) fn op_pull(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let target = reader.read_reg()?;
        let next = reader.position();

        let target = self.resolve(target)?;
        let caught = self
            .caught
            .take()
            .ok_or_else(|| RuntimeException::new("no caught object to pull"))?;
        self.uregset()?.set(target, caught)?;
        Ok(next)
    }

    /// Pop the innermost try-frame and resume after its `try`
    pub(super) fn op_leave(&mut self, _ip: usize) -> VmResult<usize> {
        let tryframe = self.tryframes.pop().ok_or_else(|| {
            RuntimeException::new("bad leave: no block has been entered")
        })?;
        Ok(tryframe.return_address)
    }
}
