//! `jump` and `branch`

use super::Cpu;
use crate::vm::{RuntimeException, VmResult};
use viua_bytecode::BytecodeReader;

impl Cpu {
    pub(super) fn op_jump(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let target = reader.read_i32()?;

        let target = target as usize;
        if target == ip {
            return Err(RuntimeException::new(
                "aborting: JUMP instruction pointing to itself",
            ));
        }
        Ok(target)
    }

    pub(super) fn op_branch(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let condition = reader.read_reg()?;
        let when_true = reader.read_i32()?;
        let when_false = reader.read_i32()?;

        let condition = self.resolve(condition)?;
        let taken = self.fetch(condition)?.borrow().boolean();
        Ok(if taken {
            when_true as usize
        } else {
            when_false as usize
        })
    }
}
