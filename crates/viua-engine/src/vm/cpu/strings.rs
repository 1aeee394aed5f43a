//! String opcode handlers

use super::Cpu;
use crate::vm::value::Value;
use crate::vm::VmResult;
use viua_bytecode::BytecodeReader;

impl Cpu {
    pub(super) fn op_strstore(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let target = reader.read_reg()?;
        let literal = reader.read_cstr()?;
        let next = reader.position();

        let target = self.resolve(target)?;
        self.place(target, Value::Str(literal))?;
        Ok(next)
    }

    pub(super) fn op_streq(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let lhs = reader.read_reg()?;
        let rhs = reader.read_reg()?;
        let target = reader.read_reg()?;
        let next = reader.position();

        let lhs = self.string_at(self.resolve(lhs)?)?;
        let rhs = self.string_at(self.resolve(rhs)?)?;
        let target = self.resolve(target)?;
        self.place(target, Value::Boolean(lhs == rhs))?;
        Ok(next)
    }
}
