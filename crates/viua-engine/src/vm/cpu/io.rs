//! `print` and `echo`

use super::Cpu;
use crate::vm::VmResult;
use std::io::Write;
use viua_bytecode::BytecodeReader;

impl Cpu {
    /// Shared by `print` (trailing newline) and `echo` (none)
    pub(super) fn op_print(&mut self, ip: usize, newline: bool) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let source = reader.read_reg()?;
        let next = reader.position();

        let source = self.resolve(source)?;
        let text = self.fetch(source)?.borrow().str_value();
        if newline {
            println!("{}", text);
        } else {
            print!("{}", text);
            let _ = std::io::stdout().flush();
        }
        Ok(next)
    }
}
