//! Vector opcode handlers
//!
//! Vectors own their elements: `vinsert` and `vpush` move the source
//! register's value into the vector, `vpop` moves an element out, and
//! `vat` places an aliasing reference so the vector keeps ownership.

use super::Cpu;
use crate::vm::registers::REFERENCE;
use crate::vm::value::{Value, ValueCell};
use crate::vm::{RuntimeException, VmResult};
use std::rc::Rc;
use viua_bytecode::BytecodeReader;

/// Translate a possibly-negative position into a vector index
///
/// `-1` addresses the last element, matching `vpop`/`vat` defaults.
fn element_index(position: i32, length: usize, for_insert: bool) -> VmResult<usize> {
    let limit = if for_insert { length as i32 } else { length as i32 - 1 };
    let index = if position < 0 {
        length as i32 + position + if for_insert { 1 } else { 0 }
    } else {
        position
    };
    if index < 0 || index > limit {
        return Err(RuntimeException::out_of_range(format!(
            "vector index out of range: {}",
            position
        )));
    }
    Ok(index as usize)
}

impl Cpu {
    fn vector_cell(&self, index: usize) -> VmResult<ValueCell> {
        let value = self.fetch(index)?;
        {
            let borrowed = value.borrow();
            if !matches!(&*borrowed, Value::Vector(_)) {
                return Err(RuntimeException::type_error(format!(
                    "expected Vector, got {}",
                    borrowed.type_name()
                )));
            }
        }
        Ok(value)
    }

    pub(super) fn op_vec(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let target = reader.read_reg()?;
        let next = reader.position();

        let target = self.resolve(target)?;
        self.place(target, Value::Vector(Vec::new()))?;
        Ok(next)
    }

    pub(super) fn op_vinsert(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let vector = reader.read_reg()?;
        let source = reader.read_reg()?;
        let position = reader.read_reg()?;
        let next = reader.position();

        let vector = self.resolve(vector)?;
        let source = self.resolve(source)?;
        let position = self.resolve_value(position)?;

        let vector_cell = self.vector_cell(vector)?;
        let element = self.fetch(source)?;
        self.uregset()?.empty(source)?;

        let mut vector_value = vector_cell.borrow_mut();
        if let Value::Vector(items) = &mut *vector_value {
            let index = element_index(position, items.len(), true)?;
            items.insert(index, element);
        }
        Ok(next)
    }

    pub(super) fn op_vpush(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let vector = reader.read_reg()?;
        let source = reader.read_reg()?;
        let next = reader.position();

        let vector = self.resolve(vector)?;
        let source = self.resolve(source)?;

        let vector_cell = self.vector_cell(vector)?;
        let element = self.fetch(source)?;
        self.uregset()?.empty(source)?;

        let mut vector_value = vector_cell.borrow_mut();
        if let Value::Vector(items) = &mut *vector_value {
            items.push(element);
        }
        Ok(next)
    }

    pub(super) fn op_vpop(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let vector = reader.read_reg()?;
        let target = reader.read_reg()?;
        let position = reader.read_reg()?;
        let next = reader.position();

        let vector = self.resolve(vector)?;
        let target = self.resolve(target)?;
        let position = self.resolve_value(position)?;

        let vector_cell = self.vector_cell(vector)?;
        let element = {
            let mut vector_value = vector_cell.borrow_mut();
            match &mut *vector_value {
                Value::Vector(items) => {
                    let index = element_index(position, items.len(), false)?;
                    items.remove(index)
                }
                _ => unreachable!("vector_cell checked the type"),
            }
        };
        self.uregset()?.set(target, element)?;
        Ok(next)
    }

    pub(super) fn op_vat(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let vector = reader.read_reg()?;
        let target = reader.read_reg()?;
        let position = reader.read_reg()?;
        let next = reader.position();

        let vector = self.resolve(vector)?;
        let target = self.resolve(target)?;
        let position = self.resolve_value(position)?;

        let vector_cell = self.vector_cell(vector)?;
        let element = {
            let vector_value = vector_cell.borrow();
            match &*vector_value {
                Value::Vector(items) => {
                    let index = element_index(position, items.len(), false)?;
                    Rc::clone(&items[index])
                }
                _ => unreachable!("vector_cell checked the type"),
            }
        };
        let regs = self.uregset()?;
        regs.set(target, element)?;
        regs.flag(target, REFERENCE)?;
        Ok(next)
    }

    pub(super) fn op_vlen(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let vector = reader.read_reg()?;
        let target = reader.read_reg()?;
        let next = reader.position();

        let vector = self.resolve(vector)?;
        let target = self.resolve(target)?;

        let vector_cell = self.vector_cell(vector)?;
        let length = match &*vector_cell.borrow() {
            Value::Vector(items) => items.len(),
            _ => unreachable!("vector_cell checked the type"),
        };
        self.place(target, Value::Integer(length as i32))?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_index_defaults() {
        // -1 selects the last element for reads, appends for inserts
        assert_eq!(element_index(-1, 3, false).unwrap(), 2);
        assert_eq!(element_index(-1, 3, true).unwrap(), 3);
        assert_eq!(element_index(0, 3, false).unwrap(), 0);
        assert!(element_index(3, 3, false).is_err());
        assert_eq!(element_index(3, 3, true).unwrap(), 3);
        assert!(element_index(-1, 0, false).is_err());
    }
}
