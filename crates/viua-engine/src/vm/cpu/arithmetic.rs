//! Numeric opcode handlers: integer, float and byte families,
//! conversions, and boolean logic

use super::Cpu;
use crate::vm::value::Value;
use crate::vm::{RuntimeException, VmResult};
use viua_bytecode::{BytecodeReader, Opcode};

impl Cpu {
    fn float_at(&self, index: usize) -> VmResult<f32> {
        let value = self.fetch(index)?;
        let value = value.borrow();
        match &*value {
            Value::Float(f) => Ok(*f),
            other => Err(RuntimeException::type_error(format!(
                "expected Float, got {}",
                other.type_name()
            ))),
        }
    }

    fn byte_at(&self, index: usize) -> VmResult<u8> {
        let value = self.fetch(index)?;
        let value = value.borrow();
        match &*value {
            Value::Byte(b) => Ok(*b),
            other => Err(RuntimeException::type_error(format!(
                "expected Byte, got {}",
                other.type_name()
            ))),
        }
    }

    pub(super) fn string_at(&self, index: usize) -> VmResult<String> {
        let value = self.fetch(index)?;
        let value = value.borrow();
        match &*value {
            Value::Str(s) => Ok(s.clone()),
            other => Err(RuntimeException::type_error(format!(
                "expected String, got {}",
                other.type_name()
            ))),
        }
    }

    pub(super) fn op_izero(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let target = reader.read_reg()?;
        let next = reader.position();

        let target = self.resolve(target)?;
        self.place(target, Value::Integer(0))?;
        Ok(next)
    }

    pub(super) fn op_istore(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let target = reader.read_reg()?;
        let literal = reader.read_reg()?;
        let next = reader.position();

        let target = self.resolve(target)?;
        let value = self.resolve_value(literal)?;
        self.place(target, Value::Integer(value))?;
        Ok(next)
    }

    pub(super) fn op_int_arithmetic(&mut self, ip: usize, opcode: Opcode) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let lhs = reader.read_reg()?;
        let rhs = reader.read_reg()?;
        let target = reader.read_reg()?;
        let next = reader.position();

        let lhs = self.integer_at(self.resolve(lhs)?)?;
        let rhs = self.integer_at(self.resolve(rhs)?)?;
        let target = self.resolve(target)?;

        let result = match opcode {
            Opcode::Iadd => lhs.wrapping_add(rhs),
            Opcode::Isub => lhs.wrapping_sub(rhs),
            Opcode::Imul => lhs.wrapping_mul(rhs),
            Opcode::Idiv => {
                if rhs == 0 {
                    return Err(RuntimeException::new("integer division by zero"));
                }
                lhs.wrapping_div(rhs)
            }
            _ => unreachable!("not an integer arithmetic opcode"),
        };
        self.place(target, Value::Integer(result))?;
        Ok(next)
    }

    pub(super) fn op_int_compare(&mut self, ip: usize, opcode: Opcode) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let lhs = reader.read_reg()?;
        let rhs = reader.read_reg()?;
        let target = reader.read_reg()?;
        let next = reader.position();

        let lhs = self.integer_at(self.resolve(lhs)?)?;
        let rhs = self.integer_at(self.resolve(rhs)?)?;
        let target = self.resolve(target)?;

        let result = match opcode {
            Opcode::Ilt => lhs < rhs,
            Opcode::Ilte => lhs <= rhs,
            Opcode::Igt => lhs > rhs,
            Opcode::Igte => lhs >= rhs,
            Opcode::Ieq => lhs == rhs,
            _ => unreachable!("not an integer comparison opcode"),
        };
        self.place(target, Value::Boolean(result))?;
        Ok(next)
    }

    /// Shared by `iinc` (+1) and `idec` (-1); mutates in place
    pub(super) fn op_iinc(&mut self, ip: usize, delta: i32) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let target = reader.read_reg()?;
        let next = reader.position();

        let target = self.resolve(target)?;
        let value = self.fetch(target)?;
        let mut value = value.borrow_mut();
        match &mut *value {
            Value::Integer(n) => *n = n.wrapping_add(delta),
            other => {
                return Err(RuntimeException::type_error(format!(
                    "expected Integer, got {}",
                    other.type_name()
                )))
            }
        }
        Ok(next)
    }

    pub(super) fn op_fstore(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let target = reader.read_reg()?;
        let literal = reader.read_f32()?;
        let next = reader.position();

        let target = self.resolve(target)?;
        self.place(target, Value::Float(literal))?;
        Ok(next)
    }

    pub(super) fn op_float_arithmetic(&mut self, ip: usize, opcode: Opcode) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let lhs = reader.read_reg()?;
        let rhs = reader.read_reg()?;
        let target = reader.read_reg()?;
        let next = reader.position();

        let lhs = self.float_at(self.resolve(lhs)?)?;
        let rhs = self.float_at(self.resolve(rhs)?)?;
        let target = self.resolve(target)?;

        let result = match opcode {
            Opcode::Fadd => lhs + rhs,
            Opcode::Fsub => lhs - rhs,
            Opcode::Fmul => lhs * rhs,
            Opcode::Fdiv => lhs / rhs,
            _ => unreachable!("not a float arithmetic opcode"),
        };
        self.place(target, Value::Float(result))?;
        Ok(next)
    }

    pub(super) fn op_float_compare(&mut self, ip: usize, opcode: Opcode) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let lhs = reader.read_reg()?;
        let rhs = reader.read_reg()?;
        let target = reader.read_reg()?;
        let next = reader.position();

        let lhs = self.float_at(self.resolve(lhs)?)?;
        let rhs = self.float_at(self.resolve(rhs)?)?;
        let target = self.resolve(target)?;

        let result = match opcode {
            Opcode::Flt => lhs < rhs,
            Opcode::Flte => lhs <= rhs,
            Opcode::Fgt => lhs > rhs,
            Opcode::Fgte => lhs >= rhs,
            Opcode::Feq => lhs == rhs,
            _ => unreachable!("not a float comparison opcode"),
        };
        self.place(target, Value::Boolean(result))?;
        Ok(next)
    }

    pub(super) fn op_bstore(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let target = reader.read_reg()?;
        let literal_is_ref = reader.read_u8()? != 0;
        let literal = reader.read_u8()?;
        let next = reader.position();

        let target = self.resolve(target)?;
        let value = if literal_is_ref {
            self.integer_at(literal as usize)? as u8
        } else {
            literal
        };
        self.place(target, Value::Byte(value))?;
        Ok(next)
    }

    pub(super) fn op_byte_arithmetic(&mut self, ip: usize, opcode: Opcode) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let lhs = reader.read_reg()?;
        let rhs = reader.read_reg()?;
        let target = reader.read_reg()?;
        let next = reader.position();

        let lhs = self.byte_at(self.resolve(lhs)?)?;
        let rhs = self.byte_at(self.resolve(rhs)?)?;
        let target = self.resolve(target)?;

        let result = match opcode {
            Opcode::Badd => lhs.wrapping_add(rhs),
            Opcode::Bsub => lhs.wrapping_sub(rhs),
            _ => unreachable!("not a byte arithmetic opcode"),
        };
        self.place(target, Value::Byte(result))?;
        Ok(next)
    }

    pub(super) fn op_binc(&mut self, ip: usize, delta: i8) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let target = reader.read_reg()?;
        let next = reader.position();

        let target = self.resolve(target)?;
        let value = self.fetch(target)?;
        let mut value = value.borrow_mut();
        match &mut *value {
            Value::Byte(b) => *b = b.wrapping_add(delta as u8),
            other => {
                return Err(RuntimeException::type_error(format!(
                    "expected Byte, got {}",
                    other.type_name()
                )))
            }
        }
        Ok(next)
    }

    pub(super) fn op_byte_compare(&mut self, ip: usize, opcode: Opcode) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let lhs = reader.read_reg()?;
        let rhs = reader.read_reg()?;
        let target = reader.read_reg()?;
        let next = reader.position();

        let lhs = self.byte_at(self.resolve(lhs)?)?;
        let rhs = self.byte_at(self.resolve(rhs)?)?;
        let target = self.resolve(target)?;

        let result = match opcode {
            Opcode::Blt => lhs < rhs,
            Opcode::Blte => lhs <= rhs,
            Opcode::Bgt => lhs > rhs,
            Opcode::Bgte => lhs >= rhs,
            Opcode::Beq => lhs == rhs,
            _ => unreachable!("not a byte comparison opcode"),
        };
        self.place(target, Value::Boolean(result))?;
        Ok(next)
    }

    pub(super) fn op_convert(&mut self, ip: usize, opcode: Opcode) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let source = reader.read_reg()?;
        let target = reader.read_reg()?;
        let next = reader.position();

        let source = self.resolve(source)?;
        let target = self.resolve(target)?;

        let converted = match opcode {
            Opcode::Itof => Value::Float(self.integer_at(source)? as f32),
            Opcode::Ftoi => Value::Integer(self.float_at(source)? as i32),
            Opcode::Stoi => {
                let s = self.string_at(source)?;
                Value::Integer(s.trim().parse::<i32>().map_err(|_| {
                    RuntimeException::type_error(format!(
                        "invalid conversion from String to Integer: \"{}\"",
                        s
                    ))
                })?)
            }
            Opcode::Stof => {
                let s = self.string_at(source)?;
                Value::Float(s.trim().parse::<f32>().map_err(|_| {
                    RuntimeException::type_error(format!(
                        "invalid conversion from String to Float: \"{}\"",
                        s
                    ))
                })?)
            }
            _ => unreachable!("not a conversion opcode"),
        };
        self.place(target, converted)?;
        Ok(next)
    }

    /// Coerce a register's value to Boolean in place
    pub(super) fn op_bool(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let target = reader.read_reg()?;
        let next = reader.position();

        let target = self.resolve(target)?;
        let coerced = self.fetch(target)?.borrow().boolean();
        self.place(target, Value::Boolean(coerced))?;
        Ok(next)
    }

    pub(super) fn op_not(&mut self, ip: usize) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let target = reader.read_reg()?;
        let next = reader.position();

        let target = self.resolve(target)?;
        let negated = !self.fetch(target)?.borrow().boolean();
        self.place(target, Value::Boolean(negated))?;
        Ok(next)
    }

    pub(super) fn op_logic(&mut self, ip: usize, opcode: Opcode) -> VmResult<usize> {
        let mut reader = BytecodeReader::at(&self.bytecode, ip + 1);
        let lhs = reader.read_reg()?;
        let rhs = reader.read_reg()?;
        let target = reader.read_reg()?;
        let next = reader.position();

        let lhs = self.fetch(self.resolve(lhs)?)?.borrow().boolean();
        let rhs = self.fetch(self.resolve(rhs)?)?.borrow().boolean();
        let target = self.resolve(target)?;

        let result = match opcode {
            Opcode::And => lhs && rhs,
            Opcode::Or => lhs || rhs,
            _ => unreachable!("not a logic opcode"),
        };
        self.place(target, Value::Boolean(result))?;
        Ok(next)
    }
}
