//! Bytecode encoding and decoding utilities
//!
//! The writer/reader pair here is the single place that knows how
//! operands are laid out in the byte stream. Everything else (assembler
//! emission, the disassembler, the dispatch loop) goes through it.

use crate::opcode::Opcode;
use crate::operand::IntOp;
use thiserror::Error;

/// Errors that can occur during bytecode decoding
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Unexpected end of bytecode stream
    #[error("unexpected end of bytecode at offset {0}")]
    UnexpectedEnd(usize),

    /// Invalid UTF-8 in an embedded string
    #[error("invalid UTF-8 string at offset {0}")]
    InvalidUtf8(usize),

    /// Byte does not name an opcode
    #[error("invalid opcode {0:#04x} at offset {1}")]
    InvalidOpcode(u8, usize),
}

/// Bytecode writer for encoding instructions
#[derive(Debug)]
pub struct BytecodeWriter {
    buffer: Vec<u8>,
}

impl BytecodeWriter {
    /// Create a new bytecode writer
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Create a new bytecode writer with capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// The bytes emitted so far
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the writer and return the bytecode buffer
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Current offset (length of bytecode)
    pub fn offset(&self) -> usize {
        self.buffer.len()
    }

    /// Emit a raw byte
    pub fn emit_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Emit a 16-bit unsigned integer (little-endian)
    pub fn emit_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 32-bit unsigned integer (little-endian)
    pub fn emit_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 32-bit signed integer (little-endian)
    pub fn emit_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 32-bit float (little-endian)
    pub fn emit_f32(&mut self, value: f32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit an opcode id
    pub fn emit_opcode(&mut self, opcode: Opcode) {
        self.emit_u8(opcode.to_u8());
    }

    /// Emit a register operand: ref flag byte followed by the index
    pub fn emit_reg(&mut self, op: IntOp) {
        self.emit_u8(op.by_reference as u8);
        self.emit_i32(op.index);
    }

    /// Emit a NUL-terminated string
    pub fn emit_str(&mut self, s: &str) {
        self.buffer.extend_from_slice(s.as_bytes());
        self.buffer.push(0);
    }

    /// Append raw bytes
    pub fn emit_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Overwrite a previously emitted i32 at `offset`
    pub fn patch_i32(&mut self, offset: usize, value: i32) {
        self.buffer[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
}

impl Default for BytecodeWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Position-tracking reader over a bytecode buffer
pub struct BytecodeReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BytecodeReader<'a> {
    /// Create a reader over `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Create a reader starting at `offset`
    pub fn at(data: &'a [u8], offset: usize) -> Self {
        Self { data, pos: offset }
    }

    /// Current read position
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Whether any bytes remain
    pub fn has_more(&self) -> bool {
        self.pos < self.data.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.pos + n > self.data.len() {
            return Err(DecodeError::UnexpectedEnd(self.pos));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    /// Read a 16-bit unsigned integer (little-endian)
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Read a 32-bit unsigned integer (little-endian)
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a 32-bit signed integer (little-endian)
    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a 32-bit float (little-endian)
    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a register operand
    pub fn read_reg(&mut self) -> Result<IntOp, DecodeError> {
        let by_reference = self.read_u8()? != 0;
        let index = self.read_i32()?;
        Ok(IntOp {
            by_reference,
            index,
        })
    }

    /// Read a NUL-terminated string
    pub fn read_cstr(&mut self) -> Result<String, DecodeError> {
        let start = self.pos;
        if start > self.data.len() {
            return Err(DecodeError::UnexpectedEnd(start));
        }
        let terminator = self.data[start..]
            .iter()
            .position(|&byte| byte == 0)
            .ok_or(DecodeError::UnexpectedEnd(start))?;
        let bytes = &self.data[start..start + terminator];
        self.pos = start + terminator + 1;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8(start))
    }

    /// Read `n` raw bytes
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, DecodeError> {
        Ok(self.take(n)?.to_vec())
    }

    /// Read the opcode byte at the current position
    pub fn read_opcode(&mut self) -> Result<Opcode, DecodeError> {
        let offset = self.pos;
        let byte = self.read_u8()?;
        Opcode::from_u8(byte).ok_or(DecodeError::InvalidOpcode(byte, offset))
    }
}

/// The number of trailing NUL-terminated strings a variable-length
/// opcode carries after its fixed prefix.
fn trailing_string_count(opcode: Opcode) -> usize {
    match opcode {
        Opcode::Strstore
        | Opcode::Closure
        | Opcode::Function
        | Opcode::Call
        | Opcode::Try
        | Opcode::Import
        | Opcode::Link
        | Opcode::Class
        | Opcode::Prototype
        | Opcode::Derive
        | Opcode::New
        | Opcode::Msg => 1,
        Opcode::Catch | Opcode::Attach => 2,
        _ => 0,
    }
}

/// Compute the full encoded size of the instruction at `offset`
///
/// For fixed-size opcodes this is a table lookup; for variable-length
/// opcodes the trailing strings are walked to find their terminators.
pub fn instruction_size(code: &[u8], offset: usize) -> Result<usize, DecodeError> {
    let mut reader = BytecodeReader::at(code, offset);
    let opcode = reader.read_opcode()?;

    let mut size = opcode.fixed_size();
    if opcode.is_variable_length() {
        let mut reader = BytecodeReader::at(code, offset + size);
        for _ in 0..trailing_string_count(opcode) {
            let s = reader.read_cstr()?;
            size += s.len() + 1;
        }
    }
    Ok(size)
}
