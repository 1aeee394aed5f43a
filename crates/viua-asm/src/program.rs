//! Per-function bytecode builder
//!
//! A `Program` accumulates the encoded instructions of one function or
//! block body, remembering the byte offset of every instruction and of
//! every emitted jump field. Jump targets stay symbolic until
//! `finalize`, when the unit's position in the image is known; `.N`
//! absolute-index jumps additionally wait for the whole image (see
//! [`resolve_absolute_jumps`]).

use crate::gather::{get_marks, get_names};
use crate::tokens::{after_chunk, chunk, extract, get2, get3, is_num, unquote};
use crate::AsmError;
use rustc_hash::FxHashMap;
use viua_bytecode::encoder::instruction_size;
use viua_bytecode::{BytecodeWriter, IntOp, Opcode};

/// A jump destination as written in source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpTarget {
    /// Instruction index within the current function
    Index(usize),
    /// Instruction index counted over the whole image (`.N` syntax)
    AbsoluteIndex(usize),
    /// Raw byte address (`0xHEX` syntax), emitted untouched
    Byte(usize),
}

#[derive(Debug)]
struct PendingJump {
    /// Offset of the 4-byte field within this unit's code
    field: usize,
    target: JumpTarget,
}

/// One function or block body compiled to bytecode, before placement
#[derive(Debug, Default)]
pub struct Program {
    writer: BytecodeWriter,
    /// Byte offset of every emitted instruction, in order
    instruction_offsets: Vec<usize>,
    jumps: Vec<PendingJump>,
}

/// A placed unit: final code plus jump bookkeeping for the image
#[derive(Debug)]
pub struct AssembledUnit {
    pub code: Vec<u8>,
    /// Absolute byte positions of relocatable jump fields; these feed
    /// the library jump table
    pub relative_jump_fields: Vec<u32>,
    /// Absolute-index jumps to patch once the whole image exists:
    /// (absolute field position, target instruction index)
    pub absolute_jumps: Vec<(usize, usize)>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes emitted so far
    pub fn size(&self) -> usize {
        self.writer.offset()
    }

    fn begin_instruction(&mut self, opcode: Opcode) {
        self.instruction_offsets.push(self.writer.offset());
        self.writer.emit_opcode(opcode);
    }

    /// Opcode with no operands
    pub fn emit_none(&mut self, opcode: Opcode) {
        self.begin_instruction(opcode);
    }

    /// Opcode with one register operand
    pub fn emit_one(&mut self, opcode: Opcode, a: IntOp) {
        self.begin_instruction(opcode);
        self.writer.emit_reg(a);
    }

    /// Opcode with two register operands
    pub fn emit_two(&mut self, opcode: Opcode, a: IntOp, b: IntOp) {
        self.begin_instruction(opcode);
        self.writer.emit_reg(a);
        self.writer.emit_reg(b);
    }

    /// Opcode with three register operands
    pub fn emit_three(&mut self, opcode: Opcode, a: IntOp, b: IntOp, c: IntOp) {
        self.begin_instruction(opcode);
        self.writer.emit_reg(a);
        self.writer.emit_reg(b);
        self.writer.emit_reg(c);
    }

    pub fn emit_fstore(&mut self, target: IntOp, value: f32) {
        self.begin_instruction(Opcode::Fstore);
        self.writer.emit_reg(target);
        self.writer.emit_f32(value);
    }

    pub fn emit_bstore(&mut self, target: IntOp, value: IntOp) {
        self.begin_instruction(Opcode::Bstore);
        self.writer.emit_reg(target);
        self.writer.emit_u8(value.by_reference as u8);
        self.writer.emit_u8(value.index as u8);
    }

    pub fn emit_ress(&mut self, register_set_id: i32) {
        self.begin_instruction(Opcode::Ress);
        self.writer.emit_i32(register_set_id);
    }

    pub fn emit_jump(&mut self, target: JumpTarget) {
        self.begin_instruction(Opcode::Jump);
        self.jumps.push(PendingJump {
            field: self.writer.offset(),
            target,
        });
        self.writer.emit_i32(0);
    }

    pub fn emit_branch(&mut self, condition: IntOp, when_true: JumpTarget, when_false: JumpTarget) {
        self.begin_instruction(Opcode::Branch);
        self.writer.emit_reg(condition);
        self.jumps.push(PendingJump {
            field: self.writer.offset(),
            target: when_true,
        });
        self.writer.emit_i32(0);
        self.jumps.push(PendingJump {
            field: self.writer.offset(),
            target: when_false,
        });
        self.writer.emit_i32(0);
    }

    pub fn emit_strstore(&mut self, target: IntOp, literal: &str) {
        self.begin_instruction(Opcode::Strstore);
        self.writer.emit_reg(target);
        self.writer.emit_str(literal);
    }

    /// Register operand plus one trailing name (`call`, `closure`,
    /// `function`, `class`, `prototype`, `derive`, `new`, `msg`)
    pub fn emit_with_name(&mut self, opcode: Opcode, register: IntOp, name: &str) {
        self.begin_instruction(opcode);
        self.writer.emit_reg(register);
        self.writer.emit_str(name);
    }

    /// One trailing name only (`import`, `link`, `try`)
    pub fn emit_name_only(&mut self, opcode: Opcode, name: &str) {
        self.begin_instruction(opcode);
        self.writer.emit_str(name);
    }

    pub fn emit_catch(&mut self, type_name: &str, block_name: &str) {
        self.begin_instruction(Opcode::Catch);
        self.writer.emit_str(type_name);
        self.writer.emit_str(block_name);
    }

    pub fn emit_attach(&mut self, register: IntOp, function_name: &str, method_name: &str) {
        self.begin_instruction(Opcode::Attach);
        self.writer.emit_reg(register);
        self.writer.emit_str(function_name);
        self.writer.emit_str(method_name);
    }

    /// Place this unit at `section_offset` within the image, rewriting
    /// every in-function jump to its absolute byte position
    pub fn finalize(mut self, section_offset: usize) -> Result<AssembledUnit, AsmError> {
        let mut relative_jump_fields = Vec::new();
        let mut absolute_jumps = Vec::new();

        for jump in &self.jumps {
            match jump.target {
                JumpTarget::Index(index) => {
                    let byte = if index == self.instruction_offsets.len() {
                        // Jump past the last instruction: the next unit.
                        self.writer.offset()
                    } else {
                        *self.instruction_offsets.get(index).ok_or_else(|| {
                            AsmError::fatal(format!(
                                "jump to instruction {} outside the function",
                                index
                            ))
                        })?
                    };
                    self.writer
                        .patch_i32(jump.field, (byte + section_offset) as i32);
                    relative_jump_fields.push((jump.field + section_offset) as u32);
                }
                JumpTarget::AbsoluteIndex(index) => {
                    absolute_jumps.push((jump.field + section_offset, index));
                }
                JumpTarget::Byte(byte) => {
                    self.writer.patch_i32(jump.field, byte as i32);
                }
            }
        }

        Ok(AssembledUnit {
            code: self.writer.into_bytes(),
            relative_jump_fields,
            absolute_jumps,
        })
    }
}

/// Patch `.N` absolute-index jumps once the full image code exists
///
/// The target is the Nth instruction of the whole image; the code is
/// walked to find its byte offset.
pub fn resolve_absolute_jumps(
    code: &mut [u8],
    absolute_jumps: &[(usize, usize)],
) -> Result<(), AsmError> {
    if absolute_jumps.is_empty() {
        return Ok(());
    }

    let mut boundaries = Vec::new();
    let mut offset = 0;
    while offset < code.len() {
        boundaries.push(offset);
        offset += instruction_size(code, offset)
            .map_err(|err| AsmError::fatal(format!("malformed image during jump fix-up: {}", err)))?;
    }

    for &(field, index) in absolute_jumps {
        let byte = *boundaries.get(index).ok_or_else(|| {
            AsmError::fatal(format!(
                "absolute jump to instruction {} outside the program",
                index
            ))
        })?;
        code[field..field + 4].copy_from_slice(&(byte as i32).to_le_bytes());
    }
    Ok(())
}

/// Resolve a register token, possibly `@`-indirect or a declared name
pub fn resolve_register(
    token: &str,
    names: &FxHashMap<String, i32>,
) -> Result<IntOp, AsmError> {
    let (by_reference, body) = match token.strip_prefix('@') {
        Some(rest) => (true, rest),
        None => (false, token),
    };

    if is_num(body) {
        let index: i32 = body
            .parse()
            .map_err(|_| AsmError::fatal(format!("invalid register index: {}", body)))?;
        return Ok(IntOp {
            by_reference,
            index,
        });
    }
    if body.is_empty() {
        return Err(AsmError::fatal("not enough operands"));
    }
    names
        .get(body)
        .map(|&index| IntOp {
            by_reference,
            index,
        })
        .ok_or_else(|| AsmError::fatal(format!("undeclared name: {}", body)))
}

/// Resolve a jump token against marks and the current instruction index
pub fn resolve_jump(
    token: &str,
    marks: &FxHashMap<String, usize>,
    instruction_index: usize,
) -> Result<JumpTarget, AsmError> {
    if is_num(token) && !token.starts_with('-') {
        let index = token
            .parse()
            .map_err(|_| AsmError::fatal(format!("invalid jump index: {}", token)))?;
        return Ok(JumpTarget::Index(index));
    }
    if let Some(rest) = token.strip_prefix("0x") {
        let byte = usize::from_str_radix(rest, 16)
            .map_err(|_| AsmError::fatal(format!("invalid byte-address jump: {}", token)))?;
        return Ok(JumpTarget::Byte(byte));
    }
    if let Some(rest) = token.strip_prefix('.') {
        if is_num(rest) {
            let index = rest
                .parse()
                .map_err(|_| AsmError::fatal(format!("invalid absolute jump: {}", token)))?;
            return Ok(JumpTarget::AbsoluteIndex(index));
        }
    }
    if let Some(rest) = token.strip_prefix('+') {
        let delta: usize = rest
            .parse()
            .map_err(|_| AsmError::fatal(format!("invalid relative jump: {}", token)))?;
        return Ok(JumpTarget::Index(instruction_index + delta));
    }
    if let Some(rest) = token.strip_prefix('-') {
        let delta: usize = rest
            .parse()
            .map_err(|_| AsmError::fatal(format!("invalid relative jump: {}", token)))?;
        if delta > instruction_index {
            return Err(AsmError::fatal(
                "use of relative jump results in a jump to negative index",
            ));
        }
        return Ok(JumpTarget::Index(instruction_index - delta));
    }

    let marker = token.strip_prefix(':').unwrap_or(token);
    marks
        .get(marker)
        .map(|&index| JumpTarget::Index(index))
        .ok_or_else(|| AsmError::fatal(format!("jump to unrecognised marker: {}", marker)))
}

/// Total encoded size of a body's instruction lines
///
/// Authoritative for address mapping: the sum of each mnemonic's fixed
/// size plus `len + 1` for every embedded string.
pub fn count_bytes(body: &[String]) -> Result<usize, AsmError> {
    let mut bytes = 0;
    for line in body {
        let line = line.trim();
        if line.is_empty() || line.starts_with('.') || line.starts_with(';') {
            continue;
        }
        bytes += line_size(line)?;
    }
    Ok(bytes)
}

fn line_size(line: &str) -> Result<usize, AsmError> {
    let mnemonic = chunk(line);
    let opcode = Opcode::from_mnemonic(mnemonic)
        .ok_or_else(|| AsmError::fatal(format!("unrecognised instruction: `{}`", mnemonic)))?;
    let operands = after_chunk(line);

    let extra = match opcode {
        Opcode::Call => {
            let (register, name) = get2(operands);
            let name = if name.is_empty() { register } else { name };
            name.len() + 1
        }
        Opcode::Closure
        | Opcode::Function
        | Opcode::Class
        | Opcode::Prototype
        | Opcode::Derive
        | Opcode::New
        | Opcode::Msg => {
            let (_, name) = get2(operands);
            name.len() + 1
        }
        Opcode::Attach => {
            let (_, function_name, method_name) = get3(operands);
            function_name.len() + 1 + method_name.len() + 1
        }
        Opcode::Strstore => {
            let rest = after_chunk(operands);
            unquote(&extract(rest)).len() + 1
        }
        Opcode::Catch => {
            let type_name = unquote(&extract(operands));
            let block_name = chunk(after_chunk_token(operands));
            type_name.len() + 1 + block_name.len() + 1
        }
        Opcode::Import => unquote(&extract(operands)).len() + 1,
        Opcode::Link | Opcode::Try => chunk(operands).len() + 1,
        _ => 0,
    };
    Ok(opcode.fixed_size() + extra)
}

/// Text after the first extracted (possibly quoted) token
fn after_chunk_token(text: &str) -> &str {
    let token = extract(text);
    text.trim_start()[token.len()..].trim_start()
}

/// Compile one body's lines into a `Program`
///
/// Marks and named registers are gathered from the body itself; the
/// caller supplies nothing but the canonical expanded lines.
pub fn compile_body(body: &[String]) -> Result<Program, AsmError> {
    let marks = get_marks(body);
    let names = get_names(body)?;
    let mut program = Program::new();

    let mut instruction_index = 0;
    for line in body {
        let line = line.trim();
        if line.is_empty() || line.starts_with('.') || line.starts_with(';') {
            continue;
        }
        compile_line(&mut program, line, &marks, &names, instruction_index)
            .map_err(|err| AsmError {
                message: format!("{} (while assembling `{}`)", err.message, line),
            })?;
        instruction_index += 1;
    }
    Ok(program)
}

fn compile_line(
    program: &mut Program,
    line: &str,
    marks: &FxHashMap<String, usize>,
    names: &FxHashMap<String, i32>,
    instruction_index: usize,
) -> Result<(), AsmError> {
    let mnemonic = chunk(line);
    let operands = after_chunk(line);
    let opcode = Opcode::from_mnemonic(mnemonic)
        .ok_or_else(|| AsmError::fatal(format!("unimplemented instruction: {}", mnemonic)))?;

    let reg = |token: &str| resolve_register(token, names);

    match opcode {
        Opcode::Nop
        | Opcode::Tryframe
        | Opcode::Leave
        | Opcode::End
        | Opcode::Halt => program.emit_none(opcode),

        Opcode::Izero
        | Opcode::Iinc
        | Opcode::Idec
        | Opcode::Binc
        | Opcode::Bdec
        | Opcode::Bool
        | Opcode::Not
        | Opcode::Vec
        | Opcode::Free
        | Opcode::Empty
        | Opcode::Tmpri
        | Opcode::Tmpro
        | Opcode::Print
        | Opcode::Echo
        | Opcode::Clbind
        | Opcode::Argc
        | Opcode::Throw
        | Opcode::Pull
        | Opcode::Register => {
            program.emit_one(opcode, reg(chunk(operands))?);
        }

        Opcode::Istore => {
            let (target, literal) = get2(operands);
            program.emit_two(opcode, reg(&target)?, reg(&literal)?);
        }

        Opcode::Iadd
        | Opcode::Isub
        | Opcode::Imul
        | Opcode::Idiv
        | Opcode::Ilt
        | Opcode::Ilte
        | Opcode::Igt
        | Opcode::Igte
        | Opcode::Ieq
        | Opcode::Fadd
        | Opcode::Fsub
        | Opcode::Fmul
        | Opcode::Fdiv
        | Opcode::Flt
        | Opcode::Flte
        | Opcode::Fgt
        | Opcode::Fgte
        | Opcode::Feq
        | Opcode::Badd
        | Opcode::Bsub
        | Opcode::Blt
        | Opcode::Blte
        | Opcode::Bgt
        | Opcode::Bgte
        | Opcode::Beq
        | Opcode::Streq
        | Opcode::And
        | Opcode::Or => {
            let (a, b, c) = get3(operands);
            program.emit_three(opcode, reg(&a)?, reg(&b)?, reg(&c)?);
        }

        Opcode::Itof | Opcode::Ftoi | Opcode::Stoi | Opcode::Stof => {
            let (a, b) = get2(operands);
            let b = if b.is_empty() { a.clone() } else { b };
            program.emit_two(opcode, reg(&a)?, reg(&b)?);
        }

        Opcode::Move
        | Opcode::Copy
        | Opcode::Ref
        | Opcode::Ptr
        | Opcode::Deptr
        | Opcode::Swap
        | Opcode::Isnull
        | Opcode::Isptr
        | Opcode::Vpush
        | Opcode::Vlen
        | Opcode::Fcall
        | Opcode::Param
        | Opcode::Paref
        | Opcode::Paptr
        | Opcode::Arg => {
            let (a, b) = get2(operands);
            program.emit_two(opcode, reg(&a)?, reg(&b)?);
        }

        Opcode::Frame => {
            let (a, b) = get2(operands);
            let a = if a.is_empty() { "0".to_string() } else { a };
            // Default number of local registers.
            let b = if b.is_empty() { "16".to_string() } else { b };
            program.emit_two(opcode, reg(&a)?, reg(&b)?);
        }

        Opcode::Vinsert => {
            let (vector, source, position) = get3(operands);
            let position = if position.is_empty() {
                "0".to_string()
            } else {
                position
            };
            program.emit_three(opcode, reg(&vector)?, reg(&source)?, reg(&position)?);
        }
        Opcode::Vpop | Opcode::Vat => {
            let (vector, target, position) = get3(operands);
            let target = if target.is_empty() { "0".to_string() } else { target };
            let position = if position.is_empty() {
                "-1".to_string()
            } else {
                position
            };
            program.emit_three(opcode, reg(&vector)?, reg(&target)?, reg(&position)?);
        }

        Opcode::Fstore => {
            let (target, literal) = get2(operands);
            let value: f32 = literal
                .parse()
                .map_err(|_| AsmError::fatal(format!("invalid float literal: {}", literal)))?;
            program.emit_fstore(reg(&target)?, value);
        }
        Opcode::Bstore => {
            let (target, literal) = get2(operands);
            program.emit_bstore(reg(&target)?, reg(&literal)?);
        }

        Opcode::Ress => {
            let id = match chunk(operands) {
                "global" => 0,
                "local" => 1,
                "static" => 2,
                "temp" => 3,
                other => {
                    return Err(AsmError::fatal(format!(
                        "illegal register set name in ress instruction: '{}'",
                        other
                    )))
                }
            };
            program.emit_ress(id);
        }

        Opcode::Strstore => {
            let target = chunk(operands);
            let literal = unquote(&extract(after_chunk(operands)));
            program.emit_strstore(reg(target)?, &literal);
        }

        Opcode::Jump => {
            program.emit_jump(resolve_jump(chunk(operands), marks, instruction_index)?);
        }
        Opcode::Branch => {
            let (condition, when_true, when_false) = get3(operands);
            let when_true = resolve_jump(&when_true, marks, instruction_index)?;
            let when_false = if when_false.is_empty() {
                JumpTarget::Index(instruction_index + 1)
            } else {
                resolve_jump(&when_false, marks, instruction_index)?
            };
            program.emit_branch(reg(&condition)?, when_true, when_false);
        }

        Opcode::Call => {
            let (register, name) = get2(operands);
            // One-operand form: the return value is discarded.
            let (register, name) = if name.is_empty() {
                ("0".to_string(), register)
            } else {
                (register, name)
            };
            program.emit_with_name(opcode, reg(&register)?, &name);
        }
        Opcode::Closure
        | Opcode::Function
        | Opcode::Class
        | Opcode::Prototype
        | Opcode::Derive
        | Opcode::New
        | Opcode::Msg => {
            let (register, name) = get2(operands);
            program.emit_with_name(opcode, reg(&register)?, &name);
        }
        Opcode::Attach => {
            let (register, function_name, method_name) = get3(operands);
            program.emit_attach(reg(&register)?, &function_name, &method_name);
        }

        Opcode::Catch => {
            let type_name = unquote(&extract(operands));
            let block_name = chunk(after_chunk_token(operands));
            program.emit_catch(&type_name, block_name);
        }
        Opcode::Try => {
            program.emit_name_only(opcode, chunk(operands));
        }
        Opcode::Import => {
            program.emit_name_only(opcode, &unquote(&extract(operands)));
        }
        Opcode::Link => {
            program.emit_name_only(opcode, chunk(operands));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|line| line.to_string()).collect()
    }

    #[test]
    fn test_count_bytes_matches_emission() {
        let lines = body(&[
            "izero 0",
            "istore 1 40",
            "iadd 1 2 3",
            "strstore 4 \"boom\"",
            "call 1 main",
            "catch \"Exception\" handler",
            "try body",
            "frame 1",
            "end",
        ]);
        let counted = count_bytes(&lines).unwrap();
        let program = compile_body(&lines).unwrap();
        assert_eq!(counted, program.size());
    }

    #[test]
    fn test_unknown_mnemonic() {
        let err = count_bytes(&body(&["noodle 1 2"])).unwrap_err();
        assert!(err.message.contains("unrecognised instruction"));
    }

    #[test]
    fn test_resolve_register() {
        let mut names = FxHashMap::default();
        names.insert("counter".to_string(), 3);

        assert_eq!(resolve_register("7", &names).unwrap(), IntOp::direct(7));
        assert_eq!(resolve_register("@7", &names).unwrap(), IntOp::by_ref(7));
        assert_eq!(
            resolve_register("counter", &names).unwrap(),
            IntOp::direct(3)
        );
        assert_eq!(
            resolve_register("@counter", &names).unwrap(),
            IntOp::by_ref(3)
        );
        assert!(resolve_register("ghost", &names)
            .unwrap_err()
            .message
            .contains("undeclared name: ghost"));
    }

    #[test]
    fn test_resolve_jump_forms() {
        let mut marks = FxHashMap::default();
        marks.insert("loop".to_string(), 2);

        assert_eq!(resolve_jump("4", &marks, 0).unwrap(), JumpTarget::Index(4));
        assert_eq!(
            resolve_jump(".7", &marks, 0).unwrap(),
            JumpTarget::AbsoluteIndex(7)
        );
        assert_eq!(
            resolve_jump("0x1f", &marks, 0).unwrap(),
            JumpTarget::Byte(0x1f)
        );
        assert_eq!(resolve_jump("+2", &marks, 3).unwrap(), JumpTarget::Index(5));
        assert_eq!(resolve_jump("-2", &marks, 3).unwrap(), JumpTarget::Index(1));
        assert_eq!(resolve_jump("loop", &marks, 0).unwrap(), JumpTarget::Index(2));
        assert_eq!(
            resolve_jump(":loop", &marks, 0).unwrap(),
            JumpTarget::Index(2)
        );
        assert!(resolve_jump("ghost", &marks, 0).is_err());
        assert!(resolve_jump("-5", &marks, 3).is_err());
    }

    #[test]
    fn test_jump_fixup() {
        // izero (6 bytes), jump to instruction 0, izero
        let program = compile_body(&body(&["izero 0", "jump 0", "izero 1"])).unwrap();
        let unit = program.finalize(100).unwrap();

        // The jump field sits right after the opcode byte of the jump.
        let field = 6 + 1;
        let target = i32::from_le_bytes(unit.code[field..field + 4].try_into().unwrap());
        assert_eq!(target, 100);
        assert_eq!(unit.relative_jump_fields, vec![(6 + 1 + 100) as u32]);
    }

    #[test]
    fn test_branch_default_false_target() {
        // branch with two operands falls through to the next instruction
        let program = compile_body(&body(&["izero 0", "branch 0 0", "izero 1"])).unwrap();
        let unit = program.finalize(0).unwrap();

        let true_field = 6 + 1 + 5;
        let false_field = true_field + 4;
        let when_true = i32::from_le_bytes(unit.code[true_field..true_field + 4].try_into().unwrap());
        let when_false =
            i32::from_le_bytes(unit.code[false_field..false_field + 4].try_into().unwrap());
        assert_eq!(when_true, 0);
        // Next instruction starts after izero + branch.
        assert_eq!(when_false, (6 + 14) as i32);
    }

    #[test]
    fn test_mark_jump() {
        let program = compile_body(&body(&[
            "izero 0",
            ".mark: again",
            "iinc 0",
            "jump again",
        ]))
        .unwrap();
        let unit = program.finalize(0).unwrap();
        let field = 6 + 6 + 1;
        let target = i32::from_le_bytes(unit.code[field..field + 4].try_into().unwrap());
        assert_eq!(target, 6);
    }

    #[test]
    fn test_absolute_jump_resolution() {
        let program = compile_body(&body(&["izero 0", "jump .2", "izero 1"])).unwrap();
        let unit = program.finalize(0).unwrap();
        assert_eq!(unit.absolute_jumps, vec![(7, 2)]);

        let mut code = unit.code.clone();
        resolve_absolute_jumps(&mut code, &unit.absolute_jumps).unwrap();
        let target = i32::from_le_bytes(code[7..11].try_into().unwrap());
        // Instruction 2 is the final izero: 6 (izero) + 5 (jump) bytes in.
        assert_eq!(target, 11);
    }
}
