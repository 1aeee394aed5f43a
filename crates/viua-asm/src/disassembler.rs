//! Disassembler: bytecode image back to canonical assembly
//!
//! The inverse of the encoder. By-reference operands print with an `@`
//! prefix, `ress` operands map back to their symbolic names, jump
//! offsets render in hex (re-assembling them as raw byte addresses),
//! and string literals are quoted.

use crate::tokens::enquote;
use viua_bytecode::encoder::instruction_size;
use viua_bytecode::{BytecodeReader, DecodeError, Image, IntOp, Opcode};

/// Disassembly options
#[derive(Debug, Clone, Copy, Default)]
pub struct DisassemblyOptions {
    /// Also emit the synthesized `__entry` function
    pub with_entry: bool,
    /// Prepend a size table as comments
    pub include_info: bool,
}

fn render_operand(operand: IntOp) -> String {
    operand.to_string()
}

/// Decode one instruction into its canonical assembly line
///
/// Returns the line and the instruction's encoded size.
pub fn disassemble_instruction(
    code: &[u8],
    offset: usize,
) -> Result<(String, usize), DecodeError> {
    let size = instruction_size(code, offset)?;
    let mut reader = BytecodeReader::at(code, offset);
    let opcode = reader.read_opcode()?;

    let mut line = opcode.mnemonic().to_string();
    match opcode {
        Opcode::Nop
        | Opcode::Tryframe
        | Opcode::Leave
        | Opcode::End
        | Opcode::Halt => {}

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
            line.push_str(&format!(" {}", render_operand(reader.read_reg()?)));
        }

        Opcode::Istore
        | Opcode::Itof
        | Opcode::Ftoi
        | Opcode::Stoi
        | Opcode::Stof
        | Opcode::Move
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
        | Opcode::Frame
        | Opcode::Param
        | Opcode::Paref
        | Opcode::Paptr
        | Opcode::Arg => {
            let a = reader.read_reg()?;
            let b = reader.read_reg()?;
            line.push_str(&format!(" {} {}", render_operand(a), render_operand(b)));
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
        | Opcode::Or
        | Opcode::Vinsert
        | Opcode::Vpop
        | Opcode::Vat => {
            let a = reader.read_reg()?;
            let b = reader.read_reg()?;
            let c = reader.read_reg()?;
            line.push_str(&format!(
                " {} {} {}",
                render_operand(a),
                render_operand(b),
                render_operand(c)
            ));
        }

        Opcode::Fstore => {
            let target = reader.read_reg()?;
            let value = reader.read_f32()?;
            line.push_str(&format!(" {} {}", render_operand(target), value));
        }
        Opcode::Bstore => {
            let target = reader.read_reg()?;
            let by_reference = reader.read_u8()? != 0;
            let value = reader.read_u8()?;
            line.push_str(&format!(" {} ", render_operand(target)));
            if by_reference {
                line.push('@');
            }
            line.push_str(&value.to_string());
        }

        Opcode::Ress => {
            let set = match reader.read_i32()? {
                0 => "global",
                1 => "local",
                2 => "static",
                3 => "temp",
                _ => "local",
            };
            line.push_str(&format!(" {}", set));
        }

        Opcode::Jump => {
            line.push_str(&format!(" 0x{:x}", reader.read_i32()?));
        }
        Opcode::Branch => {
            let condition = reader.read_reg()?;
            let when_true = reader.read_i32()?;
            let when_false = reader.read_i32()?;
            line.push_str(&format!(
                " {} 0x{:x} 0x{:x}",
                render_operand(condition),
                when_true,
                when_false
            ));
        }

        Opcode::Strstore => {
            let target = reader.read_reg()?;
            let literal = reader.read_cstr()?;
            line.push_str(&format!(" {} {}", render_operand(target), enquote(&literal)));
        }

        Opcode::Call
        | Opcode::Closure
        | Opcode::Function
        | Opcode::Class
        | Opcode::Prototype
        | Opcode::Derive
        | Opcode::New
        | Opcode::Msg => {
            let register = reader.read_reg()?;
            let name = reader.read_cstr()?;
            line.push_str(&format!(" {} {}", render_operand(register), name));
        }
        Opcode::Attach => {
            let register = reader.read_reg()?;
            let function_name = reader.read_cstr()?;
            let method_name = reader.read_cstr()?;
            line.push_str(&format!(
                " {} {} {}",
                render_operand(register),
                function_name,
                method_name
            ));
        }

        Opcode::Import => {
            line.push_str(&format!(" {}", enquote(&reader.read_cstr()?)));
        }
        Opcode::Link | Opcode::Try => {
            line.push_str(&format!(" {}", reader.read_cstr()?));
        }

        Opcode::Catch => {
            let type_name = reader.read_cstr()?;
            let block_name = reader.read_cstr()?;
            line.push_str(&format!(" {} {}", enquote(&type_name), block_name));
        }
    }

    Ok((line, size))
}

/// One disassemblable entity of the image
struct Entity<'a> {
    name: &'a str,
    address: usize,
    size: usize,
    is_block: bool,
}

/// Disassemble a whole image to canonical assembly text
pub fn disassemble(image: &Image, options: &DisassemblyOptions) -> Result<String, DecodeError> {
    // Blocks and functions interleave in one address space; each
    // entity runs until the next one (or the end of the code).
    let mut entities: Vec<Entity> = image
        .blocks
        .iter()
        .map(|(name, address)| (name, *address as usize, true))
        .chain(
            image
                .functions
                .iter()
                .map(|(name, address)| (name, *address as usize, false)),
        )
        .map(|(name, address, is_block)| Entity {
            name,
            address,
            size: 0,
            is_block,
        })
        .collect();
    entities.sort_by_key(|entity| entity.address);
    for index in 0..entities.len() {
        let end = entities
            .get(index + 1)
            .map(|next| next.address)
            .unwrap_or(image.code.len());
        entities[index].size = end - entities[index].address;
    }

    let mut output = String::new();

    if options.include_info {
        output.push_str(&format!("; bytecode size: {}\n", image.code.len()));
        output.push_str(";\n; functions:\n");
        for entity in entities.iter().filter(|entity| !entity.is_block) {
            output.push_str(&format!(
                ";   {} -> {} bytes at byte {}\n",
                entity.name, entity.size, entity.address
            ));
        }
        output.push_str("\n\n");
    }

    let mut first = true;
    for entity in &entities {
        if entity.name == crate::ENTRY_FUNCTION_NAME && !options.with_entry {
            continue;
        }

        if !first {
            output.push('\n');
        }
        first = false;

        let directive = if entity.is_block { ".block:" } else { ".function:" };
        output.push_str(&format!("{} {}\n", directive, entity.name));

        let mut offset = entity.address;
        let end = entity.address + entity.size;
        while offset < end {
            let (line, size) = disassemble_instruction(&image.code, offset)?;
            output.push_str(&format!("    {}\n", line));
            offset += size;
        }
        output.push_str(".end\n");
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use viua_bytecode::BytecodeWriter;

    fn encode(build: impl FnOnce(&mut BytecodeWriter)) -> Vec<u8> {
        let mut writer = BytecodeWriter::new();
        build(&mut writer);
        writer.into_bytes()
    }

    #[test]
    fn test_register_operands_render_with_at() {
        let code = encode(|writer| {
            writer.emit_opcode(Opcode::Iadd);
            writer.emit_reg(IntOp::direct(1));
            writer.emit_reg(IntOp::by_ref(2));
            writer.emit_reg(IntOp::direct(3));
        });
        let (line, size) = disassemble_instruction(&code, 0).unwrap();
        assert_eq!(line, "iadd 1 @2 3");
        assert_eq!(size, code.len());
    }

    #[test]
    fn test_ress_renders_symbolic_name() {
        let code = encode(|writer| {
            writer.emit_opcode(Opcode::Ress);
            writer.emit_i32(2);
        });
        let (line, _) = disassemble_instruction(&code, 0).unwrap();
        assert_eq!(line, "ress static");
    }

    #[test]
    fn test_jump_renders_hex() {
        let code = encode(|writer| {
            writer.emit_opcode(Opcode::Jump);
            writer.emit_i32(0x2a);
        });
        let (line, _) = disassemble_instruction(&code, 0).unwrap();
        assert_eq!(line, "jump 0x2a");
    }

    #[test]
    fn test_string_literal_is_quoted() {
        let code = encode(|writer| {
            writer.emit_opcode(Opcode::Strstore);
            writer.emit_reg(IntOp::direct(1));
            writer.emit_str("boom");
        });
        let (line, size) = disassemble_instruction(&code, 0).unwrap();
        assert_eq!(line, "strstore 1 \"boom\"");
        assert_eq!(size, code.len());
    }

    #[test]
    fn test_catch_quotes_type_only() {
        let code = encode(|writer| {
            writer.emit_opcode(Opcode::Catch);
            writer.emit_str("Exception");
            writer.emit_str("handler");
        });
        let (line, _) = disassemble_instruction(&code, 0).unwrap();
        assert_eq!(line, "catch \"Exception\" handler");
    }

    #[test]
    fn test_entry_skipped_by_default() {
        let mut code = encode(|writer| {
            writer.emit_opcode(Opcode::Izero);
            writer.emit_reg(IntOp::direct(0));
            writer.emit_opcode(Opcode::End);
        });
        let entry_at = code.len() as u16;
        code.extend(encode(|writer| {
            writer.emit_opcode(Opcode::Halt);
        }));

        let image = Image {
            jump_table: Vec::new(),
            blocks: Vec::new(),
            functions: vec![
                ("main".to_string(), 0),
                ("__entry".to_string(), entry_at),
            ],
            code,
        };

        let without = disassemble(&image, &DisassemblyOptions::default()).unwrap();
        assert!(without.contains(".function: main"));
        assert!(!without.contains("__entry"));

        let with = disassemble(
            &image,
            &DisassemblyOptions {
                with_entry: true,
                include_info: true,
            },
        )
        .unwrap();
        assert!(with.contains(".function: __entry"));
        assert!(with.contains("; bytecode size:"));
    }
}
