//! Verification passes
//!
//! Independent checks over the expanded source; the first fatal
//! diagnostic aborts assembly. Warnings are printed to stdout and do
//! not stop the build unless promoted to errors by the options.

use crate::gather::Invocables;
use crate::options::CompileOptions;
use crate::tokens::{after_chunk, chunk, extract, get2};
use crate::AsmError;
use rustc_hash::FxHashMap;
use viua_bytecode::Opcode;

const DIRECTIVES: [&str; 11] = [
    ".function:",
    ".signature:",
    ".bsignature:",
    ".block:",
    ".end",
    ".name:",
    ".mark:",
    ".main:",
    ".type:",
    ".class:",
    ".link:",
];

fn source_line(source_map: &FxHashMap<usize, usize>, expanded_index: usize) -> usize {
    source_map
        .get(&expanded_index)
        .copied()
        .unwrap_or(expanded_index)
}

/// Every line starting with `.` must be a known assembler directive
pub fn verify_directives(
    expanded: &[String],
    source_map: &FxHashMap<usize, usize>,
) -> Result<(), AsmError> {
    for (index, line) in expanded.iter().enumerate() {
        let line = line.trim_start();
        if line.is_empty() || !line.starts_with('.') {
            continue;
        }
        let token = chunk(line);
        if !DIRECTIVES.contains(&token) {
            return Err(AsmError::fatal_at(
                format!("unrecognised assembler directive: `{}`", token),
                source_line(source_map, index),
            ));
        }
    }
    Ok(())
}

/// Every instruction line must open with a known mnemonic
pub fn verify_instructions(
    expanded: &[String],
    source_map: &FxHashMap<usize, usize>,
) -> Result<(), AsmError> {
    for (index, line) in expanded.iter().enumerate() {
        let line = line.trim_start();
        if line.is_empty() || line.starts_with('.') || line.starts_with(';') {
            continue;
        }
        let token = chunk(line);
        if Opcode::from_mnemonic(token).is_none() {
            return Err(AsmError::fatal_at(
                format!("unrecognised instruction: `{}`", token),
                source_line(source_map, index),
            ));
        }
    }
    Ok(())
}

/// `ress` operands must be legal set names; libraries may use `global`
/// only inside `main`
pub fn verify_ress_instructions(
    expanded: &[String],
    source_map: &FxHashMap<usize, usize>,
    as_lib: bool,
) -> Result<(), AsmError> {
    const LEGAL: [&str; 4] = ["global", "local", "static", "temp"];

    let mut function = String::new();
    for (index, line) in expanded.iter().enumerate() {
        let line = line.trim_start();
        if line.starts_with(".function:") {
            function = chunk(after_chunk(line)).to_string();
            continue;
        }
        if chunk(line) != "ress" {
            continue;
        }

        let register_set = chunk(after_chunk(line));
        if !LEGAL.contains(&register_set) {
            return Err(AsmError::fatal_at(
                format!(
                    "illegal register set name in ress instruction: '{}'",
                    register_set
                ),
                source_line(source_map, index),
            ));
        }
        if register_set == "global" && as_lib && function != "main" {
            return Err(AsmError::fatal_at(
                "global registers used in library function",
                source_line(source_map, index),
            ));
        }
    }
    Ok(())
}

/// Every defined function must have a non-empty body
pub fn verify_function_bodies_are_nonempty(functions: &Invocables) -> Result<(), AsmError> {
    for name in &functions.names {
        let instructions = functions.bodies[name]
            .iter()
            .filter(|line| !line.starts_with('.'))
            .count();
        if instructions == 0 {
            return Err(AsmError::fatal(format!("function '{}' is empty", name)));
        }
    }
    Ok(())
}

/// `try` targets and `catch` catcher blocks must be defined blocks or
/// block signatures
pub fn verify_block_tries(
    expanded: &[String],
    source_map: &FxHashMap<usize, usize>,
    blocks: &Invocables,
) -> Result<(), AsmError> {
    for (index, line) in expanded.iter().enumerate() {
        let line = line.trim_start();
        let block = match chunk(line) {
            "try" => chunk(after_chunk(line)).to_string(),
            "catch" => {
                let operands = after_chunk(line);
                let type_token = extract(operands);
                chunk(operands.trim_start()[type_token.len()..].trim_start()).to_string()
            }
            _ => continue,
        };
        if block.is_empty() || blocks.is_known(&block) {
            continue;
        }
        return Err(AsmError::fatal_at(
            format!("cannot enter undefined block '{}'", block),
            source_line(source_map, index),
        ));
    }
    Ok(())
}

/// Every `frame` must be consumed by exactly one call-family
/// instruction before the next `frame` or `end`
pub fn verify_frame_balance(
    expanded: &[String],
    source_map: &FxHashMap<usize, usize>,
) -> Result<(), AsmError> {
    let mut balance: i32 = 0;
    let mut previous_frame_line = 0;

    for (index, line) in expanded.iter().enumerate() {
        let line = line.trim_start();
        if line.is_empty() {
            continue;
        }
        let instruction = chunk(line);
        if !matches!(instruction, "call" | "fcall" | "msg" | "frame" | "end") {
            continue;
        }

        match instruction {
            "call" | "fcall" | "msg" => balance -= 1,
            "frame" => balance += 1,
            _ => {}
        }

        if balance < 0 {
            return Err(AsmError::fatal_at(
                format!("call with '{}' without a frame", instruction),
                source_line(source_map, index),
            ));
        }
        if balance > 1 {
            return Err(AsmError::fatal_at(
                format!(
                    "excess frame spawned (unused frame spawned at line {})",
                    source_line(source_map, previous_frame_line) + 1
                ),
                source_line(source_map, index),
            ));
        }
        if instruction == "end" && balance > 0 {
            return Err(AsmError::fatal_at(
                format!(
                    "leftover frame (spawned at line {})",
                    source_line(source_map, previous_frame_line) + 1
                ),
                source_line(source_map, index),
            ));
        }

        if instruction == "frame" {
            previous_frame_line = index;
        }
    }
    Ok(())
}

/// `main` should end with `end`, not `halt`: halting skips frame
/// teardown
pub fn verify_main_function_does_not_end_with_halt(
    functions: &Invocables,
) -> Result<(), AsmError> {
    let body = match functions.bodies.get("main") {
        Some(body) => body,
        None => return Err(AsmError::error("cannot verify undefined 'main' function")),
    };
    let last = body
        .iter()
        .rev()
        .find(|line| !line.starts_with('.'))
        .map(|line| chunk(line))
        .unwrap_or("");
    if last == "halt" {
        return Err(AsmError::error(
            "using 'halt' instead of 'end' as last instruction in main function \
             leads to memory leaks",
        ));
    }
    Ok(())
}

/// `frame` must be given operands
pub fn verify_frame_instructions(
    expanded: &[String],
    source_map: &FxHashMap<usize, usize>,
) -> Result<(), AsmError> {
    for (index, line) in expanded.iter().enumerate() {
        let line = line.trim_start();
        if chunk(line) == "frame" && after_chunk(line).is_empty() {
            return Err(AsmError::fatal_at(
                "frame instruction without operands",
                source_line(source_map, index),
            ));
        }
    }
    Ok(())
}

/// Functions should end with a returning instruction
///
/// A warning by default (when enabled); promoted to fatal by
/// `--Emissing-end`/`--Eall`. `main` may end with `halt`.
pub fn verify_function_bodies_end(
    functions: &Invocables,
    options: &CompileOptions,
) -> Result<(), AsmError> {
    for name in &functions.names {
        let last = functions.bodies[name]
            .iter()
            .rev()
            .find(|line| !line.starts_with('.'))
            .map(|line| chunk(line))
            .unwrap_or("");
        let properly_ended = last == "end" || (name == "main" && last == "halt");
        if properly_ended {
            continue;
        }
        if options.missing_end_is_error() {
            return Err(AsmError::fatal(format!(
                "missing 'end' at the end of function '{}'",
                name
            )));
        }
        if options.missing_end_is_warning() {
            println!("warning: missing 'end' at the end of function '{}'", name);
        }
    }
    Ok(())
}

/// Blocks must have bodies ending in `leave`, `end` or `halt`
pub fn verify_block_bodies_end(blocks: &Invocables) -> Result<(), AsmError> {
    for name in &blocks.names {
        let last = blocks.bodies[name]
            .iter()
            .rev()
            .find(|line| !line.starts_with('.'))
            .map(|line| chunk(line));
        match last {
            None => {
                return Err(AsmError::fatal(format!("block '{}' has empty body", name)));
            }
            Some("leave") | Some("end") | Some("halt") => {}
            Some(_) => {
                return Err(AsmError::fatal(format!(
                    "missing returning instruction ('leave', 'end' or 'halt') \
                     at the end of block '{}'",
                    name
                )));
            }
        }
    }
    Ok(())
}

/// Every `call` target must be a defined function, a linked function,
/// or a declared signature
pub fn verify_function_calls_are_defined(
    expanded: &[String],
    source_map: &FxHashMap<usize, usize>,
    function_names: &[String],
    function_signatures: &[String],
) -> Result<(), AsmError> {
    for (index, line) in expanded.iter().enumerate() {
        let line = line.trim_start();
        if chunk(line) != "call" {
            continue;
        }

        let (register, name) = get2(after_chunk(line));
        let callee = if name.is_empty() { register } else { name };
        let defined = function_names.iter().any(|known| *known == callee)
            || function_signatures.iter().any(|known| *known == callee);
        if !defined {
            return Err(AsmError::fatal_at(
                format!("call to undefined function '{}'", callee),
                source_line(source_map, index),
            ));
        }
    }
    Ok(())
}

/// `closure` and `function` must capture defined functions
pub fn verify_callable_creations(
    expanded: &[String],
    source_map: &FxHashMap<usize, usize>,
    function_names: &[String],
    function_signatures: &[String],
) -> Result<(), AsmError> {
    for (index, line) in expanded.iter().enumerate() {
        let line = line.trim_start();
        let callable_type = chunk(line);
        if callable_type != "closure" && callable_type != "function" {
            continue;
        }

        let (_, name) = get2(after_chunk(line));
        let defined = function_names.iter().any(|known| *known == name)
            || function_signatures.iter().any(|known| *known == name);
        if !defined {
            return Err(AsmError::fatal_at(
                format!(
                    "{} from undefined function '{}'",
                    callable_type, name
                ),
                source_line(source_map, index),
            ));
        }
    }
    Ok(())
}

/// Run every pre-generation pass in order; first failure aborts
pub fn verify_all(
    expanded: &[String],
    source_map: &FxHashMap<usize, usize>,
    functions: &Invocables,
    blocks: &Invocables,
    options: &CompileOptions,
) -> Result<(), AsmError> {
    verify_directives(expanded, source_map)?;
    verify_instructions(expanded, source_map)?;
    verify_ress_instructions(expanded, source_map, options.as_lib)?;
    verify_function_bodies_are_nonempty(functions)?;
    verify_block_tries(expanded, source_map, blocks)?;
    verify_frame_balance(expanded, source_map)?;
    if !options.as_lib
        && options.halt_is_last_is_error()
        && functions.bodies.contains_key("main")
    {
        verify_main_function_does_not_end_with_halt(functions)?;
    }
    verify_frame_instructions(expanded, source_map)?;
    verify_function_bodies_end(functions, options)?;
    verify_block_bodies_end(blocks)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expand::expand_source;
    use crate::gather::{gather_blocks, gather_functions};

    fn setup(source: &[&str]) -> (Vec<String>, FxHashMap<usize, usize>, Invocables, Invocables) {
        let lines: Vec<String> = source.iter().map(|line| line.to_string()).collect();
        let (expanded, map) = expand_source(&lines);
        let functions = gather_functions(&expanded, &map).unwrap();
        let blocks = gather_blocks(&expanded, &map).unwrap();
        (expanded, map, functions, blocks)
    }

    #[test]
    fn test_unknown_directive() {
        let (expanded, map, _, _) = setup(&[".wat: nope"]);
        let err = verify_directives(&expanded, &map).unwrap_err();
        assert!(err.message.contains("unrecognised assembler directive"));
        assert!(err.message.contains("line 1"));
    }

    #[test]
    fn test_unknown_instruction() {
        let (expanded, map, _, _) = setup(&[".function: main", "    frobnicate 1", "    end", ".end"]);
        let err = verify_instructions(&expanded, &map).unwrap_err();
        assert!(err.message.contains("unrecognised instruction: `frobnicate`"));
        assert!(err.message.contains("line 2"));
    }

    #[test]
    fn test_illegal_ress_name() {
        let (expanded, map, _, _) = setup(&[".function: main", "    ress cosmic", "    end", ".end"]);
        let err = verify_ress_instructions(&expanded, &map, false).unwrap_err();
        assert!(err.message.contains("illegal register set name"));
    }

    #[test]
    fn test_global_ress_in_library() {
        let (expanded, map, _, _) = setup(&[".function: helper", "    ress global", "    end", ".end"]);
        let err = verify_ress_instructions(&expanded, &map, true).unwrap_err();
        assert!(err.message.contains("global registers used in library function"));
        // Fine outside of libraries.
        assert!(verify_ress_instructions(&expanded, &map, false).is_ok());
    }

    #[test]
    fn test_call_without_frame() {
        let (expanded, map, _, _) = setup(&[".function: main", "    call 0 f", "    end", ".end"]);
        let err = verify_frame_balance(&expanded, &map).unwrap_err();
        assert!(err.message.contains("call with 'call' without a frame"));
    }

    #[test]
    fn test_double_frame() {
        let (expanded, map, _, _) = setup(&[
            ".function: main",
            "    frame 0",
            "    frame 0",
            "    call 0 f",
            "    end",
            ".end",
        ]);
        let err = verify_frame_balance(&expanded, &map).unwrap_err();
        assert!(err.message.contains("excess frame spawned"));
    }

    #[test]
    fn test_leftover_frame() {
        let (expanded, map, _, _) = setup(&[".function: main", "    frame 0", "    end", ".end"]);
        let err = verify_frame_balance(&expanded, &map).unwrap_err();
        assert!(err.message.contains("leftover frame"));
    }

    #[test]
    fn test_balanced_frames() {
        let (expanded, map, _, _) = setup(&[
            ".function: main",
            "    frame 1",
            "    param 0 1",
            "    call 1 helper",
            "    end",
            ".end",
        ]);
        assert!(verify_frame_balance(&expanded, &map).is_ok());
    }

    #[test]
    fn test_undefined_call_target() {
        let (expanded, map, functions, _) = setup(&[
            ".function: main",
            "    frame 0",
            "    call 0 nowhere",
            "    end",
            ".end",
        ]);
        let err = verify_function_calls_are_defined(
            &expanded,
            &map,
            &functions.names,
            &functions.signatures,
        )
        .unwrap_err();
        assert!(err.message.contains("call to undefined function 'nowhere'"));
    }

    #[test]
    fn test_signature_satisfies_call() {
        let (expanded, map, functions, _) = setup(&[
            ".signature: printer.print",
            ".function: main",
            "    frame 0",
            "    call 0 printer.print",
            "    end",
            ".end",
        ]);
        assert!(verify_function_calls_are_defined(
            &expanded,
            &map,
            &functions.names,
            &functions.signatures,
        )
        .is_ok());
    }

    #[test]
    fn test_undefined_try_block() {
        let (expanded, map, _, blocks) = setup(&[
            ".function: main",
            "    tryframe",
            "    try ghost",
            "    end",
            ".end",
        ]);
        let err = verify_block_tries(&expanded, &map, &blocks).unwrap_err();
        assert!(err.message.contains("cannot enter undefined block 'ghost'"));
    }

    #[test]
    fn test_block_must_end_properly() {
        let (_, _, _, blocks) = setup(&[".block: handler", "    izero 0", ".end"]);
        let err = verify_block_bodies_end(&blocks).unwrap_err();
        assert!(err.message.contains("missing returning instruction"));
    }

    #[test]
    fn test_missing_end_promoted_to_error() {
        let (_, _, functions, _) = setup(&[".function: helper", "    izero 0", ".end"]);
        let options = CompileOptions {
            error_missing_end: true,
            ..CompileOptions::default()
        };
        let err = verify_function_bodies_end(&functions, &options).unwrap_err();
        assert!(err.message.contains("missing 'end' at the end of function 'helper'"));

        // Not even a warning without the flags.
        assert!(verify_function_bodies_end(&functions, &CompileOptions::default()).is_ok());
    }

    #[test]
    fn test_halt_is_last_check() {
        let (_, _, functions, _) = setup(&[".function: main", "    izero 0", "    halt", ".end"]);
        let err = verify_main_function_does_not_end_with_halt(&functions).unwrap_err();
        assert!(err.message.contains("leads to memory leaks"));
    }

    #[test]
    fn test_callable_creation_checked() {
        let (expanded, map, functions, _) = setup(&[
            ".function: main",
            "    closure 1 ghost",
            "    end",
            ".end",
        ]);
        let err = verify_callable_creations(
            &expanded,
            &map,
            &functions.names,
            &functions.signatures,
        )
        .unwrap_err();
        assert!(err.message.contains("closure from undefined function 'ghost'"));
    }
}
