//! Image generation
//!
//! The final assembly stage: maps blocks and functions to addresses,
//! synthesizes `__entry`, statically links requested modules with
//! jump-table relocation, compiles every body, and produces the image.

use crate::gather::{get_links, get_main_function, Invocables};
use crate::program::{compile_body, count_bytes, resolve_absolute_jumps};
use crate::tokens::chunk;
use crate::verify::{verify_callable_creations, verify_function_calls_are_defined};
use crate::{AsmError, CompileOptions, ENTRY_FUNCTION_NAME};
use rustc_hash::FxHashMap;
use viua_bytecode::Image;

struct LinkedModule {
    name: String,
    /// Where this module's code lands in the host image
    offset: usize,
    code: Vec<u8>,
    jump_table: Vec<u32>,
}

/// Generate the bytecode image for verified, gathered source
pub fn generate(
    expanded: &[String],
    source_map: &FxHashMap<usize, usize>,
    mut functions: Invocables,
    blocks: Invocables,
    command_line_links: &[String],
    options: &CompileOptions,
) -> Result<Image, AsmError> {
    let main_function = get_main_function(expanded).unwrap_or_else(|| "main".to_string());
    if (options.verbose || options.debug) && main_function != "main" && !options.as_lib {
        println!("message: main function set to: '{}'", main_function);
    }

    check_main_returns_a_value(&functions, &main_function, options)?;

    // ── Address mapping: blocks precede functions in the image ─────
    let mut block_addresses: FxHashMap<String, usize> = FxHashMap::default();
    let mut function_addresses: FxHashMap<String, usize> = FxHashMap::default();
    let mut bytes = 0;
    for name in &blocks.names {
        block_addresses.insert(name.clone(), bytes);
        bytes += count_bytes(&blocks.bodies[name])?;
    }
    for name in &functions.names {
        function_addresses.insert(name.clone(), bytes);
        bytes += count_bytes(&functions.bodies[name])?;
    }

    // ── Entry synthesis ────────────────────────────────────────────
    if !options.as_lib {
        let entry_body: Vec<String> = vec![
            "ress local".to_string(),
            "frame 1".to_string(),
            "param 0 1".to_string(),
            format!("call 1 {}", main_function),
            "move 0 1".to_string(),
            "halt".to_string(),
        ];
        function_addresses.insert(ENTRY_FUNCTION_NAME.to_string(), bytes);
        bytes += count_bytes(&entry_body)?;
        functions.names.push(ENTRY_FUNCTION_NAME.to_string());
        functions
            .bodies
            .insert(ENTRY_FUNCTION_NAME.to_string(), entry_body);
    }

    // ── Static linking ─────────────────────────────────────────────
    let mut links = get_links(expanded);
    for link in command_line_links {
        if !links.contains(link) {
            links.push(link.clone());
        }
    }

    let mut linked_modules = Vec::new();
    let mut linked_function_names = Vec::new();
    let mut linked_block_names = Vec::new();
    for link in &links {
        if options.verbose || options.debug {
            println!("message: linking with: '{}'", link);
        }
        let image = Image::load_library(link).map_err(|err| {
            AsmError::fatal(format!("could not link module '{}': {}", link, err))
        })?;

        let offset = bytes;
        for (name, address) in &image.functions {
            function_addresses.insert(name.clone(), *address as usize + offset);
            linked_function_names.push(name.clone());
        }
        for (name, address) in &image.blocks {
            block_addresses.insert(name.clone(), *address as usize + offset);
            linked_block_names.push(name.clone());
        }
        bytes += image.code.len();
        linked_modules.push(LinkedModule {
            name: link.clone(),
            offset,
            code: image.code,
            jump_table: image.jump_table,
        });
    }

    // ── Post-link verification: every callable must now resolve ────
    let mut all_function_names = functions.names.clone();
    all_function_names.extend(linked_function_names.iter().cloned());
    verify_function_calls_are_defined(
        expanded,
        source_map,
        &all_function_names,
        &functions.signatures,
    )?;
    verify_callable_creations(
        expanded,
        source_map,
        &all_function_names,
        &functions.signatures,
    )?;

    if !options.as_lib && !all_function_names.iter().any(|name| *name == main_function) {
        return Err(AsmError::fatal(format!(
            "main function is undefined: {}",
            main_function
        )));
    }

    // ── Emission: blocks first, then functions ─────────────────────
    let mut code: Vec<u8> = Vec::with_capacity(bytes);
    let mut jump_table: Vec<u32> = Vec::new();
    let mut absolute_jumps: Vec<(usize, usize)> = Vec::new();

    for name in blocks.names.iter().chain(functions.names.iter()) {
        let body = blocks
            .bodies
            .get(name)
            .or_else(|| functions.bodies.get(name))
            .expect("gathered name has a body");
        if options.verbose || options.debug {
            println!("message: generating bytecode for \"{}\"", name);
        }
        if options.debug && options.scream {
            for line in body.iter().filter(|line| !line.starts_with('.')) {
                println!("debug: compiling line: `{}`", line);
            }
        }

        let counted = count_bytes(body)?;
        let program = compile_body(body).map_err(|err| AsmError {
            message: format!("{} (in '{}')", err.message, name),
        })?;
        if program.size() != counted {
            return Err(AsmError::fatal(format!(
                "bytecode size calculation failed for '{}': counted {}, emitted {}",
                name,
                counted,
                program.size()
            )));
        }

        let unit = program.finalize(code.len())?;
        jump_table.extend(unit.relative_jump_fields);
        absolute_jumps.extend(unit.absolute_jumps);
        code.extend(unit.code);
    }

    resolve_absolute_jumps(&mut code, &absolute_jumps)?;

    // ── Write linked modules, relocating their jump tables ─────────
    for module in linked_modules {
        let mut linked_code = module.code;
        for &position in &module.jump_table {
            let position = position as usize;
            let field: [u8; 4] = linked_code
                .get(position..position + 4)
                .and_then(|bytes| bytes.try_into().ok())
                .ok_or_else(|| {
                    AsmError::fatal(format!(
                        "corrupted jump table in linked module '{}'",
                        module.name
                    ))
                })?;
            let target = i32::from_le_bytes(field) + module.offset as i32;
            linked_code[position..position + 4].copy_from_slice(&target.to_le_bytes());
            if options.debug {
                println!(
                    "debug: adjusted jump at byte {}: now {}",
                    position + module.offset,
                    target
                );
            }
        }
        code.extend(linked_code);
    }

    if code.len() > u16::MAX as usize {
        return Err(AsmError::fatal(format!(
            "bytecode too large for image format: {} bytes",
            code.len()
        )));
    }

    // ── Address tables ─────────────────────────────────────────────
    let blocks_table: Vec<(String, u16)> = blocks
        .names
        .iter()
        .chain(linked_block_names.iter())
        .map(|name| (name.clone(), block_addresses[name] as u16))
        .collect();
    let functions_table: Vec<(String, u16)> = functions
        .names
        .iter()
        .chain(linked_function_names.iter())
        .map(|name| (name.clone(), function_addresses[name] as u16))
        .collect();

    Ok(Image {
        jump_table,
        blocks: blocks_table,
        functions: functions_table,
        code,
    })
}

/// Crude pre-check that `main` sets its return register: its
/// second-to-last instruction must be one that can populate register 0
fn check_main_returns_a_value(
    functions: &Invocables,
    main_function: &str,
    options: &CompileOptions,
) -> Result<(), AsmError> {
    if options.as_lib {
        return Ok(());
    }
    let body = match functions.bodies.get(main_function) {
        Some(body) => body,
        // Main may come from a linked module; defer to the post-link check.
        None => return Ok(()),
    };

    let instructions: Vec<&String> = body
        .iter()
        .filter(|line| !line.starts_with('.'))
        .collect();
    let second_to_last = instructions
        .len()
        .checked_sub(2)
        .map(|index| chunk(instructions[index]));
    match second_to_last {
        Some("copy") | Some("move") | Some("swap") | Some("izero") => Ok(()),
        _ => Err(AsmError::fatal("main function does not return a value")),
    }
}
