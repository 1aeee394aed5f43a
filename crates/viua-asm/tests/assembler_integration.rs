//! End-to-end assembler tests: source in, image out

use viua_asm::disassembler::{disassemble, DisassemblyOptions};
use viua_asm::{assemble, CompileOptions};
use viua_bytecode::image::ImageKind;
use viua_bytecode::Image;

fn lines(source: &str) -> Vec<String> {
    source.lines().map(str::to_string).collect()
}

fn assemble_default(source: &str) -> Result<Image, viua_asm::AsmError> {
    assemble(&lines(source), &[], &CompileOptions::default())
}

const ADD_PROGRAM: &str = "\
.function: main
    istore 1 40
    istore 2 2
    iadd 1 2 3
    move 0 3
    end
.end
";

#[test]
fn test_assembles_simple_program() {
    let image = assemble_default(ADD_PROGRAM).unwrap();

    assert!(image.function_address("main").is_some());
    assert!(image.function_address("__entry").is_some());
    assert!(!image.code.is_empty());

    // main sits at the start of the image (no blocks), __entry after it.
    assert_eq!(image.function_address("main"), Some(0));
    let entry = image.function_address("__entry").unwrap() as usize;
    assert!(entry > 0 && entry < image.code.len());
}

#[test]
fn test_undefined_call_is_fatal() {
    let source = "\
.function: main
    frame 0
    call 0 nowhere
    izero 0
    end
.end
";
    let err = assemble_default(source).unwrap_err();
    assert!(err.message.contains("call to undefined function 'nowhere'"));
}

#[test]
fn test_call_without_frame_is_fatal() {
    let source = "\
.function: f
    izero 0
    end
.end
.function: main
    call 0 f
    izero 0
    end
.end
";
    let err = assemble_default(source).unwrap_err();
    assert!(err.message.contains("call with 'call' without a frame"));
}

#[test]
fn test_library_has_no_entry_function() {
    let source = "\
.function: helper
    izero 0
    end
.end
";
    let options = CompileOptions {
        as_lib: true,
        ..CompileOptions::default()
    };
    let image = assemble(&lines(source), &[], &options).unwrap();

    assert!(image.function_address("helper").is_some());
    assert!(image.function_address("__entry").is_none());
}

#[test]
fn test_main_must_return_a_value() {
    let source = "\
.function: main
    izero 1
    end
.end
";
    let err = assemble_default(source).unwrap_err();
    assert!(err.message.contains("main function does not return a value"));
}

#[test]
fn test_blocks_precede_functions() {
    let source = "\
.block: handler
    pull 1
    leave
.end
.function: main
    tryframe
    catch \"Exception\" handler
    try body
    izero 0
    end
.end
.block: body
    strstore 1 \"boom\"
    throw 1
    leave
.end
";
    let image = assemble_default(source).unwrap();

    // Blocks are laid out first, in definition order.
    assert_eq!(image.block_address("handler"), Some(0));
    let body = image.block_address("body").unwrap();
    assert!(body > 0);
    let main = image.function_address("main").unwrap();
    assert!(main > body);
}

#[test]
fn test_roundtrip_disassemble_reassemble() {
    let source = "\
.function: greet
    strstore 1 \"hello\"
    move 0 1
    end
.end
.function: main
    frame 0
    call 1 greet
    izero 0
    end
.end
";
    let first = assemble_default(source).unwrap();

    let text = disassemble(
        &first,
        &DisassemblyOptions {
            with_entry: true,
            include_info: false,
        },
    )
    .unwrap();

    // The disassembly already contains __entry, so reassemble it as a
    // library to suppress synthesis of a second one.
    let options = CompileOptions {
        as_lib: true,
        ..CompileOptions::default()
    };
    let second = assemble(&lines(&text), &[], &options).unwrap();

    assert_eq!(first.code, second.code);
    assert_eq!(first.functions, second.functions);
    assert_eq!(first.blocks, second.blocks);
}

#[test]
fn test_static_linking_relocates_jump_table() {
    let library_source = "\
.function: spin
    izero 1
    .mark: again
    iinc 1
    istore 2 3
    ilt 1 2 3
    branch 3 again +1
    move 0 1
    end
.end
";
    let options = CompileOptions {
        as_lib: true,
        ..CompileOptions::default()
    };
    let library = assemble(&lines(library_source), &[], &options).unwrap();
    assert!(
        !library.jump_table.is_empty(),
        "marker jumps must enter the jump table"
    );

    let dir = tempfile::tempdir().unwrap();
    let library_path = dir.path().join("spinlib.wlib");
    library.write(&library_path, ImageKind::Library).unwrap();

    let host_source = "\
.function: main
    frame 0
    call 1 spin
    move 0 1
    end
.end
";
    let host = assemble(
        &lines(host_source),
        &[library_path.display().to_string()],
        &CompileOptions::default(),
    )
    .unwrap();

    // The linked function is addressable and its code sits at the end
    // of the host image.
    let offset = host.function_address("spin").unwrap() as usize;
    let host_bytes_before_link = host.code.len() - library.code.len();
    assert_eq!(offset, host_bytes_before_link);

    // Every jump field recorded in the library's table now reads its
    // original target plus the link offset.
    for &position in &library.jump_table {
        let position = position as usize;
        let original = i32::from_le_bytes(
            library.code[position..position + 4].try_into().unwrap(),
        );
        let relocated = i32::from_le_bytes(
            host.code[offset + position..offset + position + 4]
                .try_into()
                .unwrap(),
        );
        assert_eq!(relocated, original + offset as i32);
    }
}

#[test]
fn test_image_file_roundtrip() {
    let image = assemble_default(ADD_PROGRAM).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.out");
    image.write(&path, ImageKind::Executable).unwrap();

    let loaded = Image::load_executable(&path).unwrap();
    assert_eq!(loaded.code, image.code);
    assert_eq!(loaded.functions, image.functions);
}

#[test]
fn test_expansion_feeds_assembly() {
    let source = "\
.function: main
    move 0 (iadd (istore 1 40) (istore 2 2) 3)
    end
.end
";
    let expanded_image = assemble_default(source).unwrap();
    let flat_image = assemble_default(ADD_PROGRAM).unwrap();
    assert_eq!(expanded_image.code, flat_image.code);
}

#[test]
fn test_named_registers() {
    let source = "\
.function: main
    .name: 1 lhs
    .name: 2 rhs
    istore lhs 40
    istore rhs 2
    iadd lhs rhs 3
    move 0 3
    end
.end
";
    let named = assemble_default(source).unwrap();
    let plain = assemble_default(ADD_PROGRAM).unwrap();
    assert_eq!(named.code, plain.code);
}

#[test]
fn test_undefined_name_is_fatal() {
    let source = "\
.function: main
    istore counter 1
    izero 0
    end
.end
";
    let err = assemble_default(source).unwrap_err();
    assert!(err.message.contains("undeclared name: counter"));
}

#[test]
fn test_main_may_come_from_link() {
    // No main anywhere: fatal after linking resolves nothing.
    let source = "\
.function: helper
    izero 0
    end
.end
";
    let err = assemble_default(source).unwrap_err();
    assert!(err.message.contains("call to undefined function 'main'")
        || err.message.contains("main function is undefined"));
}
