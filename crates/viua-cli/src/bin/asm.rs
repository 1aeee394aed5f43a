//! Viua VM assembler front-end

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use viua_asm::{
    expand_source, gather_blocks, gather_functions, generate, verify_all, CompileOptions,
};
use viua_bytecode::image::ImageKind;
use viua_cli::output::print_diagnostic;

#[derive(Parser)]
#[command(name = "viua-asm")]
#[command(about = "Viua VM assembler", version)]
struct Args {
    /// Show verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Show debugging output
    #[arg(short, long)]
    debug: bool,

    /// Show so much debugging output it becomes noisy
    #[arg(long)]
    scream: bool,

    /// Assemble as a library
    #[arg(short = 'c', long = "lib")]
    lib: bool,

    /// Only expand the source to one-instruction-per-line form
    #[arg(short = 'E', long = "expand")]
    expand: bool,

    /// Verify source correctness without compiling
    #[arg(short = 'C', long = "verify")]
    verify: bool,

    /// Warn about everything
    #[arg(short = 'W', long = "Wall")]
    wall: bool,

    /// Warn about missing 'end' at the end of functions
    #[arg(long = "Wmissing-end")]
    wmissing_end: bool,

    /// Treat all warnings as errors
    #[arg(long = "Eall")]
    eall: bool,

    /// Treat missing 'end' as an error
    #[arg(long = "Emissing-end")]
    emissing_end: bool,

    /// Treat 'halt' as the last instruction of 'main' as an error
    #[arg(long = "Ehalt-is-last")]
    ehalt_is_last: bool,

    /// Output file (defaults to a.out, or <infile>.wlib for libraries)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Input file
    input: PathBuf,

    /// Modules to link statically
    links: Vec<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let options = CompileOptions {
        as_lib: args.lib,
        verbose: args.verbose,
        debug: args.debug,
        scream: args.scream,
        warning_all: args.wall,
        error_all: args.eall,
        warning_missing_end: args.wmissing_end,
        error_missing_end: args.emissing_end,
        error_halt_is_last: args.ehalt_is_last,
    };

    let source = match std::fs::read_to_string(&args.input) {
        Ok(source) => source,
        Err(_) => {
            print_diagnostic(&format!(
                "fatal: could not open file: {}",
                args.input.display()
            ));
            return ExitCode::FAILURE;
        }
    };
    let lines: Vec<String> = source.lines().map(str::to_string).collect();

    let out = args.out.clone().unwrap_or_else(|| {
        if args.lib {
            PathBuf::from(format!("{}.wlib", args.input.display()))
        } else {
            PathBuf::from("a.out")
        }
    });
    if options.verbose || options.debug {
        println!(
            "message: assembling \"{}\" to \"{}\"",
            args.input.display(),
            out.display()
        );
    }

    let (expanded, source_map) = expand_source(&lines);
    if args.expand {
        for line in &expanded {
            println!("{}", line);
        }
        return ExitCode::SUCCESS;
    }

    let outcome = (|| {
        let functions = gather_functions(&expanded, &source_map)?;
        let blocks = gather_blocks(&expanded, &source_map)?;
        verify_all(&expanded, &source_map, &functions, &blocks, &options)?;
        if args.verify {
            return Ok(None);
        }
        generate(
            &expanded,
            &source_map,
            functions,
            blocks,
            &args.links,
            &options,
        )
        .map(Some)
    })();

    let image = match outcome {
        Ok(None) => return ExitCode::SUCCESS,
        Ok(Some(image)) => image,
        Err(err) => {
            print_diagnostic(&err.message);
            return ExitCode::FAILURE;
        }
    };

    let kind = if args.lib {
        ImageKind::Library
    } else {
        ImageKind::Executable
    };
    if let Err(err) = image.write(&out, kind) {
        print_diagnostic(&format!("fatal: could not write image: {}", err));
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
