//! Viua VM disassembler front-end

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use viua_asm::disassembler::{disassemble, DisassemblyOptions};
use viua_bytecode::Image;
use viua_cli::output::print_diagnostic;

#[derive(Parser)]
#[command(name = "viua-dis")]
#[command(about = "Viua VM disassembler", version)]
struct Args {
    /// Also disassemble the __entry function
    #[arg(short = 'e', long = "with-entry")]
    with_entry: bool,

    /// Include info about the disassembled file in the output
    #[arg(short = 'i', long = "info")]
    info: bool,

    /// Show verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Input file
    input: PathBuf,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let image = match Image::load_executable(&args.input) {
        Ok(image) => image,
        Err(err) => {
            print_diagnostic(&format!("fatal: {}", err));
            return ExitCode::FAILURE;
        }
    };
    if args.verbose {
        println!(
            "message: disassembling \"{}\": {} bytes of code",
            args.input.display(),
            image.code.len()
        );
    }

    let options = DisassemblyOptions {
        with_entry: args.with_entry,
        include_info: args.info,
    };
    match disassemble(&image, &options) {
        Ok(text) => {
            print!("{}", text);
            ExitCode::SUCCESS
        }
        Err(err) => {
            print_diagnostic(&format!("fatal: disassembly failed: {}", err));
            ExitCode::FAILURE
        }
    }
}
