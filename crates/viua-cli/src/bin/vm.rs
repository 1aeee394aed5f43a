//! Viua VM interpreter front-end

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use viua_bytecode::Image;
use viua_cli::output::print_diagnostic;
use viua_engine::Cpu;

#[derive(Parser)]
#[command(name = "viua-vm")]
#[command(about = "Viua VM bytecode interpreter", version)]
struct Args {
    /// Show per-instruction dispatch traces
    #[arg(short, long)]
    debug: bool,

    /// Emit non-fatal runtime warnings
    #[arg(long)]
    errors: bool,

    /// Bytecode image to run
    image: PathBuf,

    /// Arguments passed to the program
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let image = match Image::load_executable(&args.image) {
        Ok(image) => image,
        Err(err) => {
            print_diagnostic(&format!("fatal: {}", err));
            return ExitCode::FAILURE;
        }
    };

    let mut arguments = vec![args.image.display().to_string()];
    arguments.extend(args.args.iter().cloned());

    let mut cpu = Cpu::new();
    cpu.debug = args.debug;
    cpu.errors = args.errors;
    cpu.load(image).set_arguments(arguments);

    let code = cpu.run();
    let (_, exception, message) = cpu.exit_condition();
    if !exception.is_empty() {
        println!("uncaught object: {}: {}", exception, message);
    }

    ExitCode::from((code & 0xFF) as u8)
}
