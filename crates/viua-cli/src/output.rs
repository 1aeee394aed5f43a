//! Colored diagnostic output
//!
//! Diagnostics carry their severity as a `fatal:`/`error:`/`warning:`
//! prefix; only the prefix is colored. Respects `NO_COLOR`.

use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

fn color_choice() -> ColorChoice {
    if std::env::var_os("NO_COLOR").is_some() {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    }
}

/// Print a diagnostic to stdout, coloring its severity prefix
pub fn print_diagnostic(message: &str) {
    let (prefix, color) = if message.starts_with("fatal:") {
        ("fatal:", Color::Red)
    } else if message.starts_with("error:") {
        ("error:", Color::Red)
    } else if message.starts_with("warning:") {
        ("warning:", Color::Yellow)
    } else {
        let _ = writeln!(std::io::stdout(), "{}", message);
        return;
    };

    let mut stdout = StandardStream::stdout(color_choice());
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true));
    let _ = write!(stdout, "{}", prefix);
    let _ = stdout.reset();
    let _ = writeln!(stdout, "{}", &message[prefix.len()..]);
}
