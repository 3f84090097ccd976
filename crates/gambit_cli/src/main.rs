//! Gambit compiler entry point.
//!
//! Loads one source file, runs the front-end over it, prints diagnostics
//! grouped per source, and exits non-zero when any user-visible error was
//! reported. `--tokens` and `--dump-apm` expose the intermediate artefacts
//! for debugging.

mod style;

use clap::Parser;
use gambit_language::compile::compile_source;
use gambit_language::json;
use std::fs;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "gambit")]
#[command(about = "The Gambit compiler front-end", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the Gambit source file
    path: PathBuf,

    /// Print the token stream
    #[arg(long)]
    tokens: bool,

    /// Dump the program model as JSON after resolution
    #[arg(long)]
    dump_apm: bool,
}

fn main() {
    match run() {
        Ok(exit_code) => process::exit(exit_code),
        Err(error) => {
            eprintln!("{}: {error}", style::bold_red("compiler error"));
            process::exit(2);
        }
    }
}

fn run() -> Result<i32, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let content = fs::read_to_string(&cli.path)
        .map_err(|error| format!("could not load {}: {error}", cli.path.display()))?;

    let compilation = compile_source(&cli.path.display().to_string(), &content)?;

    if cli.tokens {
        for token in &compilation.tokens {
            println!("{token}");
        }
    }

    if cli.dump_apm {
        println!("{}", json::to_json(&compilation.program)?);
    }

    for (source, diagnostics) in compilation.sink.grouped_by_source() {
        eprintln!("{}", style::bold(source.file_path()));
        for diagnostic in diagnostics {
            eprintln!("{diagnostic}\n");
        }
    }

    if compilation.succeeded() {
        Ok(0)
    } else {
        let count = compilation.sink.len();
        let summary = if count == 1 {
            "1 error".to_string()
        } else {
            format!("{count} errors")
        };
        eprintln!("{}", style::bold_red(&summary));
        Ok(1)
    }
}
