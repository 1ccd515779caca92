use std::env;
use std::fs;
use std::io::{self, Read};
use std::process::ExitCode;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        // Keep stdout script-parseable: the report is the product, logs are diagnostics.
        .with_writer(std::io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: kvsim <file>|-");
        return ExitCode::FAILURE;
    };

    let input = if path == "-" {
        let mut buf = String::new();
        match io::stdin().read_to_string(&mut buf) {
            Ok(_) => buf,
            Err(e) => {
                eprintln!("kvsim: failed to read stdin: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("kvsim: failed to read {path}: {e}");
                return ExitCode::FAILURE;
            }
        }
    };

    for line in kvsim_cli::run(&input) {
        println!("{line}");
    }
    ExitCode::SUCCESS
}
