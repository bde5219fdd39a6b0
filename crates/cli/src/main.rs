use std::process::ExitCode;

fn main() -> ExitCode {
    brava_cli::run()
}
