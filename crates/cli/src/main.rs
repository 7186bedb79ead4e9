use std::process::ExitCode;

fn main() -> ExitCode {
    ordermate_cli::run()
}
