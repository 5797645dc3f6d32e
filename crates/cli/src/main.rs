use std::process::ExitCode;

fn main() -> ExitCode {
    leadrobin_cli::run()
}
