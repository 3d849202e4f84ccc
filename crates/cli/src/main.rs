use std::process::ExitCode;

fn main() -> ExitCode {
    partnerline_cli::run()
}
