use std::process::ExitCode;

fn main() -> ExitCode {
    rosterbot_cli::run()
}
