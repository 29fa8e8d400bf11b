//! `shuttle-echo` binary entry point: runs the echo server.

use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    match shuttle::run_server() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            writeln!(io::stderr(), "shuttle-echo: {error}").ok();
            ExitCode::FAILURE
        }
    }
}
