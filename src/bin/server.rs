//! ragchat server binary.
//! Run with: cargo run --bin ragchat-server

use std::process::ExitCode;

use ragchat::start_ragchat;

fn main() -> ExitCode {
    start_ragchat::run()
}
