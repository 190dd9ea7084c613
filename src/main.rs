use clap::Parser;
use extsort::cli::{Args, install_interrupt_handler, run};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

fn main() -> ExitCode {
    let args = Args::parse();

    let cancel_flag = Arc::new(AtomicBool::new(false));
    if let Err(e) = install_interrupt_handler(Arc::clone(&cancel_flag)) {
        eprintln!("Warning: could not listen for Ctrl-C: {}", e);
    }

    run(&args, cancel_flag).exit_code()
}
