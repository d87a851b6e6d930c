use clap::Parser;
use hark_cli::cli::{run_cli, Cli};

fn main() {
    if let Err(e) = run_cli(Cli::parse()) {
        eprintln!("hark: {e:#}");
        std::process::exit(1);
    }
}
