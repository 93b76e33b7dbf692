use clap::Parser;

mod cli;
mod commands;

fn main() {
    let args = cli::Args::parse();

    if let Err(e) = commands::run(args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
