//! The `magick-cache` command-line front end.

use clap::Parser;
use log::LevelFilter;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use magick_cache::cli::{self, Cli};

fn main() {
    _ = TermLogger::init(
        LevelFilter::Warn,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    );
    let cli = Cli::parse();
    if let Err(err) = cli::run(&cli) {
        eprintln!("magick-cache: {err}");
        std::process::exit(1);
    }
}
