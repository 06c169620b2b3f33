use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

/// Fetch today's trade data from cafef and import it into AmiBroker.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Path to the user configuration file
    #[arg(short, long, default_value = "user_config.ini")]
    config: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    cafef_fetcher::run(&args.config)
}
