use clap::Parser;

use ftpcourier::cli::Cli;
use ftpcourier::commands;
use ftpcourier::config::Config;
use ftpcourier::logging::init_logging;

fn main() {
    let cli = Cli::parse();
    let log_dir = Config::storage_dir().map(|d| d.join("logs"));
    let guard = match init_logging(cli.verbose, log_dir.as_deref()) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("⚠️ logging disabled: {:#}", e);
            None
        }
    };

    let code = match commands::dispatch(cli) {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            2
        }
    };
    // flush buffered log lines before exiting
    drop(guard);
    std::process::exit(code);
}
