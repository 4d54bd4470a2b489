use clap::Parser;
use tidyplan::cli::{Cli, init_logging, run};
use tidyplan::output::OutputFormatter;
use std::process;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        if e.needs_manual_recovery() {
            OutputFormatter::manual_recovery(&e.to_string());
        } else {
            OutputFormatter::error(&format!("Error: {}", e));
        }
        process::exit(1);
    }
}
