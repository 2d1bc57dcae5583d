use std::env;

use clap::Parser;
use swp_planner::api::{Cli, run_cli, run_http_server};
use swp_planner::logging::init_logging;

#[tokio::main]
async fn main() {
    if let Err(e) = init_logging("info") {
        eprintln!("Logging setup failed: {e}");
    }

    let raw_args: Vec<String> = env::args().collect();
    if raw_args.get(1).map(|s| s.as_str()) == Some("serve") {
        let port = raw_args
            .get(2)
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(8080);
        if let Err(e) = run_http_server(port).await {
            eprintln!("Server error: {e}");
            std::process::exit(1);
        }
        return;
    }

    let cli = match Cli::try_parse_from(&raw_args) {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };
    match run_cli(cli) {
        Ok(output) => print!("{output}"),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
