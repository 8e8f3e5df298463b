//! Grid trading bot entrypoint.
//!
//! ## Setup
//!
//! 1. Copy `.env.example` to `.env` and fill in `API_ENCRYPTION_KEY` plus
//!    either per-wallet `apiConfig` entries (via the control plane) or the
//!    process-wide fallback credentials (`API_KEY_ASTER`, `API_KEY_SECRET_ASTER`,
//!    and BingX equivalents).
//! 2. Run: `cargo run --bin grid_bot -- --config config.toml`
//!
//! Defaults to `PAPER_TRADING=true` — no real orders are placed until it is
//! set to `false`.

use std::env;

use log::error;

use grid_core::runner::Runner;

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    let config_path = if args.len() > 2 && args[1] == "--config" { args[2].clone() } else { "config.toml".to_string() };

    let runner = match Runner::build(&config_path).await {
        Ok(runner) => runner,
        Err(e) => {
            error!("failed to start grid bot: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = runner.run().await {
        error!("grid bot exited with an error: {e}");
        std::process::exit(1);
    }
}
