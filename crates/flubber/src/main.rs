//! `flubber <script>`: evaluate a call script in a sandboxed context.

use env_logger::{Builder, Env};
use flubber::RunnerConfig;
use js::StdioOutput;
use log::error;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn main() -> ExitCode {
    Builder::from_env(Env::default().filter_or("RUST_LOG", "warn")).init();

    let config = match RunnerConfig::from_args(env::args().skip(1)) {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            return ExitCode::from(2);
        }
    };
    let runtime = match Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("failed to start runtime: {err}");
            return ExitCode::FAILURE;
        }
    };
    match runtime.block_on(flubber::run(&config, Arc::new(StdioOutput))) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
