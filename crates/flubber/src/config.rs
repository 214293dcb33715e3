//! Runner configuration from the command line and environment.

use anyhow::{Result, anyhow};
use js::NetPolicy;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// How long `await` polls a pending handle when nothing overrides it.
const DEFAULT_AWAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything the runner needs to evaluate one script.
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    /// Call script to evaluate.
    pub script: PathBuf,
    /// Upper bound for a single `await`.
    pub await_timeout: Duration,
    /// Network policy for `fetch`.
    pub net_policy: NetPolicy,
}

impl RunnerConfig {
    /// Parse `args` (without the program name). Accepts the script path and
    /// `--await-timeout-ms=N`; `FLUBBER_AWAIT_TIMEOUT_MS` is the fallback for
    /// the latter. Network policy comes from the environment.
    ///
    /// # Errors
    /// Missing script path, unknown flags, or a non-numeric timeout.
    pub fn from_args<I: IntoIterator<Item = String>>(args: I) -> Result<Self> {
        let mut script: Option<PathBuf> = None;
        let mut await_timeout = match env::var("FLUBBER_AWAIT_TIMEOUT_MS") {
            Ok(raw) => parse_millis(&raw)?,
            Err(_) => DEFAULT_AWAIT_TIMEOUT,
        };
        for arg in args {
            if let Some(rest) = arg.strip_prefix("--await-timeout-ms=") {
                await_timeout = parse_millis(rest)?;
                continue;
            }
            if arg.starts_with("--") {
                return Err(anyhow!("unknown flag: {arg}"));
            }
            if script.is_some() {
                return Err(anyhow!("only one script may be given"));
            }
            script = Some(PathBuf::from(arg));
        }
        let script = script.ok_or_else(|| anyhow!("usage: flubber <script> [--await-timeout-ms=N]"))?;
        Ok(Self {
            script,
            await_timeout,
            net_policy: NetPolicy::from_env(),
        })
    }
}

fn parse_millis(raw: &str) -> Result<Duration> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| anyhow!("await timeout must be a whole number of milliseconds, got {raw:?}"))
}
