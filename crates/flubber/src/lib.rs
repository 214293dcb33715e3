//! Host runner for Flubber script contexts.
//!
//! Wires the pieces of the `js` crate together the way an embedding host
//! would: op dispatcher on its own task, default capability bundle, one
//! bootstrapped context, and a call script evaluated against it.

use anyhow::{Context as _, Result};
use js::{
    HostContext, HostOutput, NetPolicy, OpDispatcher, PRINT_OP, ScriptContext,
    build_default_capabilities, op_channel, op_print,
};
use log::info;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

pub mod config;
pub use config::RunnerConfig;

pub mod script;
pub use script::{Interpreter, Statement, parse_script};

/// Load, parse and evaluate the configured script.
///
/// # Errors
/// Unreadable or malformed script, context startup failure, or the first
/// uncaught error raised while evaluating.
pub async fn run(config: &RunnerConfig, output: Arc<dyn HostOutput>) -> Result<()> {
    let source = tokio::fs::read_to_string(&config.script)
        .await
        .with_context(|| format!("reading {}", config.script.display()))?;
    let statements = parse_script(&source)?;
    info!(
        "flubber: {} statements from {}",
        statements.len(),
        config.script.display()
    );
    run_statements(
        &statements,
        config.net_policy.clone(),
        config.await_timeout,
        output,
    )
    .await
}

/// Evaluate already parsed statements in a fresh context.
///
/// Returns once the script has finished and every queued host operation has
/// been dispatched.
///
/// # Errors
/// Context startup failure or the first uncaught error raised while evaluating.
pub async fn run_statements(
    statements: &[Statement],
    net_policy: NetPolicy,
    await_timeout: Duration,
    output: Arc<dyn HostOutput>,
) -> Result<()> {
    let (sender, receiver) = op_channel();
    let dispatcher = OpDispatcher::new().with_op(PRINT_OP, op_print(Arc::clone(&output)));
    let dispatch_task = tokio::spawn(dispatcher.run(receiver));

    let outcome = evaluate(statements, net_policy, await_timeout, output, sender).await;

    // Every sender lived in the bundle or the context, both gone by now.
    dispatch_task.await.context("op dispatcher stopped abnormally")?;
    outcome
}

async fn evaluate(
    statements: &[Statement],
    net_policy: NetPolicy,
    await_timeout: Duration,
    output: Arc<dyn HostOutput>,
    sender: js::OpSender,
) -> Result<()> {
    let host = HostContext::new(Handle::current(), net_policy);
    let context = {
        let capabilities = build_default_capabilities(output, sender);
        ScriptContext::new(host, &capabilities).context("context startup failed")?
    };
    let mut interpreter = Interpreter::new(&context, await_timeout);
    interpreter.run(statements).await
}
