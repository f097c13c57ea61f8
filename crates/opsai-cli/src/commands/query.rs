use anyhow::Result;
use opsai_policy::Mode;

use crate::context::AppContext;

/// Runs one natural-language request through the orchestrator and prints
/// its summary. Returns the process exit code: 0 unless the run itself
/// failed to even start (an unrecoverable step failure still prints a
/// narrative and exits 0, per the orchestrator's own recoverable/fatal
/// distinction).
pub async fn handle_query(ctx: &AppContext, text: &str, dry_run: bool) -> Result<i32> {
    let orchestrator = ctx.build_orchestrator(Mode::Cli)?;
    let outcome = orchestrator.run(text, dry_run).await?;

    println!("{}", outcome.summary);

    Ok(if outcome.completed { 0 } else { 1 })
}
