//! Best-effort host wake step run before an Enable command is published.
//!
//! The actuator drives a UI, so the display may need waking first. The
//! configured program is run through the shell with a bounded timeout;
//! the outcome only sets the command's `was_woken` flag and is never a
//! reason to withhold the command itself.

use std::time::Duration;

use tokio::process::Command;

/// Run the wake program. Returns whether it completed successfully within
/// the timeout. All failure modes are logged and absorbed.
pub async fn run_wake_program(program: &str, timeout: Duration) -> bool {
    let child = Command::new("sh").arg("-c").arg(program).output();
    match tokio::time::timeout(timeout, child).await {
        Ok(Ok(output)) if output.status.success() => {
            tracing::debug!(program, "wake program succeeded");
            true
        }
        Ok(Ok(output)) => {
            tracing::warn!(
                program,
                code = output.status.code().unwrap_or(-1),
                "wake program exited nonzero"
            );
            false
        }
        Ok(Err(e)) => {
            tracing::warn!(program, error = %e, "wake program failed to start");
            false
        }
        Err(_) => {
            tracing::warn!(program, timeout_ms = timeout.as_millis() as u64, "wake program timed out");
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
