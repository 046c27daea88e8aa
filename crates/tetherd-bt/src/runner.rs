//! BtCommandRunner trait and BluetoothctlRunner (sync subprocess wrapper).

use crate::error::BtError;

/// Trait for executing bluetoothctl commands. Enables mock injection for
/// testing.
pub trait BtCommandRunner: Send + Sync {
    fn run(&self, args: &[&str]) -> Result<String, BtError>;
}

impl<T: BtCommandRunner + ?Sized> BtCommandRunner for &T {
    fn run(&self, args: &[&str]) -> Result<String, BtError> {
        (**self).run(args)
    }
}

/// Real runner using `std::process::Command`.
pub struct BluetoothctlRunner {
    bin: String,
}

impl BluetoothctlRunner {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }
}

impl Default for BluetoothctlRunner {
    fn default() -> Self {
        Self::new("bluetoothctl")
    }
}

impl BtCommandRunner for BluetoothctlRunner {
    fn run(&self, args: &[&str]) -> Result<String, BtError> {
        tracing::debug!(?args, "running bluetoothctl");
        let output = std::process::Command::new(&self.bin)
            .args(args)
            .output()
            .map_err(BtError::Io)?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);

        // bluetoothctl reports a missing controller on either stream and
        // does not reliably set the exit code for it.
        if stdout.contains("No default controller available")
            || stderr.contains("No default controller available")
        {
            return Err(BtError::NoController);
        }
        if !output.status.success() {
            return Err(BtError::CommandFailed(format!(
                "exit code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }
        Ok(stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_runner_uses_bluetoothctl() {
        let runner = BluetoothctlRunner::default();
        assert_eq!(runner.bin, "bluetoothctl");
    }

    #[test]
    fn blanket_ref_impl() {
        struct Mock;
        impl BtCommandRunner for Mock {
            fn run(&self, _args: &[&str]) -> Result<String, BtError> {
                Ok("ok".to_string())
            }
        }
        let mock = Mock;
        let r: &Mock = &mock;
        assert_eq!(r.run(&[]).expect("ok"), "ok");
    }
}
