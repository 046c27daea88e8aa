use std::os::unix::net::UnixStream;
use std::process::Command;

use tetherd_bt::{BluetoothctlRunner, ConnectivityProbe};

struct CheckResult {
    passed: bool,
    label: String,
}

impl CheckResult {
    fn pass(label: impl Into<String>) -> Self {
        Self { passed: true, label: label.into() }
    }

    fn fail(label: impl Into<String>) -> Self {
        Self { passed: false, label: label.into() }
    }
}

impl std::fmt::Display for CheckResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = if self.passed { "PASS" } else { "FAIL" };
        write!(f, "[{}] {}", tag, self.label)
    }
}

fn check_bluetoothctl() -> CheckResult {
    let found = Command::new("which")
        .arg("bluetoothctl")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if found {
        CheckResult::pass("bluetoothctl found in PATH")
    } else {
        CheckResult::fail("bluetoothctl not found in PATH (install bluez)")
    }
}

fn check_controller() -> CheckResult {
    let probe = ConnectivityProbe::new(Box::new(BluetoothctlRunner::default()));
    match probe.controller_powered() {
        Ok(true) => CheckResult::pass("bluetooth controller is powered"),
        Ok(false) => CheckResult::fail("bluetooth controller is off (run: bluetoothctl power on)"),
        Err(e) => CheckResult::fail(format!("bluetooth controller unavailable: {e}")),
    }
}

fn check_daemon_binary() -> CheckResult {
    if Command::new("which").arg("tetherd").output().map(|o| o.status.success()).unwrap_or(false) {
        return CheckResult::pass("tetherd binary found in PATH");
    }
    if std::path::Path::new("./target/release/tetherd").exists() {
        return CheckResult::pass("tetherd binary found at ./target/release/tetherd");
    }
    if std::path::Path::new("./target/debug/tetherd").exists() {
        return CheckResult::pass("tetherd binary found at ./target/debug/tetherd");
    }
    CheckResult::fail("tetherd binary not found (run: cargo build)")
}

fn check_stale_sockets() -> CheckResult {
    let entries: Vec<_> = glob::glob("/tmp/tetherd/*.sock")
        .into_iter()
        .flatten()
        .filter_map(|e| e.ok())
        .collect();

    if entries.is_empty() {
        return CheckResult::pass("no sockets found (clean state)");
    }

    let mut stale = Vec::new();
    let mut live = Vec::new();

    for path in &entries {
        match UnixStream::connect(path) {
            Ok(_) => live.push(path.display().to_string()),
            Err(_) => stale.push(path.display().to_string()),
        }
    }

    if !stale.is_empty() {
        return CheckResult::fail(format!(
            "stale socket(s) detected: {} (remove manually)",
            stale.join(", ")
        ));
    }

    CheckResult::pass(format!(
        "daemon already running (live socket(s): {})",
        live.join(", ")
    ))
}

pub fn run_preflight() -> i32 {
    let results = [
        check_bluetoothctl(),
        check_controller(),
        check_daemon_binary(),
        check_stale_sockets(),
    ];

    let mut any_fail = false;
    for r in &results {
        println!("{}", r);
        if !r.passed {
            any_fail = true;
        }
    }

    if any_fail { 1 } else { 0 }
}
