//! Parsers for bluetoothctl output.

/// A device line from `bluetoothctl devices Connected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    pub address: String,
    pub name: String,
}

/// Parse `bluetoothctl devices Connected` output.
///
/// Lines look like `Device AA:BB:CC:DD:EE:FF Some Device Name`; the name is
/// everything after the address and may contain spaces. Non-device lines
/// (prompt noise, agent chatter) are skipped.
pub fn parse_device_list(output: &str) -> Vec<DeviceEntry> {
    output
        .lines()
        .filter_map(|line| {
            let rest = line.trim().strip_prefix("Device ")?;
            let (address, name) = rest.split_once(' ')?;
            if !looks_like_address(address) {
                return None;
            }
            Some(DeviceEntry {
                address: address.to_string(),
                name: name.trim().to_string(),
            })
        })
        .collect()
}

/// Whether the named device appears in `devices Connected` output.
pub fn is_device_connected(output: &str, target: &str) -> bool {
    parse_device_list(output).iter().any(|d| d.name == target)
}

/// Parse `bluetoothctl show` output for the controller power state.
/// Returns `None` when no `Powered:` line is present.
pub fn parse_powered(output: &str) -> Option<bool> {
    output.lines().find_map(|line| {
        let value = line.trim().strip_prefix("Powered:")?.trim();
        Some(value.eq_ignore_ascii_case("yes"))
    })
}

fn looks_like_address(s: &str) -> bool {
    s.len() == 17
        && s.split(':').count() == 6
        && s.split(':')
            .all(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_hexdigit()))
}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const CONNECTED: &str = "\
Device AA:BB:CC:DD:EE:FF CarKit
Device 11:22:33:44:55:66 Keyboard K380
";

    #[test]
    fn parses_connected_devices() {
        let devices = parse_device_list(CONNECTED);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].address, "AA:BB:CC:DD:EE:FF");
        assert_eq!(devices[0].name, "CarKit");
        // Names with spaces survive intact.
        assert_eq!(devices[1].name, "Keyboard K380");
    }

    #[test]
    fn target_present_and_absent() {
        assert!(is_device_connected(CONNECTED, "CarKit"));
        assert!(is_device_connected(CONNECTED, "Keyboard K380"));
        assert!(!is_device_connected(CONNECTED, "Headphones"));
        // Exact match only; no substring matching.
        assert!(!is_device_connected(CONNECTED, "Car"));
    }

    #[test]
    fn empty_output_means_nothing_connected() {
        assert!(parse_device_list("").is_empty());
        assert!(!is_device_connected("", "CarKit"));
    }

    #[test]
    fn skips_noise_lines() {
        let output = "\
[NEW] Device AA:BB:CC:DD:EE:FF should-not-match
Agent registered
Device not-an-address garbage
Device AA:BB:CC:DD:EE:FF CarKit
";
        let devices = parse_device_list(output);
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name, "CarKit");
    }

    #[test]
    fn parses_powered_state() {
        let show = "\
Controller AA:BB:CC:DD:EE:00 (public)
\tName: host
\tPowered: yes
\tDiscoverable: no
";
        assert_eq!(parse_powered(show), Some(true));
        assert_eq!(parse_powered(&show.replace("Powered: yes", "Powered: no")), Some(false));
        assert_eq!(parse_powered("no controller lines here"), None);
    }
}
