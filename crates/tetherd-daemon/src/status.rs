use crate::server::StatusInfo;

/// Indicator glyph for the connection state.
fn link_indicator(info: &StatusInfo) -> &'static str {
    if info.connected {
        "●"
    } else if info.debounce_active {
        "◉"
    } else {
        "○"
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

/// Format the full status output for `tetherd status`.
///
/// Example output:
/// ```text
/// TETHERD Status
/// ─────────────────────────────────────────────────────────────
/// ◉ CarKit  disconnected (debouncing until 2026-08-01T09:00:05+00:00)
///   automation on   hotspot on   last change 2026-08-01T09:00:00+00:00
/// ```
pub fn format_status(info: &StatusInfo) -> String {
    let mut out = String::new();

    out.push_str("TETHERD Status\n");
    out.push_str("─────────────────────────────────────────────────────────────\n");

    if info.target.is_empty() {
        out.push_str("  No target configured.\n");
        return out;
    }

    let link = if info.connected {
        "connected".to_string()
    } else if info.debounce_active {
        match &info.debounce_deadline {
            Some(deadline) => format!("disconnected (debouncing until {deadline})"),
            None => "disconnected (debouncing)".to_string(),
        }
    } else {
        "disconnected".to_string()
    };

    out.push_str(&format!("{} {}  {}\n", link_indicator(info), info.target, link));
    out.push_str(&format!(
        "  automation {}   hotspot {}   last change {}\n",
        on_off(info.automation_enabled),
        on_off(info.hotspot_enabled),
        if info.last_change.is_empty() { "never" } else { &info.last_change },
    ));

    out
}
