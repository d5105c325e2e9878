//! Rejection message templates.

use super::window::WindowSpec;

/// Render a rejection message for `spec`.
///
/// Supported placeholders: `{max}`, `{interval_secs}`, `{interval_ms}`.
/// Unknown placeholders are left as written.
pub fn render(template: &str, spec: &WindowSpec) -> String {
    template
        .replace("{max}", &spec.max.to_string())
        .replace("{interval_secs}", &format_secs(spec.duration_ms))
        .replace("{interval_ms}", &spec.duration_ms.to_string())
}

/// Whole seconds print without a fraction; anything else keeps up to three
/// decimals.
fn format_secs(ms: u64) -> String {
    if ms % 1000 == 0 {
        (ms / 1000).to_string()
    } else {
        let secs = format!("{:.3}", ms as f64 / 1000.0);
        secs.trim_end_matches('0').to_string()
    }
}
