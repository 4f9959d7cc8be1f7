use crate::relay::{Destination, RelayConfig};
use std::fmt::Write as _;

/// Render one operator's nginx-rtmp application block.
///
/// Disabled destinations keep their push line, commented out, so the stream
/// key survives the next round trip.
pub fn encode(username: &str, config: &RelayConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "application {username} {{");
    out.push_str("    live on;\n");
    out.push_str("    record off;\n");

    for destination in Destination::ALL {
        let rule = config.rule(destination);
        let prefix = if rule.enabled { "" } else { "#" };
        let _ = writeln!(
            out,
            "    {prefix}push {}{};",
            destination.push_prefix(),
            rule.stream_key
        );
    }

    out.push_str("}\n");
    out
}

/// Reconstruct the destination set from a previously rendered block.
///
/// A line belongs to a destination when it contains that destination's fixed
/// URL prefix. Everything else (`live on;`, `record off;`, the block braces,
/// hand-added directives) is ignored, so edited files still load. Destinations
/// without a matching line stay disabled with an empty key.
pub fn decode(text: &str) -> RelayConfig {
    let mut config = RelayConfig::default();

    for raw_line in text.lines() {
        let line = raw_line.trim();

        for destination in Destination::ALL {
            if line.contains(destination.push_prefix()) {
                let rule = config.rule_mut(destination);
                rule.enabled = !line.starts_with('#');
                rule.stream_key = extract_key(line);
            }
        }
    }

    config
}

/// Recover the stream key from a push line: the text between the last `/` and
/// the trailing `;`
fn extract_key(line: &str) -> String {
    let line = line.strip_prefix('#').unwrap_or(line).trim();

    match line.rsplit_once('/') {
        Some((_, tail)) => {
            let key = tail.trim();
            key.strip_suffix(';').unwrap_or(key).to_string()
        }
        None => String::new(),
    }
}
