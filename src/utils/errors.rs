//! User-Friendly Error Formatting
//!
//! Provides user-friendly error messages with troubleshooting hints
//! for common error scenarios.

use std::fmt::Write;

/// Format error for user consumption
///
/// Takes technical error and produces user-friendly message with
/// troubleshooting steps and context.
pub fn format_user_error(error: &anyhow::Error) -> String {
    let mut output = String::new();

    // Header
    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "╔════════════════════════════════════════════════════════════╗"
    )
    .ok();
    writeln!(
        &mut output,
        "║                     ERROR                                  ║"
    )
    .ok();
    writeln!(
        &mut output,
        "╚════════════════════════════════════════════════════════════╝"
    )
    .ok();
    writeln!(&mut output).ok();

    // Match against the whole context chain, not just the outermost message
    let error_msg = format!("{:#}", error);

    if error_msg.contains("peer") {
        format_peer_error(&mut output, &error_msg);
    } else if error_msg.contains("bind") || error_msg.contains("address") {
        format_network_error(&mut output, &error_msg);
    } else if error_msg.contains("config") {
        format_config_error(&mut output, &error_msg);
    } else if error_msg.contains("spool") || error_msg.contains("Permission denied") {
        format_spool_error(&mut output, &error_msg);
    } else {
        format_generic_error(&mut output, &error_msg);
    }

    // Technical details
    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(&mut output, "Technical Details:").ok();
    writeln!(&mut output).ok();
    writeln!(&mut output, "{:#}", error).ok();
    writeln!(&mut output).ok();

    // Footer with help
    writeln!(
        &mut output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(&mut output, "Need Help?").ok();
    writeln!(
        &mut output,
        "  - Run with --verbose for detailed logs: lamco-clipshare -vv serve"
    )
    .ok();
    writeln!(
        &mut output,
        "  - Report issues: https://github.com/lamco-admin/lamco-clipshare/issues"
    )
    .ok();
    writeln!(
        &mut output,
        "╚════════════════════════════════════════════════════════════╝"
    )
    .ok();

    output
}

fn format_peer_error(output: &mut String, _error: &str) {
    writeln!(output, "Peer Error").ok();
    writeln!(output).ok();
    writeln!(output, "Could not find or reach the requested peer.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Peer is not configured").ok();
    writeln!(output, "     → List known peers: lamco-clipshare peers").ok();
    writeln!(
        output,
        "     → Add a [[peers]] entry with name and address to the config"
    )
    .ok();
    writeln!(output).ok();
    writeln!(output, "  2. Peer is not advertising on this network").ok();
    writeln!(output, "     → Check the peer runs: lamco-clipshare serve").ok();
    writeln!(output, "     → mDNS traffic (UDP 5353) must not be blocked").ok();
    writeln!(output).ok();
    writeln!(output, "  3. Peer address is malformed").ok();
    writeln!(output, "     → Should be: 'IP:PORT' like '192.168.1.20:52700'").ok();
}

fn format_network_error(output: &mut String, _error: &str) {
    writeln!(output, "Network Binding Error").ok();
    writeln!(output).ok();
    writeln!(
        output,
        "Could not bind to network address for incoming transfers."
    )
    .ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Port 52700 already in use").ok();
    writeln!(output, "     → Check: ss -tlnp | grep 52700").ok();
    writeln!(output, "     → Stop the other node or use a different port").ok();
    writeln!(
        output,
        "     → Override: lamco-clipshare --listen 0.0.0.0:52701 serve"
    )
    .ok();
    writeln!(output).ok();
    writeln!(output, "  2. Invalid listen address").ok();
    writeln!(output, "     → Check config: [node] listen_addr").ok();
    writeln!(output, "     → Should be: 'IP:PORT' like '0.0.0.0:52700'").ok();
}

fn format_config_error(output: &mut String, _error: &str) {
    writeln!(output, "Configuration Error").ok();
    writeln!(output).ok();
    writeln!(output, "Problem with configuration file.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Invalid TOML syntax").ok();
    writeln!(output, "     → Check for typos, missing quotes, etc.").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Invalid values").ok();
    writeln!(output, "     → Peer names must be unique").ok();
    writeln!(
        output,
        "     → max_representation_size cannot exceed max_payload_size"
    )
    .ok();
}

fn format_spool_error(output: &mut String, _error: &str) {
    writeln!(output, "Spool Directory Error").ok();
    writeln!(output).ok();
    writeln!(output, "Could not write received payloads to disk.").ok();
    writeln!(output).ok();
    writeln!(output, "  → Check [clipboard] spool_dir exists and is writable").ok();
}

fn format_generic_error(output: &mut String, error: &str) {
    writeln!(output, "Node Error").ok();
    writeln!(output).ok();
    writeln!(output, "An error occurred while running the node.").ok();
    writeln!(output).ok();
    writeln!(output, "Error: {}", error).ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_user_error() {
        let error = anyhow::anyhow!("Unknown peer: phone");
        let formatted = format_user_error(&error);
        assert!(formatted.contains("ERROR"));
        assert!(formatted.contains("lamco-clipshare peers"));
    }

    #[test]
    fn test_bind_error_formatting() {
        let error = anyhow::anyhow!("Address in use").context("Failed to bind 0.0.0.0:52700");
        let formatted = format_user_error(&error);
        assert!(formatted.contains("Network Binding Error"));
        assert!(formatted.contains("52700"));
    }
}
