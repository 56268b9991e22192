//! Terminal environment detection
//!
//! Decides whether the installer may prompt the user and draw live progress
//! bars, or must stick to plain line-oriented output.

use std::io::IsTerminal;

/// True when a human can answer prompts on this terminal
///
/// Returns `false` if any of:
/// - stdin or stdout is not a TTY
/// - `CI` is set
/// - `RTPROVISION_NONINTERACTIVE` is set
pub fn is_interactive() -> bool {
    if std::env::var_os("CI").is_some() || std::env::var_os("RTPROVISION_NONINTERACTIVE").is_some() {
        return false;
    }

    std::io::stdin().is_terminal() && std::io::stdout().is_terminal()
}

/// True when progress bars can redraw in place
pub fn supports_live_progress() -> bool {
    std::io::stderr().is_terminal() && std::env::var("TERM").map(|t| t != "dumb").unwrap_or(true)
}
