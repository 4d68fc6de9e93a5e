//! OS keystroke injection (spec.md §4.4.1): a best-effort escape hatch for
//! PTY-mode tools that ignore stdin writes and instead read real keyboard
//! events. Synthesizes keystrokes into whichever window the platform
//! reports as currently focused, using the automation utility spec.md
//! names for each platform — `osascript`'s `System Events` suite on macOS,
//! `xdotool` on Linux. Neither is a dependency of this crate; both are
//! invoked as external processes, the same way a bridged tool's own child
//! is spawned.
//!
//! This is not a reliable substitute for the PTY-write path: it depends on
//! window focus and an installed platform utility, and failures here are
//! logged and swallowed rather than propagated.

use tokio::process::Command;
use tracing::warn;

/// Type `text` into the focused window, then synthesize `Return` if
/// `execute` is set. Only called when a tool's adapter and definition both
/// opt in (`os_injection_allowed && os_injection`); never the default path.
pub async fn inject_keystrokes(text: &str, execute: bool) {
    #[cfg(target_os = "macos")]
    {
        inject_macos(text, execute).await;
    }
    #[cfg(target_os = "linux")]
    {
        inject_linux(text, execute).await;
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        let _ = (text, execute);
        warn!("OS keystroke injection has no implementation on this platform");
    }
}

#[cfg(target_os = "macos")]
async fn inject_macos(text: &str, execute: bool) {
    // `System Events` types into whatever application currently has focus;
    // AppleScript string literals need their own backslash/quote escaping.
    let escaped = text.replace('\\', "\\\\").replace('"', "\\\"");
    let mut script = format!(r#"tell application "System Events" to keystroke "{escaped}""#);
    if execute {
        script.push_str("\ntell application \"System Events\" to key code 36");
    }
    match Command::new("osascript").arg("-e").arg(&script).status().await {
        Ok(status) if status.success() => {}
        Ok(status) => warn!(?status, "osascript keystroke injection exited non-zero"),
        Err(e) => warn!(error = %e, "failed to spawn osascript for keystroke injection"),
    }
}

#[cfg(target_os = "linux")]
async fn inject_linux(text: &str, execute: bool) {
    match Command::new("xdotool")
        .arg("type")
        .arg("--")
        .arg(text)
        .status()
        .await
    {
        Ok(status) if status.success() => {}
        Ok(status) => warn!(?status, "xdotool type exited non-zero"),
        Err(e) => {
            warn!(error = %e, "failed to spawn xdotool for keystroke injection");
            return;
        }
    }
    if execute {
        match Command::new("xdotool").arg("key").arg("Return").status().await {
            Ok(status) if status.success() => {}
            Ok(status) => warn!(?status, "xdotool key Return exited non-zero"),
            Err(e) => warn!(error = %e, "failed to spawn xdotool for Return keystroke"),
        }
    }
}
