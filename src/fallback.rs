//! On-device speech fallback.
//!
//! Used when the remote voice yields no usable audio. The contract is
//! fire-and-forget: the text and a language tag go in, nothing comes back,
//! and failures are logged rather than surfaced.

use log::{debug, warn};
use std::process::Command;

pub trait FallbackSpeech: Send + Sync {
    /// Speak `text` with the platform voice for `locale`.
    fn speak(&self, text: &str, locale: &str);
}

/// Local synthesis via the platform's speech command.
pub struct SystemSpeech;

impl FallbackSpeech for SystemSpeech {
    fn speak(&self, text: &str, locale: &str) {
        spawn_speech_command(text, locale);
    }
}

/// The bare language code for tools that reject full tags ("am-ET" -> "am").
fn language_code(locale: &str) -> &str {
    locale.split('-').next().unwrap_or(locale)
}

fn reap(child: std::process::Child) {
    // Detached wait so the child does not linger as a zombie.
    std::thread::spawn(move || {
        let mut child = child;
        let _ = child.wait();
    });
}

#[cfg(target_os = "macos")]
fn spawn_speech_command(text: &str, locale: &str) {
    match Command::new("say").arg(text).spawn() {
        Ok(child) => {
            debug!("Local speech started for locale '{}'", locale);
            reap(child);
        }
        Err(e) => warn!("Local speech synthesis unavailable: {}", e),
    }
}

#[cfg(target_os = "linux")]
fn spawn_speech_command(text: &str, locale: &str) {
    let lang = language_code(locale);
    let spawned = Command::new("espeak-ng")
        .args(["-v", lang, text])
        .spawn()
        .or_else(|_| Command::new("spd-say").args(["-l", lang, text]).spawn());

    match spawned {
        Ok(child) => {
            debug!("Local speech started for locale '{}'", locale);
            reap(child);
        }
        Err(e) => warn!("Local speech synthesis unavailable: {}", e),
    }
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
fn spawn_speech_command(_text: &str, locale: &str) {
    warn!(
        "Local speech fallback is not supported on this platform (locale '{}')",
        locale
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_code_strips_region() {
        assert_eq!(language_code("am-ET"), "am");
        assert_eq!(language_code("en-US"), "en");
        assert_eq!(language_code("am"), "am");
    }
}
