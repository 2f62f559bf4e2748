//! Spoken greetings, best-effort.
//!
//! The kiosk narrates a resolved identity through a speech-synthesis
//! subprocess. Missing audio capability degrades to a log line; the
//! session is never blocked on, or failed by, the narrator.

use std::process::Stdio;

/// Fire-and-forget speech seam.
pub trait Narrator: Send + Sync {
    fn speak(&self, text: &str);
}

/// Narrator backed by a speech-synthesis command (`spd-say` by default).
pub struct SpeechNarrator {
    command: String,
}

impl SpeechNarrator {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
        }
    }
}

impl Narrator for SpeechNarrator {
    fn speak(&self, text: &str) {
        let spawned = tokio::process::Command::new(&self.command)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match spawned {
            Ok(mut child) => {
                // Reap in the background; a failed utterance is only a log line.
                tokio::spawn(async move {
                    match child.wait().await {
                        Ok(status) if !status.success() => {
                            tracing::warn!(%status, "speech command exited non-zero");
                        }
                        Err(e) => tracing::warn!(error = %e, "speech command failed"),
                        _ => {}
                    }
                });
            }
            Err(e) => {
                tracing::warn!(
                    command = %self.command,
                    error = %e,
                    "speech unavailable; continuing silently"
                );
            }
        }
    }
}

/// No-op narrator for headless deployments and tests.
pub struct SilentNarrator;

impl Narrator for SilentNarrator {
    fn speak(&self, text: &str) {
        tracing::debug!(text, "narration suppressed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_speech_binary_degrades_silently() {
        let narrator = SpeechNarrator::new("/nonexistent/speech-binary");
        // Must not panic or propagate anything.
        narrator.speak("Welcome");
    }

    #[tokio::test]
    async fn silent_narrator_is_a_no_op() {
        SilentNarrator.speak("Welcome");
    }
}
