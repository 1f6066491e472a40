//! User-facing console output: sinks, progress lines and the wait spinner.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Destination for console output.
#[derive(Clone, Default)]
pub enum OutputSink {
    Stdout,
    #[default]
    Stderr,
    /// Shared in-memory buffer, mainly for tests and embedding.
    Buffer(Arc<Mutex<Vec<u8>>>),
    Discard,
}

impl std::fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => f.write_str("Stdout"),
            Self::Stderr => f.write_str("Stderr"),
            Self::Buffer(_) => f.write_str("Buffer"),
            Self::Discard => f.write_str("Discard"),
        }
    }
}

impl OutputSink {
    pub fn buffer() -> Self {
        Self::Buffer(Arc::new(Mutex::new(Vec::new())))
    }

    /// Everything written so far, for buffer sinks.
    pub fn contents(&self) -> String {
        match self {
            Self::Buffer(buf) => match buf.lock() {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(poisoned) => String::from_utf8_lossy(&poisoned.into_inner()).into_owned(),
            },
            _ => String::new(),
        }
    }

    /// Write text as-is. Console writes are best effort.
    pub fn write_str(&self, text: &str) {
        let result = match self {
            Self::Stdout => {
                let mut out = std::io::stdout().lock();
                out.write_all(text.as_bytes()).and_then(|_| out.flush())
            }
            Self::Stderr => {
                let mut err = std::io::stderr().lock();
                err.write_all(text.as_bytes()).and_then(|_| err.flush())
            }
            Self::Buffer(buf) => {
                match buf.lock() {
                    Ok(mut bytes) => bytes.extend_from_slice(text.as_bytes()),
                    Err(poisoned) => poisoned.into_inner().extend_from_slice(text.as_bytes()),
                }
                Ok(())
            }
            Self::Discard => Ok(()),
        };
        if let Err(e) = result {
            tracing::debug!(error = %e, "console write failed");
        }
    }

    pub fn write_line(&self, line: &str) {
        self.write_str(&format!("{}\n", line));
    }

    /// `✱ <message>` in yellow: a step is starting.
    pub fn progress(&self, message: &str) {
        self.write_line(&format!("✱ {}", message).yellow().to_string());
    }

    /// `✱ <message>` in green: a step finished.
    pub fn success(&self, message: &str) {
        self.write_line(&format!("✱ {}", message).green().to_string());
    }

    fn draw_target(&self) -> ProgressDrawTarget {
        match self {
            Self::Stdout => ProgressDrawTarget::stdout(),
            Self::Stderr => ProgressDrawTarget::stderr(),
            Self::Buffer(_) | Self::Discard => ProgressDrawTarget::hidden(),
        }
    }
}

/// Which sink stdout-kind job responses are echoed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogRouting {
    /// Both streams go to the stderr sink.
    #[default]
    Combined,
    /// Stdout-kind responses go to the stdout sink.
    Split,
}

/// Spinner shown while waiting for the first response.
#[derive(Debug)]
pub struct Spinner {
    bar: ProgressBar,
}

impl Spinner {
    pub fn start(sink: &OutputSink, message: &str) -> Self {
        let bar = ProgressBar::with_draw_target(None, sink.draw_target());
        bar.set_style(ProgressStyle::default_spinner());
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    pub fn stop(self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_sink_collects_lines() {
        colored::control::set_override(false);
        let sink = OutputSink::buffer();
        sink.write_line("first");
        sink.progress("Uploading");
        assert_eq!(sink.contents(), "first\n✱ Uploading\n");
    }

    #[test]
    fn clones_share_the_buffer() {
        let sink = OutputSink::buffer();
        let clone = sink.clone();
        clone.write_str("x");
        assert_eq!(sink.contents(), "x");
    }

    #[test]
    fn spinner_on_hidden_target() {
        let spinner = Spinner::start(&OutputSink::Discard, "waiting");
        spinner.stop();
    }
}
