//! Event handling and status display

use apkm_events::{AppEvent, GeneralEvent, InstallEvent, PayloadEvent, SessionEvent};
use apkm_types::Phase;
use console::{style, Term};

use crate::logging::log_event_with_tracing;

/// Turns library events into log records and, outside JSON mode, into
/// status lines on stderr
pub struct EventHandler {
    term: Term,
    colors: bool,
    quiet: bool,
    debug: bool,
}

impl EventHandler {
    /// Create new event handler
    pub fn new(colors: bool, quiet: bool, debug: bool) -> Self {
        Self {
            term: Term::stderr(),
            colors,
            quiet,
            debug,
        }
    }

    /// Handle incoming event
    pub fn handle_event(&mut self, event: AppEvent) {
        log_event_with_tracing(&event);
        if self.quiet {
            return;
        }

        match &event {
            AppEvent::Install(InstallEvent::PhaseChanged { phase, .. }) => {
                if let Some(line) = phase_line(phase) {
                    self.show_status(line);
                }
            }
            AppEvent::Install(InstallEvent::TimedOut { timeout, .. }) => {
                self.show_warning(&format!(
                    "No verdict after {}s, cancelling the install session",
                    timeout.as_secs()
                ));
            }
            AppEvent::Session(SessionEvent::UserActionRequested { prompt, .. }) => {
                self.show_status(&format!("Confirmation required: {prompt}"));
            }
            AppEvent::Session(SessionEvent::Progress { progress, .. }) if self.debug => {
                self.show_status(&format!("Progress {:.0}%", progress * 100.0));
            }
            AppEvent::Payload(PayloadEvent::ExtractionCompleted {
                payloads,
                total_bytes,
                ..
            }) => {
                self.show_status(&format!(
                    "Extracted {payloads} payload file(s), {}",
                    crate::display::format_size(*total_bytes)
                ));
            }
            AppEvent::Payload(PayloadEvent::CacheCleared { path }) => {
                self.show_status(&format!("Cleared {}", path.display()));
            }
            AppEvent::General(GeneralEvent::Warning { message, context }) => {
                match context {
                    Some(context) => self.show_warning(&format!("{message}: {context}")),
                    None => self.show_warning(message),
                }
            }
            AppEvent::General(GeneralEvent::Error { message, details }) => match details {
                Some(details) => self.show_error(&format!("{message}: {details}")),
                None => self.show_error(message),
            },
            _ => {}
        }
    }

    fn show_status(&self, message: &str) {
        let line = if self.colors {
            format!("{} {message}", style("::").cyan().bold())
        } else {
            format!(":: {message}")
        };
        let _ = self.term.write_line(&line);
    }

    fn show_warning(&self, message: &str) {
        let line = if self.colors {
            format!("{} {message}", style("warning:").yellow().bold())
        } else {
            format!("warning: {message}")
        };
        let _ = self.term.write_line(&line);
    }

    fn show_error(&self, message: &str) {
        let line = if self.colors {
            format!("{} {message}", style("error:").red().bold())
        } else {
            format!("error: {message}")
        };
        let _ = self.term.write_line(&line);
    }
}

fn phase_line(phase: &Phase) -> Option<&'static str> {
    match phase {
        Phase::Verifying => Some("Verifying payload files"),
        Phase::Installing => Some("Submitting install session"),
        Phase::PendingUserAction => Some("Waiting for confirmation"),
        Phase::Finalizing => Some("Waiting for the installer's verdict"),
        _ => None,
    }
}
