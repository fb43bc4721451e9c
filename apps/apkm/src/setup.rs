//! Component wiring and startup checks

use std::sync::Arc;

use apkm_config::Config;
use apkm_errors::Error;
use apkm_events::{EventEmitter, EventSender};
use apkm_install::{
    InstallConfig, InstallController, InstallGateway, InstallPipeline, LocalInstallerService,
    LocalServiceOptions, UserActionHandler,
};
use apkm_payload::ApkmExtractor;
use apkm_types::UserAction;
use console::Term;

use crate::error::CliError;

/// Long-lived components shared by all commands
pub struct AppContext {
    pub config: Config,
    pub extractor: ApkmExtractor,
    pub service: Arc<LocalInstallerService>,
    event_sender: EventSender,
}

impl EventEmitter for AppContext {
    fn event_sender(&self) -> Option<&EventSender> {
        Some(&self.event_sender)
    }
}

impl AppContext {
    /// Create the working directories and the components using them
    pub async fn initialize(config: Config, event_sender: EventSender) -> Result<Self, CliError> {
        let cache_dir = config.cache_dir();
        let service_root = config.service_root();
        for dir in [&cache_dir, &service_root] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| Error::io_with_path(&e, dir))?;
        }

        let extractor = ApkmExtractor::new(cache_dir, config.payload.max_extract_bytes)
            .with_event_sender(event_sender.clone());
        let service = Arc::new(LocalInstallerService::new(
            service_root,
            LocalServiceOptions::from(&config.service),
        ));

        let context = Self {
            config,
            extractor,
            service,
            event_sender,
        };
        context.emit_debug(format!(
            "installer root {}",
            context.service.root().display()
        ));
        Ok(context)
    }

    /// Build the install stack for one command
    pub fn controller(&self, install: InstallConfig, confirm: ConfirmMode) -> InstallController {
        let confirmations = Arc::new(TerminalConfirmation {
            service: self.service.clone(),
            mode: confirm,
        });
        let gateway = Arc::new(InstallGateway::new(
            self.service.clone(),
            confirmations,
            Some(self.event_sender.clone()),
        ));
        let pipeline = Arc::new(
            InstallPipeline::new(gateway, install).with_event_sender(self.event_sender.clone()),
        );
        InstallController::new(pipeline)
    }
}

/// How confirmation requests are answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmMode {
    /// Accept without asking
    Automatic,
    /// Ask on the terminal
    Prompt,
    /// No terminal to ask on
    Unavailable,
}

struct TerminalConfirmation {
    service: Arc<LocalInstallerService>,
    mode: ConfirmMode,
}

impl UserActionHandler for TerminalConfirmation {
    fn request_confirmation(&self, action: UserAction) -> Result<(), Error> {
        match self.mode {
            ConfirmMode::Automatic => self.service.confirm(action.session_id, true),
            ConfirmMode::Unavailable => Err(Error::internal(
                "no interactive terminal; pass --yes to confirm automatically",
            )),
            ConfirmMode::Prompt => {
                let service = self.service.clone();
                std::thread::Builder::new()
                    .name("apkm-confirm".to_string())
                    .spawn(move || {
                        let accepted = prompt_yes_no(&action.prompt).unwrap_or(false);
                        // The session may have been cancelled while the prompt was open
                        let _ = service.confirm(action.session_id, accepted);
                    })
                    .map_err(|e| Error::internal(format!("failed to open prompt: {e}")))?;
                Ok(())
            }
        }
    }
}

/// Ask a yes/no question on stderr; anything but yes is no
pub fn prompt_yes_no(question: &str) -> std::io::Result<bool> {
    let term = Term::stderr();
    term.write_str(&format!("{question} [y/N] "))?;
    let answer = term.read_line()?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes" | "Yes"))
}
