#![warn(clippy::pedantic)]
#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]

//! Install orchestration for split-package bundles
//!
//! A bundle's payload files are submitted to an installer service as one
//! session whose verdict arrives asynchronously, possibly late, possibly
//! twice. This crate turns that into one ordered phase stream per install:
//!
//! - [`InstallGateway`] owns the single active-session slot, streams the
//!   payloads into a service session and commits it
//! - [`CompletionRelay`] routes the service's completion notifications to
//!   the active session and drops everything else
//! - [`InstallPipeline`] verifies payloads, drives the gateway and bounds
//!   the wait with a timeout
//! - [`InstallController`] is the state a front end observes

mod config;
mod controller;
mod gateway;
mod pipeline;
mod relay;
pub mod service;
mod session;
mod stream;

pub use config::InstallConfig;
pub use controller::InstallController;
pub use gateway::{InstallGateway, SessionHandle};
pub use pipeline::InstallPipeline;
pub use relay::{CompletionRelay, Delivery, NoUserAction, UserActionHandler};
pub use service::{
    CompletionSink, InstallerService, LocalInstallerService, LocalServiceOptions, SessionObserver,
    SessionParams,
};
pub use session::SessionTicket;
pub use stream::PhaseStream;

pub use apkm_events::EventSender;
