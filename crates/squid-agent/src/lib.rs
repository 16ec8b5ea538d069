//! sQuid Agent - identity switching and service wiring
//!
//! [`SquidAgent`] wires the identity store, capability resolver, audit
//! subsystem and ephemeral store from one [`SquidConfig`], and adds:
//!
//! - [`SwitchCoordinator`]: the supersede-aware identity switch state machine
//! - [`FeedbackQueue`]: bounded, expiring notices for the host UI
//! - [`SquidAgent::authorize`]: resolve plus one audit entry per decision
//! - [`logging::init`]: tracing setup for hosts

pub mod agent;
pub mod config;
pub mod error;
pub mod feedback;
pub mod logging;
pub mod switch;

pub use agent::{SquidAgent, SquidAgentBuilder, MODULE_ACCESS_ACTION};
pub use config::{LoggingConfig, SquidConfig};
pub use error::{AgentError, ConfigError};
pub use feedback::{
    FeedbackConfig, FeedbackEvent, FeedbackId, FeedbackKind, FeedbackQueue, LoadingState,
};
pub use switch::{SwitchCoordinator, SwitchOutcome, SwitchPhase, SwitchReport, SWITCH_ACTION};
