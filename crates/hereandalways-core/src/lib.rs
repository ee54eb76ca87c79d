//! HereAndAlways Core - secret lifecycle, reveal sessions, and configuration
//!
//! Frontends construct the storage clients and hand them to a
//! [`SecretOrchestrator`]; everything between the form and the wire lives here.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod reveal;
pub mod scope;

pub use config::{AppConfig, ConfigError, ConfigFile};
pub use error::SecretError;
pub use orchestrator::{LifecycleState, NewSecret, SecretEdit, SecretOrchestrator};
pub use reveal::{RevealSession, MASK};
pub use scope::ViewScope;
