//! Agent catalog.
//!
//! This module describes the agents the harness knows how to install and run:
//!
//! - **Descriptor**: immutable definition of one agent
//! - **Builtin**: the pi-mono and factory-droid descriptors and install scripts
//! - **Config**: `agents.yaml` additions and harness defaults
//! - **Registry**: lookup table keyed by agent id
//! - **Models**: family-specific model and flag resolution
//! - **Params**: per-attempt parameters and template variables
//! - **Staging**: host config files copied into the sandbox HOME
//!
//! Agent families are a closed enum; anything not built in is `custom` and
//! fully described by configuration.

mod builtin;
mod config;
mod descriptor;
mod models;
mod params;
mod registry;
pub mod staging;

// Re-export public API
pub use config::{AgentsConfig, DEFAULT_BUNDLE_DIR, HarnessDefaults};
pub use descriptor::{
    AgentDescriptor, AgentKind, Capabilities, ConfigStaging, CredentialSpec, OutputMode,
};
pub use models::{ResolvedFlags, resolve_flags};
pub use params::{ResolvedAgent, RunParameters, parse_override, resolve};
pub use registry::AgentRegistry;
