//! # Rustible Transport - Connection Configuration Resolution
//!
//! Before Rustible opens a connection it needs one complete, consistent set
//! of connection parameters for the target: address, credentials, privilege
//! escalation settings, timeouts, the remote interpreter and the paths of
//! container tooling. This crate computes that set.
//!
//! ## Core Concepts
//!
//! - **Sources**: a [`ConnectionSource`](source::ConnectionSource) answers
//!   every question about one target
//! - **Direct targets**: the real host or a `delegate_to` host, resolved from
//!   the live connection plugin and its play context
//! - **Proxy hops**: intermediaries named in `mitogen_via`, resolved only
//!   from their host variables and process-wide defaults
//! - **Interpreter discovery**: `auto` interpreter settings are discovered
//!   once per task snapshot and cached
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────┐      ┌──────────────────────────┐
//! │   DirectContextSource    │      │     ProxyHostSource      │
//! │ (plugin options + play   │      │ (host variable synonym   │
//! │  context fallback)       │      │  chains + defaults)      │
//! └──────────────────────────┘      └──────────────────────────┘
//!              │                                 │
//!              └────────────────┬────────────────┘
//!                               ▼
//!                 ┌──────────────────────────┐
//!                 │    ConnectionSource      │──▶ ConnectionSpec
//!                 └──────────────────────────┘
//!                               │ python_path()
//!                               ▼
//!                 ┌──────────────────────────┐
//!                 │   InterpreterResolver    │──▶ DiscoveryCache
//!                 └──────────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rustible_transport::prelude::*;
//!
//! let defaults = Defaults::load(None)?;
//! let config = ConfigManager::new(defaults.clone());
//! let resolver = InterpreterResolver::new(Arc::new(NoDiscovery));
//! let templar = JinjaTemplar::new();
//! let ctx = ResolutionContext {
//!     defaults: &defaults,
//!     config: &config,
//!     resolver: &resolver,
//!     templar: &templar,
//! };
//!
//! let via = ViaSpec::parse("root@bastion")?;
//! let source = ProxyHostSource::from_via(ctx, &via, &task_vars, &action)?;
//! let spec = ConnectionSpec::resolve(&source, false)?;
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    // Error handling
    pub use crate::error::{Error, Result};

    // Configuration
    pub use crate::config::{ConfigManager, ConfigResolver, Defaults};

    // Sources
    pub use crate::source::{
        ConnectionSource, ConnectionSpec, DirectContextSource, ProxyHostSource,
        ResolutionContext, ViaSpec,
    };

    // Collaborators
    pub use crate::interpreter::{
        Action, ActionState, DiscoveryCache, InterpreterDiscovery, InterpreterResolver,
        NoDiscovery,
    };
    pub use crate::plugin::{BecomePlugin, ConnectionPlugin, Lookup, PlayContext};
    pub use crate::template::{JinjaTemplar, Templar};

    // Variables
    pub use crate::secret::Secret;
    pub use crate::vars::{LazyHostVars, TaskVars, VarSource};
}

// ============================================================================
// Core Modules
// ============================================================================

/// Error types and result aliases.
pub mod error;

/// Task and host variable snapshots, plus the framework's truthiness and
/// coercion rules.
pub mod vars;

/// Redacting wrapper for passwords.
pub mod secret;

/// Shell-syntax argument splitting.
pub mod argv;

// ============================================================================
// Resolution
// ============================================================================

/// Process-wide defaults and the configuration lookup service.
pub mod config;

/// Connection and become plugin contracts, and the legacy play context.
pub mod plugin;

/// Template expansion of the interpreter setting.
pub mod template;

/// Interpreter resolution and discovery caching.
///
/// Resolves the `ansible_python_interpreter` setting into an argument vector,
/// running discovery once per task snapshot for `auto` modes.
pub mod interpreter;

/// Connection configuration sources for direct targets and proxy hops.
pub mod source;

// ============================================================================
// Infrastructure
// ============================================================================

/// Subscriber setup for binaries.
pub mod logging;

pub use error::{Error, Result};

/// Returns the current version of the crate.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
