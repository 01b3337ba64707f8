//! Remote interpreter resolution.
//!
//! The interpreter setting is either a command (`/usr/bin/python3 -E`) or a
//! discovery mode token (`auto`, `auto_silent`, ...). Mode tokens trigger a
//! one-time discovery side-call per task snapshot; the result is cached in a
//! [`DiscoveryCache`] until a caller explicitly asks to rediscover or the
//! snapshot is dropped.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rustible_transport::interpreter::{ActionState, InterpreterResolver};
//!
//! let resolver = InterpreterResolver::new(Arc::new(my_discovery));
//! let action = ActionState::new();
//! let argv = resolver.resolve(Some("auto"), &task_vars, &action, false)?;
//! ```

mod cache;

pub use cache::{CacheKey, DiscoveryCache};

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::debug;

use crate::argv;
use crate::error::{BoxError, Error, Result};
use crate::vars::{TaskVars, UnsafeText};

/// The only interpreter family that can be discovered.
pub const INTERPRETER_FAMILY: &str = "python";

/// Interpreter used when nothing else produced a path.
pub const FALLBACK_INTERPRETER: &str = "/usr/bin/python";

/// Interpreter discovery mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DiscoveryMode {
    /// Discover, warning on fallback
    #[default]
    Auto,
    /// Discover, preferring the legacy path
    AutoLegacy,
    /// Discover without warnings
    AutoSilent,
    /// Legacy preference without warnings
    AutoLegacySilent,
}

impl DiscoveryMode {
    /// Parse a mode token. Anything else is an explicit interpreter.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "auto" => Some(DiscoveryMode::Auto),
            "auto_legacy" => Some(DiscoveryMode::AutoLegacy),
            "auto_silent" => Some(DiscoveryMode::AutoSilent),
            "auto_legacy_silent" => Some(DiscoveryMode::AutoLegacySilent),
            _ => None,
        }
    }

    /// The token for this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryMode::Auto => "auto",
            DiscoveryMode::AutoLegacy => "auto_legacy",
            DiscoveryMode::AutoSilent => "auto_silent",
            DiscoveryMode::AutoLegacySilent => "auto_legacy_silent",
        }
    }
}

impl fmt::Display for DiscoveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of discovery within one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscoveryState {
    /// No discovery has run
    #[default]
    NotStarted,
    /// The discovery side-call is running
    InProgress,
    /// An interpreter was discovered or read from cache
    Completed,
}

// ============================================================================
// Collaborators
// ============================================================================

/// The in-flight execution unit that owns the connection being configured.
///
/// Methods take `&self`: the action is shared with the discovery side-call,
/// which may call back into resolution while probing.
pub trait Action: Send + Sync {
    /// Current discovery state, as seen by the calling thread.
    ///
    /// `InProgress` makes the resolver return [`interpreter_candidate`]
    /// without locking, so an action shared between threads must report it
    /// only to the thread running the side-call. Other threads then queue on
    /// the discovery lock and read the cached result.
    ///
    /// [`interpreter_candidate`]: Action::interpreter_candidate
    fn discovery_state(&self) -> DiscoveryState;

    /// Update the discovery state.
    fn set_discovery_state(&self, state: DiscoveryState);

    /// Candidate interpreter being probed while discovery is in progress.
    fn interpreter_candidate(&self) -> Option<String>;

    /// Force the connection's pipelining capability on or off.
    fn set_pipelining(&self, enabled: bool);

    /// Note that a cached interpreter was thrown away and rediscovered.
    fn mark_rediscovered(&self);

    /// Publish the interpreter so it can be returned as a fact.
    fn record_discovered_interpreter(&self, fact_name: &str, interpreter: &UnsafeText);
}

/// Discovers the interpreter on a target.
pub trait InterpreterDiscovery: Send + Sync {
    /// Run discovery. `Ok(None)` or an empty string means nothing was found;
    /// an `Err` is fatal.
    fn discover(
        &self,
        action: &dyn Action,
        interpreter_name: &str,
        mode: DiscoveryMode,
        task_vars: &TaskVars,
    ) -> std::result::Result<Option<String>, BoxError>;
}

/// Discovery that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDiscovery;

impl InterpreterDiscovery for NoDiscovery {
    fn discover(
        &self,
        _action: &dyn Action,
        _interpreter_name: &str,
        _mode: DiscoveryMode,
        _task_vars: &TaskVars,
    ) -> std::result::Result<Option<String>, BoxError> {
        Ok(None)
    }
}

#[derive(Debug, Default)]
struct ActionInner {
    state: DiscoveryState,
    /// Thread that moved the state to `InProgress`
    discovering: Option<ThreadId>,
    candidate: Option<String>,
    pipelining: bool,
    rediscovered: bool,
    discovered: Option<(String, UnsafeText)>,
}

/// Thread-safe [`Action`] implementation.
///
/// Discovery in progress is only visible to the thread that started it; a
/// side-call must call back into resolution on that same thread.
#[derive(Debug, Default)]
pub struct ActionState {
    inner: Mutex<ActionInner>,
}

impl ActionState {
    /// Create a fresh action state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the candidate returned to re-entrant callers during discovery.
    pub fn set_interpreter_candidate(&self, candidate: Option<String>) {
        self.inner.lock().candidate = candidate;
    }

    /// Whether pipelining is currently forced on.
    pub fn pipelining(&self) -> bool {
        self.inner.lock().pipelining
    }

    /// Whether a rediscovery replaced a cached interpreter.
    pub fn rediscovered(&self) -> bool {
        self.inner.lock().rediscovered
    }

    /// The last published interpreter fact, as `(fact_name, interpreter)`.
    pub fn discovered_interpreter(&self) -> Option<(String, UnsafeText)> {
        self.inner.lock().discovered.clone()
    }
}

impl Action for ActionState {
    fn discovery_state(&self) -> DiscoveryState {
        let inner = self.inner.lock();
        match inner.state {
            DiscoveryState::InProgress if inner.discovering != Some(thread::current().id()) => {
                DiscoveryState::NotStarted
            }
            state => state,
        }
    }

    fn set_discovery_state(&self, state: DiscoveryState) {
        let mut inner = self.inner.lock();
        inner.state = state;
        inner.discovering = (state == DiscoveryState::InProgress).then(|| thread::current().id());
    }

    fn interpreter_candidate(&self) -> Option<String> {
        self.inner.lock().candidate.clone()
    }

    fn set_pipelining(&self, enabled: bool) {
        self.inner.lock().pipelining = enabled;
    }

    fn mark_rediscovered(&self) {
        self.inner.lock().rediscovered = true;
    }

    fn record_discovered_interpreter(&self, fact_name: &str, interpreter: &UnsafeText) {
        self.inner.lock().discovered = Some((fact_name.to_string(), interpreter.clone()));
    }
}

/// Marks discovery in progress with pipelining forced on, and restores the
/// action when dropped. Without [`finish`](Self::finish) the state returns
/// to `NotStarted`.
struct DiscoveryGuard<'a> {
    action: &'a dyn Action,
    completed: bool,
}

impl<'a> DiscoveryGuard<'a> {
    fn begin(action: &'a dyn Action) -> Self {
        action.set_discovery_state(DiscoveryState::InProgress);
        action.set_pipelining(true);
        Self {
            action,
            completed: false,
        }
    }

    fn finish(mut self) {
        self.completed = true;
    }
}

impl Drop for DiscoveryGuard<'_> {
    fn drop(&mut self) {
        self.action.set_pipelining(false);
        self.action.set_discovery_state(if self.completed {
            DiscoveryState::Completed
        } else {
            DiscoveryState::NotStarted
        });
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Resolves interpreter settings into argument vectors.
#[derive(Clone)]
pub struct InterpreterResolver {
    cache: Arc<DiscoveryCache>,
    discovery: Arc<dyn InterpreterDiscovery>,
}

impl InterpreterResolver {
    /// Create a resolver with its own cache.
    pub fn new(discovery: Arc<dyn InterpreterDiscovery>) -> Self {
        Self::with_cache(discovery, Arc::new(DiscoveryCache::new()))
    }

    /// Create a resolver sharing an existing cache.
    pub fn with_cache(discovery: Arc<dyn InterpreterDiscovery>, cache: Arc<DiscoveryCache>) -> Self {
        Self { cache, discovery }
    }

    /// The cache backing this resolver.
    pub fn cache(&self) -> &Arc<DiscoveryCache> {
        &self.cache
    }

    /// Resolve an interpreter setting into an argument vector.
    ///
    /// An absent or empty setting means `auto`. When discovery produces no
    /// path, [`FALLBACK_INTERPRETER`] is used.
    pub fn resolve(
        &self,
        setting: Option<&str>,
        task_vars: &TaskVars,
        action: &dyn Action,
        rediscover: bool,
    ) -> Result<Vec<String>> {
        let setting = match setting {
            Some(s) if !s.is_empty() => s,
            _ => DiscoveryMode::default().as_str(),
        };

        let interpreter = self
            .discover_if_necessary(setting, task_vars, action, rediscover)?
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| {
                debug!(
                    fallback = FALLBACK_INTERPRETER,
                    "No interpreter resolved, using fallback"
                );
                FALLBACK_INTERPRETER.to_string()
            });

        argv::split(&interpreter)
    }

    fn discover_if_necessary(
        &self,
        setting: &str,
        task_vars: &TaskVars,
        action: &dyn Action,
        rediscover: bool,
    ) -> Result<Option<String>> {
        // Re-entered from inside the discovery side-call.
        if action.discovery_state() == DiscoveryState::InProgress {
            return Ok(action.interpreter_candidate());
        }

        let Some(mode) = DiscoveryMode::from_token(setting) else {
            return Ok(Some(setting.to_string()));
        };

        task_vars.attach(&self.cache);
        let key = CacheKey::new(task_vars.id(), INTERPRETER_FAMILY);
        let lock = self.cache.lock_for(&key);
        let _serialized = lock.lock();

        if rediscover && self.cache.invalidate(&key) {
            debug!(snapshot = %key.snapshot(), "Discarded cached interpreter for rediscovery");
            action.mark_rediscovered();
        }

        let interpreter = match self.cache.get(&key) {
            Some(cached) => {
                debug!(snapshot = %key.snapshot(), interpreter = %cached, "Using cached interpreter");
                action.set_discovery_state(DiscoveryState::Completed);
                cached
            }
            None => {
                debug!(snapshot = %key.snapshot(), mode = %mode, "Discovering interpreter");
                let guard = DiscoveryGuard::begin(action);
                let found = self
                    .discovery
                    .discover(action, INTERPRETER_FAMILY, mode, task_vars)
                    .map_err(|source| Error::Discovery {
                        interpreter: INTERPRETER_FAMILY.to_string(),
                        mode: mode.to_string(),
                        source,
                    })?;
                let discovered = UnsafeText::new(found.unwrap_or_default());
                self.cache.insert(key.clone(), discovered.clone());
                guard.finish();
                discovered
            }
        };

        action.record_discovered_interpreter(&key.fact_name(), &interpreter);
        Ok(Some(interpreter.as_str().to_string()))
    }
}

impl fmt::Debug for InterpreterResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterpreterResolver")
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}
