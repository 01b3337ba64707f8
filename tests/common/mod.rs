//! Shared test utilities and fixtures for the rustible-transport test suite.
//!
//! This module provides:
//! - A scripted connection plugin and become plugin
//! - Instrumented actions and discovery collaborators that count calls
//! - A harness owning the shared resolution services
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;

use rustible_transport::config::{ConfigManager, Defaults};
use rustible_transport::error::BoxError;
use rustible_transport::interpreter::{
    Action, DiscoveryMode, DiscoveryState, InterpreterDiscovery, InterpreterResolver, NoDiscovery,
};
use rustible_transport::plugin::{BecomePlugin, ConnectionPlugin, Lookup, PlayContext};
use rustible_transport::source::ResolutionContext;
use rustible_transport::template::JinjaTemplar;
use rustible_transport::vars::{TaskVars, UnsafeText};

// ============================================================================
// Helper Functions
// ============================================================================

/// Build a host variable map from a JSON object literal.
pub fn host_vars(value: Value) -> IndexMap<String, Value> {
    match value {
        Value::Object(map) => map.into_iter().collect(),
        _ => IndexMap::new(),
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Owns the services a [`ResolutionContext`] borrows.
pub struct Harness {
    pub defaults: Defaults,
    pub config: ConfigManager,
    pub resolver: InterpreterResolver,
    pub templar: JinjaTemplar,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_defaults(Defaults::default())
    }

    pub fn with_defaults(defaults: Defaults) -> Self {
        Self::with_discovery(defaults, Arc::new(NoDiscovery))
    }

    pub fn with_discovery(defaults: Defaults, discovery: Arc<dyn InterpreterDiscovery>) -> Self {
        Self {
            config: ConfigManager::new(defaults.clone()),
            defaults,
            resolver: InterpreterResolver::new(discovery),
            templar: JinjaTemplar::new(),
        }
    }

    pub fn ctx(&self) -> ResolutionContext<'_> {
        ResolutionContext {
            defaults: &self.defaults,
            config: &self.config,
            resolver: &self.resolver,
            templar: &self.templar,
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Scripted Plugins
// ============================================================================

/// Become plugin answering from a fixed option table.
pub struct ScriptedBecome {
    pub name: String,
    pub options: HashMap<String, Value>,
}

impl ScriptedBecome {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            options: HashMap::new(),
        }
    }

    pub fn option(mut self, name: &str, value: Value) -> Self {
        self.options.insert(name.to_string(), value);
        self
    }
}

impl BecomePlugin for ScriptedBecome {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_option(&self, name: &str, _: &TaskVars, _: &PlayContext) -> Lookup<Value> {
        self.options.get(name).cloned().into()
    }
}

/// Connection plugin answering from fixed tables, recording every option
/// it is asked for.
pub struct ScriptedPlugin {
    pub transport: String,
    pub options: HashMap<String, Value>,
    pub task_vars: HashMap<String, Value>,
    pub become_plugin: Option<ScriptedBecome>,
    pub delegate_to: Option<String>,
    pub extra_args: Vec<String>,
    pub queried: Mutex<Vec<String>>,
}

impl ScriptedPlugin {
    pub fn new(transport: &str) -> Self {
        Self {
            transport: transport.to_string(),
            options: HashMap::new(),
            task_vars: HashMap::new(),
            become_plugin: None,
            delegate_to: None,
            extra_args: Vec::new(),
            queried: Mutex::new(Vec::new()),
        }
    }

    pub fn option(mut self, name: &str, value: Value) -> Self {
        self.options.insert(name.to_string(), value);
        self
    }

    pub fn task_var(mut self, name: &str, value: Value) -> Self {
        self.task_vars.insert(name.to_string(), value);
        self
    }

    pub fn with_become(mut self, plugin: ScriptedBecome) -> Self {
        self.become_plugin = Some(plugin);
        self
    }

    pub fn delegated_to(mut self, host: &str) -> Self {
        self.delegate_to = Some(host.to_string());
        self
    }

    pub fn queried(&self) -> Vec<String> {
        self.queried.lock().clone()
    }
}

impl ConnectionPlugin for ScriptedPlugin {
    fn transport(&self) -> &str {
        &self.transport
    }

    fn get_option(&self, name: &str, _: &TaskVars) -> Lookup<Value> {
        self.queried.lock().push(name.to_string());
        self.options.get(name).cloned().into()
    }

    fn get_task_var(&self, name: &str) -> Option<Value> {
        self.task_vars.get(name).cloned()
    }

    fn get_extra_args(&self) -> Vec<String> {
        self.extra_args.clone()
    }

    fn become_plugin(&self) -> Option<&dyn BecomePlugin> {
        self.become_plugin.as_ref().map(|p| p as &dyn BecomePlugin)
    }

    fn delegate_to_hostname(&self) -> Option<&str> {
        self.delegate_to.as_deref()
    }
}

// ============================================================================
// Instrumented Action
// ============================================================================

/// [`Action`] recording every pipelining and state change.
#[derive(Default)]
pub struct RecordingAction {
    pub state: Mutex<DiscoveryState>,
    pub candidate: Mutex<Option<String>>,
    pub pipelining: Mutex<Vec<bool>>,
    pub states: Mutex<Vec<DiscoveryState>>,
    pub rediscoveries: AtomicUsize,
    pub facts: Mutex<Vec<(String, UnsafeText)>>,
}

impl RecordingAction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_candidate(candidate: &str) -> Self {
        let action = Self::default();
        *action.candidate.lock() = Some(candidate.to_string());
        action
    }

    pub fn pipelining_history(&self) -> Vec<bool> {
        self.pipelining.lock().clone()
    }

    pub fn state_history(&self) -> Vec<DiscoveryState> {
        self.states.lock().clone()
    }

    pub fn rediscoveries(&self) -> usize {
        self.rediscoveries.load(Ordering::SeqCst)
    }
}

impl Action for RecordingAction {
    fn discovery_state(&self) -> DiscoveryState {
        *self.state.lock()
    }

    fn set_discovery_state(&self, state: DiscoveryState) {
        *self.state.lock() = state;
        self.states.lock().push(state);
    }

    fn interpreter_candidate(&self) -> Option<String> {
        self.candidate.lock().clone()
    }

    fn set_pipelining(&self, enabled: bool) {
        self.pipelining.lock().push(enabled);
    }

    fn mark_rediscovered(&self) {
        self.rediscoveries.fetch_add(1, Ordering::SeqCst);
    }

    fn record_discovered_interpreter(&self, fact_name: &str, interpreter: &UnsafeText) {
        self.facts
            .lock()
            .push((fact_name.to_string(), interpreter.clone()));
    }
}

// ============================================================================
// Instrumented Discovery
// ============================================================================

/// What a [`CountingDiscovery`] does when called.
pub enum Script {
    /// Return this interpreter
    Answer(Option<String>),
    /// Return these interpreters in turn, repeating the last one
    Sequence(Vec<String>),
    /// Fail with this message
    Fail(String),
}

/// Discovery collaborator counting its invocations.
pub struct CountingDiscovery {
    calls: AtomicUsize,
    script: Script,
    delay: Option<Duration>,
    pub seen: Mutex<Vec<(String, DiscoveryMode, DiscoveryState)>>,
}

impl CountingDiscovery {
    pub fn answering(interpreter: &str) -> Arc<Self> {
        Arc::new(Self::new(Script::Answer(Some(interpreter.to_string())), None))
    }

    pub fn finding_nothing() -> Arc<Self> {
        Arc::new(Self::new(Script::Answer(None), None))
    }

    /// Answer each call with the next interpreter in `answers`.
    pub fn answering_in_turn(answers: &[&str]) -> Arc<Self> {
        let answers = answers.iter().map(|a| a.to_string()).collect();
        Arc::new(Self::new(Script::Sequence(answers), None))
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self::new(Script::Fail(message.to_string()), None))
    }

    /// Answer after sleeping, widening the window for racing callers.
    pub fn slow(interpreter: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self::new(
            Script::Answer(Some(interpreter.to_string())),
            Some(delay),
        ))
    }

    fn new(script: Script, delay: Option<Duration>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            script,
            delay,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl InterpreterDiscovery for CountingDiscovery {
    fn discover(
        &self,
        action: &dyn Action,
        interpreter_name: &str,
        mode: DiscoveryMode,
        _task_vars: &TaskVars,
    ) -> Result<Option<String>, BoxError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .push((interpreter_name.to_string(), mode, action.discovery_state()));

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        match &self.script {
            Script::Answer(answer) => Ok(answer.clone()),
            Script::Sequence(answers) => Ok(answers
                .get(call)
                .or_else(|| answers.last())
                .cloned()),
            Script::Fail(message) => Err(message.clone().into()),
        }
    }
}
