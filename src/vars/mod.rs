//! Variable snapshots consulted during resolution.
//!
//! This module provides:
//! - [`VarSource`], the read-only lookup every fallback chain goes through
//! - [`TaskVars`], the per-task snapshot with its own identity
//! - [`LazyHostVars`], a host view re-evaluated on every access
//! - Truthiness and coercion helpers matching the automation framework's
//!   variable semantics

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Variable that holds the per-host variable views inside task variables.
pub const HOSTVARS: &str = "hostvars";

/// Variable that holds variables for delegated hosts, keyed by host name.
pub const DELEGATED_VARS: &str = "ansible_delegated_vars";

// ============================================================================
// Variable Sources
// ============================================================================

/// A read-only, mapping-like view over variables.
///
/// Implementations may compute values lazily; callers must not assume two
/// lookups of the same name are cheap or return the same value.
pub trait VarSource {
    /// Look up a variable by name.
    fn get_var(&self, name: &str) -> Option<Value>;
}

impl<T: VarSource + ?Sized> VarSource for &T {
    fn get_var(&self, name: &str) -> Option<Value> {
        (**self).get_var(name)
    }
}

impl VarSource for IndexMap<String, Value> {
    fn get_var(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl VarSource for HashMap<String, Value> {
    fn get_var(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl VarSource for Map<String, Value> {
    fn get_var(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

/// Host variable view backed by a resolver closure.
///
/// Nothing is cached: every lookup calls the resolver again, so the
/// underlying variable service stays authoritative.
pub struct LazyHostVars<F> {
    inventory_name: String,
    resolve: F,
}

impl<F> LazyHostVars<F>
where
    F: Fn(&str) -> Option<Value>,
{
    /// Create a view for `inventory_name` backed by `resolve`.
    pub fn new(inventory_name: impl Into<String>, resolve: F) -> Self {
        Self {
            inventory_name: inventory_name.into(),
            resolve,
        }
    }

    /// The inventory host this view is scoped to.
    pub fn inventory_name(&self) -> &str {
        &self.inventory_name
    }
}

impl<F> VarSource for LazyHostVars<F>
where
    F: Fn(&str) -> Option<Value>,
{
    fn get_var(&self, name: &str) -> Option<Value> {
        (self.resolve)(name)
    }
}

impl<F> fmt::Debug for LazyHostVars<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyHostVars")
            .field("inventory_name", &self.inventory_name)
            .finish()
    }
}

// ============================================================================
// Task Variables
// ============================================================================

/// Identity of one task variable snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotId(Uuid);

impl SnapshotId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State kept elsewhere on behalf of a task snapshot.
///
/// A snapshot releases every store attached to it when it is dropped.
pub trait SnapshotScoped: Send + Sync {
    /// Forget everything stored for `snapshot`.
    fn release(&self, snapshot: SnapshotId);
}

/// Variables of one task execution.
///
/// Each snapshot carries a unique [`SnapshotId`]. Stores keyed on it, such
/// as the interpreter discovery cache, attach themselves with
/// [`attach`](Self::attach) and are released when the snapshot is dropped.
pub struct TaskVars {
    id: SnapshotId,
    vars: IndexMap<String, Value>,
    attached: Mutex<Vec<Weak<dyn SnapshotScoped>>>,
}

impl TaskVars {
    /// Create a snapshot from a variable map.
    pub fn new(vars: IndexMap<String, Value>) -> Self {
        Self {
            id: SnapshotId::new(),
            vars,
            attached: Mutex::new(Vec::new()),
        }
    }

    /// Create a snapshot from a JSON object; anything else yields no variables.
    pub fn from_json(value: Value) -> Self {
        let vars = match value {
            Value::Object(map) => map.into_iter().collect(),
            _ => IndexMap::new(),
        };
        Self::new(vars)
    }

    /// Identity of this snapshot.
    pub fn id(&self) -> SnapshotId {
        self.id
    }

    /// Borrow a variable.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Set a variable.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    /// All variables, in insertion order.
    pub fn as_map(&self) -> &IndexMap<String, Value> {
        &self.vars
    }

    /// Variables of another inventory host, as seen from this task.
    pub fn hostvars(&self, inventory_name: &str) -> Option<&Map<String, Value>> {
        self.vars
            .get(HOSTVARS)
            .and_then(|hv| hv.get(inventory_name))
            .and_then(Value::as_object)
    }

    /// Variables of a delegated host.
    pub fn delegated_vars(&self, host: &str) -> Option<&Map<String, Value>> {
        self.vars
            .get(DELEGATED_VARS)
            .and_then(|dv| dv.get(host))
            .and_then(Value::as_object)
    }

    /// Release `store`'s entries for this snapshot when it is dropped.
    ///
    /// Attaching the same store twice has no further effect. Only a weak
    /// reference is kept.
    pub fn attach<S: SnapshotScoped + 'static>(&self, store: &Arc<S>) {
        let store: Weak<dyn SnapshotScoped> = Arc::<S>::downgrade(store);
        let mut attached = self.attached.lock();
        if !attached
            .iter()
            .any(|existing| existing.as_ptr().cast::<()>() == store.as_ptr().cast::<()>())
        {
            attached.push(store);
        }
    }
}

impl Drop for TaskVars {
    fn drop(&mut self) {
        for store in self.attached.get_mut().drain(..) {
            if let Some(store) = store.upgrade() {
                store.release(self.id);
            }
        }
    }
}

impl fmt::Debug for TaskVars {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskVars")
            .field("id", &self.id)
            .field("vars", &self.vars)
            .finish_non_exhaustive()
    }
}

impl Default for TaskVars {
    fn default() -> Self {
        Self::new(IndexMap::new())
    }
}

impl VarSource for TaskVars {
    fn get_var(&self, name: &str) -> Option<Value> {
        self.vars.get(name).cloned()
    }
}

/// Text produced by a remote probe.
///
/// Such text must be used verbatim and never passed through template
/// expansion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnsafeText(String);

impl UnsafeText {
    /// Wrap text.
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Borrow the text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnsafeText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Value Semantics
// ============================================================================

/// Framework truthiness: null, false, zero, and empty strings/collections are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Return the first truthy value among `names`, consulting them in order.
///
/// Lookups stop at the first hit; later names are never read.
pub fn first_truthy(source: &dyn VarSource, names: &[&str]) -> Option<Value> {
    first_truthy_named(source, names).map(|(_, value)| value)
}

/// Like [`first_truthy`], also returning the name that matched.
pub fn first_truthy_named<'n>(
    source: &dyn VarSource,
    names: &[&'n str],
) -> Option<(&'n str, Value)> {
    names
        .iter()
        .find_map(|name| source.get_var(name).filter(is_truthy).map(|v| (*name, v)))
}

/// Return the first non-null value among `names`, consulting them in order.
pub fn first_present(source: &dyn VarSource, names: &[&str]) -> Option<Value> {
    first_present_named(source, names).map(|(_, value)| value)
}

/// Like [`first_present`], also returning the name that matched.
pub fn first_present_named<'n>(
    source: &dyn VarSource,
    names: &[&'n str],
) -> Option<(&'n str, Value)> {
    names
        .iter()
        .find_map(|name| source.get_var(name).filter(|v| !v.is_null()).map(|v| (*name, v)))
}

/// Render a value as text. Null is absent.
pub fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(if *b { "True" } else { "False" }.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Render a value as text, treating falsy values as absent.
pub fn as_nonempty_string(value: &Value) -> Option<String> {
    if is_truthy(value) {
        as_string(value)
    } else {
        None
    }
}

/// Coerce a value to an integer. Null and empty strings are absent.
pub fn as_int(name: &str, value: &Value) -> Result<Option<i64>> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(i64::from(*b))),
        Value::Number(n) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| Error::invalid_value(name, format!("'{}' is not an integer", n))),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| Error::invalid_value(name, format!("'{}' is not an integer", s))),
        other => Err(Error::invalid_value(
            name,
            format!("expected an integer, got {}", other),
        )),
    }
}

/// Coerce a value to a non-negative integer of type `T`.
pub fn as_unsigned<T: TryFrom<i64>>(name: &str, value: &Value) -> Result<Option<T>> {
    match as_int(name, value)? {
        None => Ok(None),
        Some(n) => T::try_from(n)
            .map(Some)
            .map_err(|_| Error::invalid_value(name, format!("{} is out of range", n))),
    }
}

/// Coerce a value with the framework's strict boolean rules.
pub fn as_bool(name: &str, value: &Value) -> Result<bool> {
    const TRUE: [&str; 6] = ["y", "yes", "on", "1", "true", "t"];
    const FALSE: [&str; 6] = ["n", "no", "off", "0", "false", "f"];

    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f == 1.0 => Ok(true),
            Some(f) if f == 0.0 => Ok(false),
            _ => Err(Error::invalid_value(
                name,
                format!("{} is not a valid boolean", n),
            )),
        },
        Value::String(s) => {
            let normalized = s.trim().to_lowercase();
            if TRUE.contains(&normalized.as_str()) {
                Ok(true)
            } else if FALSE.contains(&normalized.as_str()) {
                Ok(false)
            } else {
                Err(Error::invalid_value(
                    name,
                    format!("'{}' is not a valid boolean", s),
                ))
            }
        }
        other => Err(Error::invalid_value(
            name,
            format!("{} is not a valid boolean", other),
        )),
    }
}
