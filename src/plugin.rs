//! Collaborator contracts of a live connection.
//!
//! A direct target is described by its connection plugin (which knows its
//! own options) and by the legacy [`PlayContext`] (plain attributes, used
//! when the plugin does not know an option).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::secret::Secret;
use crate::vars::TaskVars;

/// Connection plugins that act as become methods without implementing the
/// become option capability.
pub const BECOME_FALLBACK_PLUGINS: [&str; 3] = ["mitogen_doas", "mitogen_sudo", "mitogen_su"];

/// Become options those plugins may read from the play context instead.
pub const BECOME_FALLBACK_OPTIONS: [&str; 2] = ["become_exe", "become_flags"];

/// Outcome of asking a plugin for an option.
///
/// `NotFound` means the plugin does not define the option at all; an option
/// that is defined but unset is `Found(Value::Null)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    /// The plugin defines the option.
    Found(T),
    /// The plugin does not know the option.
    NotFound,
}

impl<T> Lookup<T> {
    /// Returns true if the option was found.
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    /// Convert into an `Option`.
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound => None,
        }
    }

    /// Map the found value.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Lookup<U> {
        match self {
            Lookup::Found(value) => Lookup::Found(f(value)),
            Lookup::NotFound => Lookup::NotFound,
        }
    }

    /// Return the found value, or run a fallible fallback.
    pub fn or_else<F>(self, fallback: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        match self {
            Lookup::Found(value) => Ok(value),
            Lookup::NotFound => fallback(),
        }
    }
}

impl<T> From<Option<T>> for Lookup<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Lookup::Found(value),
            None => Lookup::NotFound,
        }
    }
}

/// A connection plugin bound to one target.
pub trait ConnectionPlugin: Send + Sync {
    /// Name of the plugin, e.g. `ssh` or `mitogen_sudo`.
    fn transport(&self) -> &str;

    /// Look up a plugin option, scoped by the task's variables.
    fn get_option(&self, name: &str, task_vars: &TaskVars) -> Lookup<Value>;

    /// Look up a task variable as the plugin sees it (delegation-aware).
    fn get_task_var(&self, name: &str) -> Option<Value>;

    /// Extra command-line arguments supplied for this connection.
    fn get_extra_args(&self) -> Vec<String> {
        Vec::new()
    }

    /// The privilege escalation plugin, if become is active.
    fn become_plugin(&self) -> Option<&dyn BecomePlugin>;

    /// Name of the host this connection is delegated to, if any.
    fn delegate_to_hostname(&self) -> Option<&str> {
        None
    }
}

/// A privilege escalation plugin attached to a connection.
pub trait BecomePlugin: Send + Sync {
    /// Become method name, e.g. `sudo`.
    fn name(&self) -> &str;

    /// Look up a become option.
    fn get_option(&self, name: &str, task_vars: &TaskVars, play_context: &PlayContext)
        -> Lookup<Value>;
}

/// Legacy per-task execution context.
///
/// Every field is a fallback target for an option the connection plugin
/// does not define.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayContext {
    /// Transport name
    pub connection: Option<String>,
    /// Address of the target
    pub remote_addr: Option<String>,
    /// Login user
    pub remote_user: Option<String>,
    /// Login port
    pub port: Option<u16>,
    /// Login password
    pub password: Option<Secret>,
    /// SSH private key file
    pub private_key_file: Option<String>,
    /// Connection timeout in seconds
    pub timeout: Option<u64>,
    /// SSH executable
    pub ssh_executable: Option<String>,
    /// SSH arguments
    pub ssh_args: Option<String>,
    /// SSH common arguments
    pub ssh_common_args: Option<String>,
    /// SSH extra arguments
    pub ssh_extra_args: Option<String>,
    /// Verify host keys
    pub host_key_checking: Option<bool>,
    /// Privilege escalation enabled
    pub r#become: bool,
    /// Become method
    pub become_method: Option<String>,
    /// Become user
    pub become_user: Option<String>,
    /// Become password
    pub become_pass: Option<Secret>,
    /// Become executable
    pub become_exe: Option<String>,
    /// Become flags
    pub become_flags: Option<String>,
    /// Verbosity level
    pub verbosity: Option<u32>,
}

impl PlayContext {
    /// Read an attribute by its legacy name. Unknown names read as absent.
    pub fn attribute(&self, name: &str) -> Option<Value> {
        fn text(value: &Option<String>) -> Option<Value> {
            value.clone().map(Value::String)
        }
        fn secret(value: &Option<Secret>) -> Option<Value> {
            value.as_ref().map(|s| Value::String(s.expose().to_string()))
        }

        match name {
            "connection" => text(&self.connection),
            "remote_addr" => text(&self.remote_addr),
            "remote_user" => text(&self.remote_user),
            "port" => self.port.map(Value::from),
            "password" => secret(&self.password),
            "private_key_file" => text(&self.private_key_file),
            "timeout" => self.timeout.map(Value::from),
            "ssh_executable" => text(&self.ssh_executable),
            "ssh_args" => text(&self.ssh_args),
            "ssh_common_args" => text(&self.ssh_common_args),
            "ssh_extra_args" => text(&self.ssh_extra_args),
            "host_key_checking" => self.host_key_checking.map(Value::Bool),
            "become" => Some(Value::Bool(self.r#become)),
            "become_method" => text(&self.become_method),
            "become_user" => text(&self.become_user),
            "become_pass" => secret(&self.become_pass),
            "become_exe" => text(&self.become_exe),
            "become_flags" => text(&self.become_flags),
            "verbosity" => self.verbosity.map(Value::from),
            _ => None,
        }
    }
}
