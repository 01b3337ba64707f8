//! Process-wide defaults and the configuration lookup service.
//!
//! Defaults are loaded from multiple sources, later ones winning:
//! - Built-in values
//! - System configuration (/etc/rustible/transport.toml)
//! - User configuration (~/.rustible/transport.toml)
//! - An explicit file or `RUSTIBLE_TRANSPORT_CONFIG`
//! - `ANSIBLE_*` environment variables
//!
//! [`ConfigManager`] answers "what is setting X for plugin Y given these
//! variables", which is how proxy hops resolve SSH arguments without a live
//! connection plugin.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};
use crate::vars::{as_bool, as_string, VarSource};

/// Default SSH arguments of the `ssh` connection plugin.
pub const DEFAULT_SSH_ARGS: &str = "-C -o ControlMaster=auto -o ControlPersist=60s";

/// Default interpreter setting; triggers discovery.
pub const DEFAULT_INTERPRETER_PYTHON: &str = "auto";

/// Process-wide connection defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    /// Default transport/connection plugin
    pub transport: String,

    /// Default remote user
    pub remote_user: Option<String>,

    /// Default remote port
    pub remote_port: Option<u16>,

    /// Default become method
    pub become_method: String,

    /// Default become executable
    pub become_exe: Option<String>,

    /// Default become flags
    pub become_flags: Option<String>,

    /// Default private key file
    pub private_key_file: Option<String>,

    /// Default connection timeout in seconds
    pub timeout: u64,

    /// Verify host keys
    pub host_key_checking: bool,

    /// Interpreter path or discovery mode
    pub interpreter_python: String,

    /// Override for the doas executable
    pub doas_exe: Option<String>,

    /// SSH executable
    pub ssh_executable: String,

    /// SSH arguments
    pub ssh_args: String,

    /// SSH common args
    pub ssh_common_args: String,

    /// SSH extra args
    pub ssh_extra_args: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            transport: "ssh".to_string(),
            remote_user: None,
            remote_port: None,
            become_method: "sudo".to_string(),
            become_exe: None,
            become_flags: None,
            private_key_file: None,
            timeout: 10,
            host_key_checking: true,
            interpreter_python: DEFAULT_INTERPRETER_PYTHON.to_string(),
            doas_exe: None,
            ssh_executable: "ssh".to_string(),
            ssh_args: DEFAULT_SSH_ARGS.to_string(),
            ssh_common_args: String::new(),
            ssh_extra_args: String::new(),
        }
    }
}

impl Defaults {
    /// Load defaults from all sources.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut defaults = Defaults::default();

        for path in Self::get_config_paths(config_path) {
            if path.exists() {
                debug!(path = %path.display(), "Loading transport defaults");
                defaults = defaults.merge(DefaultsOverlay::read(&path)?);
            }
        }

        defaults.apply_env_overrides();
        Ok(defaults)
    }

    /// Get the list of configuration file paths to check, lowest priority first.
    fn get_config_paths(explicit_path: Option<&Path>) -> Vec<PathBuf> {
        if let Some(path) = explicit_path {
            return vec![path.to_path_buf()];
        }

        let mut paths = vec![PathBuf::from("/etc/rustible/transport.toml")];

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".rustible/transport.toml"));
        }

        if let Ok(env_config) = std::env::var("RUSTIBLE_TRANSPORT_CONFIG") {
            paths.push(PathBuf::from(env_config));
        }

        paths
    }

    /// Load from a single file, format chosen by extension. Keys the file
    /// does not set keep their built-in values.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Defaults::default().merge(DefaultsOverlay::read(path.as_ref())?))
    }

    /// Merge the keys a file sets into this set of defaults.
    fn merge(self, other: DefaultsOverlay) -> Defaults {
        Defaults {
            transport: other.transport.unwrap_or(self.transport),
            remote_user: other.remote_user.or(self.remote_user),
            remote_port: other.remote_port.or(self.remote_port),
            become_method: other.become_method.unwrap_or(self.become_method),
            become_exe: other.become_exe.or(self.become_exe),
            become_flags: other.become_flags.or(self.become_flags),
            private_key_file: other.private_key_file.or(self.private_key_file),
            timeout: other.timeout.unwrap_or(self.timeout),
            host_key_checking: other.host_key_checking.unwrap_or(self.host_key_checking),
            interpreter_python: other.interpreter_python.unwrap_or(self.interpreter_python),
            doas_exe: other.doas_exe.or(self.doas_exe),
            ssh_executable: other.ssh_executable.unwrap_or(self.ssh_executable),
            ssh_args: other.ssh_args.unwrap_or(self.ssh_args),
            ssh_common_args: other.ssh_common_args.unwrap_or(self.ssh_common_args),
            ssh_extra_args: other.ssh_extra_args.unwrap_or(self.ssh_extra_args),
        }
    }

    /// Apply `ANSIBLE_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        fn env(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.is_empty())
        }

        if let Some(transport) = env("ANSIBLE_TRANSPORT") {
            self.transport = transport;
        }
        if let Some(user) = env("ANSIBLE_REMOTE_USER") {
            self.remote_user = Some(user);
        }
        if let Some(port) = env("ANSIBLE_REMOTE_PORT") {
            if let Ok(port) = port.parse() {
                self.remote_port = Some(port);
            }
        }
        if let Some(method) = env("ANSIBLE_BECOME_METHOD") {
            self.become_method = method;
        }
        if let Some(exe) = env("ANSIBLE_BECOME_EXE") {
            self.become_exe = Some(exe);
        }
        if let Some(flags) = env("ANSIBLE_BECOME_FLAGS") {
            self.become_flags = Some(flags);
        }
        if let Some(file) = env("ANSIBLE_PRIVATE_KEY_FILE") {
            self.private_key_file = Some(file);
        }
        if let Some(timeout) = env("ANSIBLE_TIMEOUT") {
            if let Ok(n) = timeout.parse() {
                self.timeout = n;
            }
        }
        if let Some(checking) = env("ANSIBLE_HOST_KEY_CHECKING") {
            if let Ok(b) = as_bool("ANSIBLE_HOST_KEY_CHECKING", &Value::String(checking)) {
                self.host_key_checking = b;
            }
        }
        if let Some(interpreter) = env("ANSIBLE_PYTHON_INTERPRETER") {
            self.interpreter_python = interpreter;
        }
        if let Some(exe) = env("ANSIBLE_DOAS_EXE") {
            self.doas_exe = Some(exe);
        }
        if let Some(exe) = env("ANSIBLE_SSH_EXECUTABLE") {
            self.ssh_executable = exe;
        }
        if let Some(args) = env("ANSIBLE_SSH_ARGS") {
            self.ssh_args = args;
        }
        if let Some(args) = env("ANSIBLE_SSH_COMMON_ARGS") {
            self.ssh_common_args = args;
        }
        if let Some(args) = env("ANSIBLE_SSH_EXTRA_ARGS") {
            self.ssh_extra_args = args;
        }
    }
}

/// The keys one defaults file actually sets.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DefaultsOverlay {
    transport: Option<String>,
    remote_user: Option<String>,
    remote_port: Option<u16>,
    become_method: Option<String>,
    become_exe: Option<String>,
    become_flags: Option<String>,
    private_key_file: Option<String>,
    timeout: Option<u64>,
    host_key_checking: Option<bool>,
    interpreter_python: Option<String>,
    doas_exe: Option<String>,
    ssh_executable: Option<String>,
    ssh_args: Option<String>,
    ssh_common_args: Option<String>,
    ssh_extra_args: Option<String>,
}

impl DefaultsOverlay {
    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read '{}': {}", path.display(), e))
        })?;

        let parsed: std::result::Result<Self, String> =
            match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
                "yml" | "yaml" => serde_yaml::from_str(&content).map_err(|e| e.to_string()),
                "json" => serde_json::from_str(&content).map_err(|e| e.to_string()),
                _ => toml::from_str(&content).map_err(|e| e.to_string()),
            };

        parsed.map_err(|e| Error::Config(format!("Failed to parse '{}': {}", path.display(), e)))
    }
}

// ============================================================================
// Configuration Lookup Service
// ============================================================================

/// A plugin a setting belongs to, e.g. `connection/ssh`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PluginRef<'a> {
    /// Plugin type, e.g. `connection`
    pub kind: &'a str,
    /// Plugin name, e.g. `ssh`
    pub name: &'a str,
}

impl<'a> PluginRef<'a> {
    /// Create a plugin reference.
    pub const fn new(kind: &'a str, name: &'a str) -> Self {
        Self { kind, name }
    }
}

/// The `ssh` connection plugin.
pub const SSH_CONNECTION: PluginRef<'static> = PluginRef::new("connection", "ssh");

/// Resolves a configuration setting against a set of variables.
pub trait ConfigResolver: Send + Sync {
    /// Resolve `key`, optionally scoped to a plugin, using `variables`.
    ///
    /// Returns `None` when neither a variable nor a default supplies a value.
    fn get_config_value(
        &self,
        key: &str,
        plugin: Option<PluginRef<'_>>,
        variables: &dyn VarSource,
    ) -> Result<Option<String>>;
}

/// Definition of one resolvable setting.
#[derive(Debug, Clone)]
struct SettingDef {
    key: &'static str,
    plugin: Option<PluginRef<'static>>,
    /// Variable names, highest priority first
    vars: &'static [&'static str],
    default: Option<String>,
}

/// Table-driven [`ConfigResolver`] backed by [`Defaults`].
#[derive(Debug, Clone)]
pub struct ConfigManager {
    defaults: Defaults,
    settings: Vec<SettingDef>,
}

impl ConfigManager {
    /// Create a manager with the given defaults.
    pub fn new(defaults: Defaults) -> Self {
        let settings = vec![
            SettingDef {
                key: "INTERPRETER_PYTHON",
                plugin: None,
                vars: &["ansible_python_interpreter"],
                default: Some(defaults.interpreter_python.clone()),
            },
            SettingDef {
                key: "ssh_executable",
                plugin: Some(SSH_CONNECTION),
                vars: &["ansible_ssh_executable"],
                default: Some(defaults.ssh_executable.clone()),
            },
            SettingDef {
                key: "ssh_args",
                plugin: Some(SSH_CONNECTION),
                vars: &["ansible_ssh_args"],
                default: Some(defaults.ssh_args.clone()),
            },
            SettingDef {
                key: "ssh_common_args",
                plugin: Some(SSH_CONNECTION),
                vars: &["ansible_ssh_common_args"],
                default: Some(defaults.ssh_common_args.clone()),
            },
            SettingDef {
                key: "ssh_extra_args",
                plugin: Some(SSH_CONNECTION),
                vars: &["ansible_ssh_extra_args"],
                default: Some(defaults.ssh_extra_args.clone()),
            },
        ];

        Self { defaults, settings }
    }

    /// The defaults this manager was built from.
    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new(Defaults::default())
    }
}

impl ConfigResolver for ConfigManager {
    fn get_config_value(
        &self,
        key: &str,
        plugin: Option<PluginRef<'_>>,
        variables: &dyn VarSource,
    ) -> Result<Option<String>> {
        let def = self
            .settings
            .iter()
            .find(|def| def.key == key && def.plugin == plugin)
            .ok_or_else(|| match plugin {
                Some(p) => Error::Config(format!(
                    "Unknown setting '{}' for {}/{}",
                    key, p.kind, p.name
                )),
                None => Error::Config(format!("Unknown setting '{}'", key)),
            })?;

        let from_vars = def
            .vars
            .iter()
            .find_map(|name| variables.get_var(name).filter(|v| !v.is_null()));

        Ok(match from_vars {
            Some(value) => as_string(&value),
            None => def.default.clone(),
        })
    }
}
