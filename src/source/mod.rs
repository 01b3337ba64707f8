//! Connection configuration sources.
//!
//! A [`ConnectionSource`] answers every question the connection layer asks
//! about a target. Two implementations exist:
//!
//! - [`DirectContextSource`] for the real target and `delegate_to` targets,
//!   backed by the live connection plugin and play context
//! - [`ProxyHostSource`] for intermediary hops, backed only by the hop's
//!   host variables and process-wide defaults
//!
//! Callers pick the source that fits the target and then assemble a
//! [`ConnectionSpec`]; they must not depend on which source they hold.

pub mod direct;
pub mod proxy;

pub use direct::DirectContextSource;
pub use proxy::{ProxyHostSource, ViaSpec};

use serde::Serialize;
use serde_json::Value;

use crate::config::{ConfigResolver, Defaults};
use crate::error::{Error, Result};
use crate::interpreter::InterpreterResolver;
use crate::plugin::BECOME_FALLBACK_PLUGINS;
use crate::secret::Secret;
use crate::template::Templar;
use crate::vars::{as_int, is_truthy};

/// Services shared by every source built during one resolution.
#[derive(Clone, Copy)]
pub struct ResolutionContext<'a> {
    /// Process-wide defaults
    pub defaults: &'a Defaults,
    /// Configuration lookup service
    pub config: &'a dyn ConfigResolver,
    /// Interpreter resolver and its discovery cache
    pub resolver: &'a InterpreterResolver,
    /// Template expansion for the interpreter setting
    pub templar: &'a dyn Templar,
}

impl std::fmt::Debug for ResolutionContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionContext")
            .field("defaults", self.defaults)
            .field("resolver", self.resolver)
            .finish_non_exhaustive()
    }
}

/// Parse a verbosity value. Falsy values mean zero.
pub(crate) fn parse_verbosity(value: Option<Value>) -> Result<u32> {
    let Some(value) = value.filter(is_truthy) else {
        return Ok(0);
    };

    let malformed = || Error::MalformedVerbosity {
        value: match &value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
    };

    match as_int("verbosity", &value) {
        Ok(Some(n)) => u32::try_from(n).map_err(|_| malformed()),
        Ok(None) => Ok(0),
        Err(_) => Err(malformed()),
    }
}

/// Source of a target's connection configuration.
///
/// Every accessor is a pure read of its inputs except
/// [`python_path`](Self::python_path), which may run interpreter discovery
/// and populate the discovery cache.
pub trait ConnectionSource {
    // ------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------

    /// Name of the connection plugin implementing the transport.
    fn transport(&self) -> Result<String>;

    /// Name of the target as it appears in the inventory.
    fn inventory_name(&self) -> &str;

    /// Network address of the target, or another unique identifier for
    /// container and other special targets.
    fn remote_addr(&self) -> Result<Option<String>>;

    /// Login account on the target.
    fn remote_user(&self) -> Result<Option<String>>;

    /// Port of the login service.
    fn port(&self) -> Result<Option<u16>>;

    // ------------------------------------------------------------------
    // Privilege escalation
    // ------------------------------------------------------------------

    /// True if privilege escalation is active.
    fn r#become(&self) -> Result<bool>;

    /// Become method name.
    fn become_method(&self) -> Result<Option<String>>;

    /// Account to become.
    fn become_user(&self) -> Result<Option<String>>;

    /// Password of the account to become.
    fn become_pass(&self) -> Result<Option<Secret>>;

    /// Path to the become executable on the target.
    fn become_exe(&self) -> Result<Option<String>>;

    /// Command-line flags for the become executable.
    fn become_flags(&self) -> Result<Option<String>>;

    /// Become flags as an argument vector.
    fn sudo_args(&self) -> Result<Vec<String>>;

    // ------------------------------------------------------------------
    // Authentication and transport
    // ------------------------------------------------------------------

    /// Password of the login account.
    fn password(&self) -> Result<Option<Secret>>;

    /// SSH private key file.
    fn private_key_file(&self) -> Result<Option<String>>;

    /// SSH executable.
    fn ssh_executable(&self) -> Result<Option<String>>;

    /// Additional SSH arguments: base, common and extra, in that order.
    fn ssh_args(&self) -> Result<Vec<String>>;

    /// Whether to verify the target's host key.
    fn host_key_checking(&self) -> Result<bool>;

    // ------------------------------------------------------------------
    // Timing
    // ------------------------------------------------------------------

    /// Generic connection timeout in seconds.
    fn timeout(&self) -> Result<Option<u64>>;

    /// SSH-specific connection timeout in seconds.
    fn ssh_timeout(&self) -> Result<Option<u64>>;

    // ------------------------------------------------------------------
    // Interpreter
    // ------------------------------------------------------------------

    /// Interpreter command on the target.
    ///
    /// `rediscover` throws away a cached discovery result first.
    fn python_path(&self, rediscover: bool) -> Result<Vec<String>>;

    // ------------------------------------------------------------------
    // Delegation and proxying
    // ------------------------------------------------------------------

    /// Value of `mitogen_via`: the intermediary to connect through.
    fn via(&self) -> Result<Option<String>>;

    /// Container kind for the `setns` transport.
    fn kind(&self) -> Result<Option<String>>;

    /// Whether to use a fixed remote process name.
    fn mask_remote_name(&self) -> Result<bool>;

    /// Path to `buildah`.
    fn buildah_path(&self) -> Result<Option<String>>;

    /// Path to `docker`.
    fn docker_path(&self) -> Result<Option<String>>;

    /// Path to `kubectl`.
    fn kubectl_path(&self) -> Result<Option<String>>;

    /// Path to `lxc`.
    fn lxc_path(&self) -> Result<Option<String>>;

    /// Path to `lxc-attach`.
    fn lxc_attach_path(&self) -> Result<Option<String>>;

    /// Path to `lxc-info`.
    fn lxc_info_path(&self) -> Result<Option<String>>;

    /// Path to `machinectl`.
    fn machinectl_path(&self) -> Result<Option<String>>;

    /// Path to `podman`.
    fn podman_path(&self) -> Result<Option<String>>;

    /// SSH `ServerAliveInterval`.
    fn ssh_keepalive_interval(&self) -> Result<Option<u32>>;

    /// SSH `ServerAliveCountMax`.
    fn ssh_keepalive_count(&self) -> Result<Option<u32>>;

    /// SSH debug level.
    fn ssh_debug_level(&self) -> Result<Option<u32>>;

    /// Whether SSH compression is enabled.
    fn ssh_compression(&self) -> Result<Option<bool>>;

    // ------------------------------------------------------------------
    // Misc
    // ------------------------------------------------------------------

    /// Connection-specific extra arguments.
    fn extra_args(&self) -> Result<Vec<String>>;

    /// Override for the `doas` executable.
    fn doas_exe(&self) -> Result<Option<String>>;

    /// Diagnostic verbosity.
    fn verbosity(&self) -> Result<u32>;
}

/// Complete connection configuration of one target.
///
/// Built once per connection attempt by [`ConnectionSpec::resolve`] and
/// never modified afterwards. Serializing it redacts passwords.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionSpec {
    pub transport: String,
    pub inventory_name: String,
    pub remote_addr: Option<String>,
    pub remote_user: Option<String>,
    pub port: Option<u16>,
    pub password: Option<Secret>,
    pub r#become: bool,
    pub become_method: Option<String>,
    pub become_user: Option<String>,
    pub become_pass: Option<Secret>,
    pub become_exe: Option<String>,
    pub become_flags: Option<String>,
    pub sudo_args: Vec<String>,
    pub private_key_file: Option<String>,
    pub ssh_executable: Option<String>,
    pub ssh_args: Vec<String>,
    pub host_key_checking: bool,
    pub timeout: Option<u64>,
    pub ssh_timeout: Option<u64>,
    pub python_path: Vec<String>,
    pub via: Option<String>,
    pub kind: Option<String>,
    pub mask_remote_name: bool,
    pub buildah_path: Option<String>,
    pub docker_path: Option<String>,
    pub kubectl_path: Option<String>,
    pub lxc_path: Option<String>,
    pub lxc_attach_path: Option<String>,
    pub lxc_info_path: Option<String>,
    pub machinectl_path: Option<String>,
    pub podman_path: Option<String>,
    pub ssh_keepalive_interval: Option<u32>,
    pub ssh_keepalive_count: Option<u32>,
    pub ssh_debug_level: Option<u32>,
    pub ssh_compression: Option<bool>,
    pub extra_args: Vec<String>,
    pub doas_exe: Option<String>,
    pub verbosity: u32,
}

impl ConnectionSpec {
    /// Query every accessor of `source` and assemble the record.
    ///
    /// The first failing accessor aborts resolution of the whole record.
    ///
    /// Become settings are only queried when become is active; plugins in
    /// [`BECOME_FALLBACK_PLUGINS`] are themselves become methods and always
    /// get their executable and flags resolved.
    pub fn resolve(source: &dyn ConnectionSource, rediscover: bool) -> Result<Self> {
        let transport = source.transport()?;
        let r#become = source.r#become()?;

        let (become_method, become_user, become_pass) = if r#become {
            (
                source.become_method()?,
                source.become_user()?,
                source.become_pass()?,
            )
        } else {
            (None, None, None)
        };

        let (become_exe, become_flags, sudo_args) =
            if r#become || BECOME_FALLBACK_PLUGINS.contains(&transport.as_str()) {
                (
                    source.become_exe()?,
                    source.become_flags()?,
                    source.sudo_args()?,
                )
            } else {
                (None, None, Vec::new())
            };

        Ok(Self {
            transport,
            inventory_name: source.inventory_name().to_string(),
            remote_addr: source.remote_addr()?,
            remote_user: source.remote_user()?,
            port: source.port()?,
            password: source.password()?,
            r#become,
            become_method,
            become_user,
            become_pass,
            become_exe,
            become_flags,
            sudo_args,
            private_key_file: source.private_key_file()?,
            ssh_executable: source.ssh_executable()?,
            ssh_args: source.ssh_args()?,
            host_key_checking: source.host_key_checking()?,
            timeout: source.timeout()?,
            ssh_timeout: source.ssh_timeout()?,
            python_path: source.python_path(rediscover)?,
            via: source.via()?,
            kind: source.kind()?,
            mask_remote_name: source.mask_remote_name()?,
            buildah_path: source.buildah_path()?,
            docker_path: source.docker_path()?,
            kubectl_path: source.kubectl_path()?,
            lxc_path: source.lxc_path()?,
            lxc_attach_path: source.lxc_attach_path()?,
            lxc_info_path: source.lxc_info_path()?,
            machinectl_path: source.machinectl_path()?,
            podman_path: source.podman_path()?,
            ssh_keepalive_interval: source.ssh_keepalive_interval()?,
            ssh_keepalive_count: source.ssh_keepalive_count()?,
            ssh_debug_level: source.ssh_debug_level()?,
            ssh_compression: source.ssh_compression()?,
            extra_args: source.extra_args()?,
            doas_exe: source.doas_exe()?,
            verbosity: source.verbosity()?,
        })
    }
}
