//! Configuration of intermediary hops (`mitogen_via`).
//!
//! A proxy hop has no task-local context of its own: everything comes from
//! its host variables, resolved through the same synonym chains the
//! automation framework uses, ending in the process-wide [`Defaults`].
//!
//! [`Defaults`]: crate::config::Defaults

use serde_json::Value;
use std::fmt;

use super::{parse_verbosity, ConnectionSource, ResolutionContext};
use crate::argv;
use crate::config::SSH_CONNECTION;
use crate::error::{Error, Result};
use crate::interpreter::Action;
use crate::secret::{optional_secret, Secret};
use crate::vars::{
    as_bool, as_nonempty_string, as_string, as_unsigned, first_present, first_present_named,
    first_truthy, first_truthy_named, TaskVars, VarSource,
};

// ============================================================================
// Via Specification
// ============================================================================

/// A parsed `[[become_method:]become_user@]inventory_name` hop.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ViaSpec {
    /// Become method requested for the hop
    pub become_method: Option<String>,
    /// Become user requested for the hop
    pub become_user: Option<String>,
    /// Inventory name of the hop
    pub inventory_name: String,
}

impl ViaSpec {
    /// Parse a single hop.
    ///
    /// The inventory name follows the last `@`; within the prefix, the
    /// become method precedes the last `:`.
    pub fn parse(via: &str) -> Result<Self> {
        let via = via.trim();
        let (prefix, inventory_name) = match via.rsplit_once('@') {
            Some((prefix, name)) => (Some(prefix), name),
            None => (None, via),
        };

        if inventory_name.is_empty() {
            return Err(Error::invalid_value(
                "mitogen_via",
                format!("'{}' does not name an inventory host", via),
            ));
        }

        let (become_method, become_user) = match prefix {
            Some(prefix) => match prefix.rsplit_once(':') {
                Some((method, user)) => (non_empty(method), non_empty(user)),
                None => (None, non_empty(prefix)),
            },
            None => (None, None),
        };

        Ok(Self {
            become_method,
            become_user,
            inventory_name: inventory_name.to_string(),
        })
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

// ============================================================================
// Proxy Host Source
// ============================================================================

/// Source for a hop reached only through its host variables.
pub struct ProxyHostSource<'a> {
    ctx: ResolutionContext<'a>,
    inventory_name: String,
    host_vars: &'a dyn VarSource,
    task_vars: &'a TaskVars,
    become_method: Option<String>,
    become_user: Option<String>,
    action: &'a dyn Action,
}

impl<'a> ProxyHostSource<'a> {
    /// Create a source for `inventory_name` from its host variables.
    pub fn new(
        ctx: ResolutionContext<'a>,
        inventory_name: impl Into<String>,
        host_vars: &'a dyn VarSource,
        task_vars: &'a TaskVars,
        action: &'a dyn Action,
    ) -> Self {
        Self {
            ctx,
            inventory_name: inventory_name.into(),
            host_vars,
            task_vars,
            become_method: None,
            become_user: None,
            action,
        }
    }

    /// Build a source for a `mitogen_via` hop, reading its variables from
    /// `hostvars` in the task snapshot.
    pub fn from_via(
        ctx: ResolutionContext<'a>,
        via: &ViaSpec,
        task_vars: &'a TaskVars,
        action: &'a dyn Action,
    ) -> Result<Self> {
        let host_vars = task_vars.hostvars(&via.inventory_name).ok_or_else(|| {
            Error::invalid_value(
                "mitogen_via",
                format!("no host variables for '{}'", via.inventory_name),
            )
        })?;

        Ok(Self::new(ctx, via.inventory_name.clone(), host_vars, task_vars, action)
            .with_become(via.become_method.clone(), via.become_user.clone()))
    }

    /// Set the become method and user requested for this hop.
    pub fn with_become(mut self, method: Option<String>, user: Option<String>) -> Self {
        self.become_method = method;
        self.become_user = user;
        self
    }

    fn text(&self, names: &[&str]) -> Option<String> {
        first_truthy(self.host_vars, names)
            .as_ref()
            .and_then(as_nonempty_string)
    }

    fn var(&self, name: &str) -> Option<Value> {
        self.host_vars.get_var(name).filter(|v| !v.is_null())
    }

    fn var_string(&self, name: &str) -> Option<String> {
        self.var(name).as_ref().and_then(as_string)
    }

    fn var_unsigned<T: TryFrom<i64>>(&self, name: &str) -> Result<Option<T>> {
        match self.var(name) {
            Some(value) => as_unsigned(name, &value),
            None => Ok(None),
        }
    }

    fn config_value(&self, key: &str) -> Result<Option<String>> {
        self.ctx
            .config
            .get_config_value(key, Some(SSH_CONNECTION), self.host_vars)
    }
}

impl ConnectionSource for ProxyHostSource<'_> {
    fn transport(&self) -> Result<String> {
        Ok(self
            .text(&["ansible_connection"])
            .unwrap_or_else(|| self.ctx.defaults.transport.clone()))
    }

    fn inventory_name(&self) -> &str {
        &self.inventory_name
    }

    fn remote_addr(&self) -> Result<Option<String>> {
        Ok(Some(
            self.text(&["ansible_ssh_host", "ansible_host"])
                .unwrap_or_else(|| self.inventory_name.clone()),
        ))
    }

    fn remote_user(&self) -> Result<Option<String>> {
        Ok(self
            .text(&["ansible_ssh_user", "ansible_user"])
            .or_else(|| self.ctx.defaults.remote_user.clone()))
    }

    fn port(&self) -> Result<Option<u16>> {
        match first_truthy_named(self.host_vars, &["ansible_ssh_port", "ansible_port"]) {
            Some((name, value)) => as_unsigned(name, &value),
            None => Ok(self.ctx.defaults.remote_port),
        }
    }

    fn r#become(&self) -> Result<bool> {
        Ok(self.become_user()?.is_some_and(|user| !user.is_empty()))
    }

    fn become_method(&self) -> Result<Option<String>> {
        Ok(self
            .become_method
            .clone()
            .or_else(|| self.text(&["ansible_become_method"]))
            .or_else(|| Some(self.ctx.defaults.become_method.clone())))
    }

    fn become_user(&self) -> Result<Option<String>> {
        Ok(self
            .become_user
            .clone()
            .or_else(|| self.text(&["ansible_become_user"])))
    }

    fn become_pass(&self) -> Result<Option<Secret>> {
        Ok(optional_secret(
            self.text(&["ansible_become_pass", "ansible_become_password"]),
        ))
    }

    fn become_exe(&self) -> Result<Option<String>> {
        Ok(self
            .text(&["ansible_become_exe"])
            .or_else(|| self.ctx.defaults.become_exe.clone()))
    }

    fn become_flags(&self) -> Result<Option<String>> {
        Ok(self
            .text(&["ansible_become_flags"])
            .or_else(|| self.ctx.defaults.become_flags.clone()))
    }

    fn sudo_args(&self) -> Result<Vec<String>> {
        let sudo_flags = self.text(&["ansible_sudo_flags"]);
        let become_flags = self.become_flags()?;
        argv::split_all([sudo_flags.as_deref(), become_flags.as_deref()])
    }

    fn password(&self) -> Result<Option<Secret>> {
        Ok(optional_secret(self.text(&[
            "ansible_ssh_password",
            "ansible_ssh_pass",
            "ansible_password",
        ])))
    }

    fn private_key_file(&self) -> Result<Option<String>> {
        Ok(self
            .text(&["ansible_ssh_private_key_file", "ansible_private_key_file"])
            .or_else(|| self.ctx.defaults.private_key_file.clone()))
    }

    fn ssh_executable(&self) -> Result<Option<String>> {
        self.config_value("ssh_executable")
    }

    fn ssh_args(&self) -> Result<Vec<String>> {
        let base = self.config_value("ssh_args")?;
        let common = self.config_value("ssh_common_args")?;
        let extra = self.config_value("ssh_extra_args")?;
        argv::split_all([base.as_deref(), common.as_deref(), extra.as_deref()])
    }

    fn host_key_checking(&self) -> Result<bool> {
        match first_present_named(
            self.host_vars,
            &["ansible_ssh_host_key_checking", "ansible_host_key_checking"],
        ) {
            Some((name, value)) => as_bool(name, &value),
            None => Ok(self.ctx.defaults.host_key_checking),
        }
    }

    fn timeout(&self) -> Result<Option<u64>> {
        Ok(Some(self.ctx.defaults.timeout))
    }

    fn ssh_timeout(&self) -> Result<Option<u64>> {
        match first_truthy_named(self.host_vars, &["ansible_timeout", "ansible_ssh_timeout"]) {
            Some((name, value)) => as_unsigned(name, &value),
            None => self.timeout(),
        }
    }

    fn python_path(&self, rediscover: bool) -> Result<Vec<String>> {
        let setting = self.var_string("ansible_python_interpreter");
        self.ctx
            .resolver
            .resolve(setting.as_deref(), self.task_vars, self.action, rediscover)
    }

    fn via(&self) -> Result<Option<String>> {
        Ok(self.var_string("mitogen_via"))
    }

    fn kind(&self) -> Result<Option<String>> {
        Ok(self.var_string("mitogen_kind"))
    }

    fn mask_remote_name(&self) -> Result<bool> {
        match self.var("mitogen_mask_remote_name") {
            Some(value) => as_bool("mitogen_mask_remote_name", &value),
            None => Ok(false),
        }
    }

    fn buildah_path(&self) -> Result<Option<String>> {
        Ok(self.var_string("mitogen_buildah_path"))
    }

    fn docker_path(&self) -> Result<Option<String>> {
        Ok(self.var_string("mitogen_docker_path"))
    }

    fn kubectl_path(&self) -> Result<Option<String>> {
        Ok(self.var_string("mitogen_kubectl_path"))
    }

    fn lxc_path(&self) -> Result<Option<String>> {
        Ok(self.var_string("mitogen_lxc_path"))
    }

    fn lxc_attach_path(&self) -> Result<Option<String>> {
        Ok(self.var_string("mitogen_lxc_attach_path"))
    }

    fn lxc_info_path(&self) -> Result<Option<String>> {
        Ok(self.var_string("mitogen_lxc_info_path"))
    }

    fn machinectl_path(&self) -> Result<Option<String>> {
        Ok(self.var_string("mitogen_machinectl_path"))
    }

    fn podman_path(&self) -> Result<Option<String>> {
        Ok(self.var_string("mitogen_podman_path"))
    }

    fn ssh_keepalive_interval(&self) -> Result<Option<u32>> {
        self.var_unsigned("mitogen_ssh_keepalive_interval")
    }

    fn ssh_keepalive_count(&self) -> Result<Option<u32>> {
        self.var_unsigned("mitogen_ssh_keepalive_count")
    }

    fn ssh_debug_level(&self) -> Result<Option<u32>> {
        self.var_unsigned("mitogen_ssh_debug_level")
    }

    fn ssh_compression(&self) -> Result<Option<bool>> {
        self.var("mitogen_ssh_compression")
            .map(|value| as_bool("mitogen_ssh_compression", &value))
            .transpose()
    }

    /// Always empty: proxy hops carry no connection-specific extra arguments.
    fn extra_args(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn doas_exe(&self) -> Result<Option<String>> {
        Ok(self
            .text(&["ansible_doas_exe"])
            .or_else(|| self.ctx.defaults.doas_exe.clone()))
    }

    fn verbosity(&self) -> Result<u32> {
        parse_verbosity(first_present(
            self.host_vars,
            &["ansible_ssh_verbosity", "mitogen_ssh_debug_level"],
        ))
    }
}

impl fmt::Debug for ProxyHostSource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyHostSource")
            .field("inventory_name", &self.inventory_name)
            .field("become_method", &self.become_method)
            .field("become_user", &self.become_user)
            .finish_non_exhaustive()
    }
}
