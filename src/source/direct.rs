//! Configuration of the real target and of `delegate_to` targets.
//!
//! Every setting is first asked of the connection plugin. When the plugin
//! does not define the option, the legacy play context attribute is used
//! instead and the fallback is traced. Become options are stricter: only
//! the become-like plugins in [`BECOME_FALLBACK_PLUGINS`] may fall back, and
//! only for [`BECOME_FALLBACK_OPTIONS`].

use serde_json::{Map, Value};
use tracing::trace;

use super::{parse_verbosity, ConnectionSource, ResolutionContext};
use crate::argv;
use crate::error::{Error, Result};
use crate::interpreter::Action;
use crate::plugin::{
    ConnectionPlugin, Lookup, PlayContext, BECOME_FALLBACK_OPTIONS, BECOME_FALLBACK_PLUGINS,
};
use crate::secret::{optional_secret, Secret};
use crate::template::is_template;
use crate::vars::{as_bool, as_nonempty_string, as_string, as_unsigned, TaskVars, VarSource};

/// Source backed by a live connection plugin and its play context.
pub struct DirectContextSource<'a> {
    ctx: ResolutionContext<'a>,
    connection: &'a dyn ConnectionPlugin,
    play_context: &'a PlayContext,
    transport: String,
    inventory_name: String,
    task_vars: &'a TaskVars,
    action: &'a dyn Action,
}

impl<'a> DirectContextSource<'a> {
    /// Create a source for the target `connection` is bound to.
    pub fn new(
        ctx: ResolutionContext<'a>,
        connection: &'a dyn ConnectionPlugin,
        play_context: &'a PlayContext,
        task_vars: &'a TaskVars,
        action: &'a dyn Action,
        inventory_name: impl Into<String>,
    ) -> Self {
        Self {
            ctx,
            transport: connection.transport().to_string(),
            connection,
            play_context,
            inventory_name: inventory_name.into(),
            task_vars,
            action,
        }
    }

    /// Override the transport name reported for this target.
    pub fn with_transport(mut self, transport: impl Into<String>) -> Self {
        self.transport = transport.into();
        self
    }

    /// Ask the plugin for `name`, falling back to the play context
    /// attribute `fallback_attr` (default: `name`).
    fn connection_option(&self, name: &str, fallback_attr: Option<&str>) -> Result<Option<Value>> {
        self.connection
            .get_option(name, self.task_vars)
            .map(|value| Some(value).filter(|v| !v.is_null()))
            .or_else(|| {
                let attr = fallback_attr.unwrap_or(name);
                trace!(
                    plugin = self.connection.transport(),
                    option = name,
                    fallback = attr,
                    "Used play context fallback for option"
                );
                Ok(self.play_context.attribute(attr))
            })
    }

    fn connection_string(&self, name: &str, fallback_attr: Option<&str>) -> Result<Option<String>> {
        Ok(self
            .connection_option(name, fallback_attr)?
            .as_ref()
            .and_then(as_string))
    }

    /// Ask the become plugin for `name`. Falling back is an error unless the
    /// transport and option are both on the allow-list.
    fn become_option(&self, name: &str) -> Result<Option<Value>> {
        let lookup = match self.connection.become_plugin() {
            Some(plugin) => plugin.get_option(name, self.task_vars, self.play_context),
            None => Lookup::NotFound,
        };

        lookup
            .map(|value| Some(value).filter(|v| !v.is_null()))
            .or_else(|| {
                let plugin = self.connection.transport();
                if !BECOME_FALLBACK_PLUGINS.contains(&plugin) {
                    return Err(Error::fatal_option(
                        plugin,
                        name,
                        "become plugin does not provide this option",
                    ));
                }
                if !BECOME_FALLBACK_OPTIONS.contains(&name) {
                    return Err(Error::fatal_option(
                        plugin,
                        name,
                        "only become_exe and become_flags may fall back to the play context",
                    ));
                }

                trace!(
                    plugin,
                    option = name,
                    fallback = name,
                    "Used play context fallback for become option"
                );
                Ok(self.play_context.attribute(name))
            })
    }

    fn task_var(&self, name: &str) -> Option<Value> {
        self.connection.get_task_var(name).filter(|v| !v.is_null())
    }

    fn task_var_string(&self, name: &str) -> Option<String> {
        self.task_var(name).as_ref().and_then(as_string)
    }

    /// Variables the interpreter setting is resolved against: the delegated
    /// host's when delegating, otherwise the task's.
    fn interpreter_scope(&self) -> Option<&'a Map<String, Value>> {
        self.connection
            .delegate_to_hostname()
            .and_then(|host| self.task_vars.delegated_vars(host))
    }
}

impl ConnectionSource for DirectContextSource<'_> {
    fn transport(&self) -> Result<String> {
        Ok(self.transport.clone())
    }

    fn inventory_name(&self) -> &str {
        &self.inventory_name
    }

    fn remote_addr(&self) -> Result<Option<String>> {
        self.connection_string("host", Some("remote_addr"))
    }

    fn remote_user(&self) -> Result<Option<String>> {
        self.connection_string("remote_user", None)
    }

    fn port(&self) -> Result<Option<u16>> {
        match self.connection_option("port", None)? {
            Some(value) => as_unsigned("port", &value),
            None => Ok(None),
        }
    }

    fn r#become(&self) -> Result<bool> {
        Ok(self.connection.become_plugin().is_some())
    }

    fn become_method(&self) -> Result<Option<String>> {
        Ok(self
            .connection
            .become_plugin()
            .map(|plugin| plugin.name().to_string()))
    }

    fn become_user(&self) -> Result<Option<String>> {
        Ok(self.become_option("become_user")?.as_ref().and_then(as_string))
    }

    fn become_pass(&self) -> Result<Option<Secret>> {
        Ok(optional_secret(
            self.become_option("become_pass")?.as_ref().and_then(as_string),
        ))
    }

    fn become_exe(&self) -> Result<Option<String>> {
        Ok(self.become_option("become_exe")?.as_ref().and_then(as_string))
    }

    fn become_flags(&self) -> Result<Option<String>> {
        Ok(self.become_option("become_flags")?.as_ref().and_then(as_string))
    }

    fn sudo_args(&self) -> Result<Vec<String>> {
        let flags = self.become_flags()?;
        argv::split_all([flags.as_deref()])
    }

    fn password(&self) -> Result<Option<Secret>> {
        Ok(optional_secret(self.connection_string("password", None)?))
    }

    fn private_key_file(&self) -> Result<Option<String>> {
        self.connection_string("private_key_file", None)
    }

    fn ssh_executable(&self) -> Result<Option<String>> {
        self.connection_string("ssh_executable", None)
    }

    fn ssh_args(&self) -> Result<Vec<String>> {
        let base = self.connection_string("ssh_args", None)?;
        let common = self.connection_string("ssh_common_args", None)?;
        let extra = self.connection_string("ssh_extra_args", None)?;
        argv::split_all([base.as_deref(), common.as_deref(), extra.as_deref()])
    }

    fn host_key_checking(&self) -> Result<bool> {
        match self.connection_option("host_key_checking", None)? {
            Some(value) => as_bool("host_key_checking", &value),
            None => Ok(self.ctx.defaults.host_key_checking),
        }
    }

    fn timeout(&self) -> Result<Option<u64>> {
        match self.connection_option("timeout", None)? {
            Some(value) => as_unsigned("timeout", &value),
            None => Ok(None),
        }
    }

    fn ssh_timeout(&self) -> Result<Option<u64>> {
        self.timeout()
    }

    fn python_path(&self, rediscover: bool) -> Result<Vec<String>> {
        let delegated = self.interpreter_scope();
        let variables: &dyn VarSource = match delegated {
            Some(vars) => vars,
            None => self.task_vars,
        };

        let setting = match self
            .ctx
            .config
            .get_config_value("INTERPRETER_PYTHON", None, variables)?
        {
            Some(s) if is_template(&s) => {
                let context = match delegated {
                    Some(vars) => Value::Object(vars.clone()),
                    None => Value::Object(
                        self.task_vars
                            .as_map()
                            .iter()
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect(),
                    ),
                };
                Some(self.ctx.templar.render(&s, &context)?)
            }
            other => other,
        };

        self.ctx
            .resolver
            .resolve(setting.as_deref(), self.task_vars, self.action, rediscover)
    }

    fn via(&self) -> Result<Option<String>> {
        Ok(self.task_var_string("mitogen_via"))
    }

    fn kind(&self) -> Result<Option<String>> {
        Ok(self.task_var_string("mitogen_kind"))
    }

    fn mask_remote_name(&self) -> Result<bool> {
        match self.task_var("mitogen_mask_remote_name") {
            Some(value) => as_bool("mitogen_mask_remote_name", &value),
            None => Ok(false),
        }
    }

    fn buildah_path(&self) -> Result<Option<String>> {
        Ok(self.task_var_string("mitogen_buildah_path"))
    }

    fn docker_path(&self) -> Result<Option<String>> {
        Ok(self.task_var_string("mitogen_docker_path"))
    }

    fn kubectl_path(&self) -> Result<Option<String>> {
        Ok(self.task_var_string("mitogen_kubectl_path"))
    }

    fn lxc_path(&self) -> Result<Option<String>> {
        Ok(self.task_var_string("mitogen_lxc_path"))
    }

    fn lxc_attach_path(&self) -> Result<Option<String>> {
        Ok(self.task_var_string("mitogen_lxc_attach_path"))
    }

    fn lxc_info_path(&self) -> Result<Option<String>> {
        Ok(self.task_var_string("mitogen_lxc_info_path"))
    }

    fn machinectl_path(&self) -> Result<Option<String>> {
        Ok(self.task_var_string("mitogen_machinectl_path"))
    }

    fn podman_path(&self) -> Result<Option<String>> {
        Ok(self.task_var_string("mitogen_podman_path"))
    }

    fn ssh_keepalive_interval(&self) -> Result<Option<u32>> {
        match self.task_var("mitogen_ssh_keepalive_interval") {
            Some(value) => as_unsigned("mitogen_ssh_keepalive_interval", &value),
            None => Ok(None),
        }
    }

    fn ssh_keepalive_count(&self) -> Result<Option<u32>> {
        match self.task_var("mitogen_ssh_keepalive_count") {
            Some(value) => as_unsigned("mitogen_ssh_keepalive_count", &value),
            None => Ok(None),
        }
    }

    fn ssh_debug_level(&self) -> Result<Option<u32>> {
        match self.task_var("mitogen_ssh_debug_level") {
            Some(value) => as_unsigned("mitogen_ssh_debug_level", &value),
            None => Ok(None),
        }
    }

    fn ssh_compression(&self) -> Result<Option<bool>> {
        self.task_var("mitogen_ssh_compression")
            .map(|value| as_bool("mitogen_ssh_compression", &value))
            .transpose()
    }

    fn extra_args(&self) -> Result<Vec<String>> {
        Ok(self.connection.get_extra_args())
    }

    fn doas_exe(&self) -> Result<Option<String>> {
        Ok(self
            .task_var("ansible_doas_exe")
            .as_ref()
            .and_then(as_nonempty_string)
            .or_else(|| self.ctx.defaults.doas_exe.clone()))
    }

    fn verbosity(&self) -> Result<u32> {
        let value = match self.connection.get_option("verbosity", self.task_vars) {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound => self.task_var("mitogen_ssh_debug_level"),
        };
        parse_verbosity(value)
    }
}

impl std::fmt::Debug for DirectContextSource<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectContextSource")
            .field("transport", &self.transport)
            .field("inventory_name", &self.inventory_name)
            .field("snapshot", &self.task_vars.id())
            .finish_non_exhaustive()
    }
}
