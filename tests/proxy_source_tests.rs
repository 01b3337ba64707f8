//! Tests for connection configuration of proxy hops.

mod common;

use std::cell::RefCell;

use common::*;
use mockall::mock;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use rustible_transport::config::Defaults;
use rustible_transport::interpreter::ActionState;
use rustible_transport::secret::Secret;
use rustible_transport::source::{ConnectionSource, ConnectionSpec, ProxyHostSource, ViaSpec};
use rustible_transport::vars::{LazyHostVars, TaskVars, VarSource};
use rustible_transport::Error;

mock! {
    pub HostVars {}

    impl VarSource for HostVars {
        fn get_var(&self, name: &str) -> Option<Value>;
    }
}

fn proxy<'a>(
    harness: &'a Harness,
    vars: &'a dyn VarSource,
    task_vars: &'a TaskVars,
    action: &'a ActionState,
) -> ProxyHostSource<'a> {
    ProxyHostSource::new(harness.ctx(), "bastion", vars, task_vars, action)
}

// ============================================================================
// End to End
// ============================================================================

#[test]
fn test_basic_host_variables() {
    let harness = Harness::new();
    let vars = host_vars(json!({
        "ansible_host": "10.0.0.5",
        "ansible_user": "ops",
        "ansible_port": 2222
    }));
    let task_vars = TaskVars::default();
    let action = ActionState::new();

    let source = proxy(&harness, &vars, &task_vars, &action);
    assert_eq!(source.remote_addr().unwrap().as_deref(), Some("10.0.0.5"));
    assert_eq!(source.remote_user().unwrap().as_deref(), Some("ops"));
    assert_eq!(source.port().unwrap(), Some(2222));
    assert!(!source.r#become().unwrap());
}

#[test]
fn test_resolved_spec_for_hop() {
    let harness = Harness::new();
    let vars = host_vars(json!({
        "ansible_host": "10.0.0.5",
        "ansible_user": "ops",
        "ansible_port": 2222,
        "ansible_ssh_pass": "pw",
        "ansible_python_interpreter": "/usr/bin/python3"
    }));
    let task_vars = TaskVars::default();
    let action = ActionState::new();

    let source = proxy(&harness, &vars, &task_vars, &action);
    let spec = ConnectionSpec::resolve(&source, false).unwrap();

    assert_eq!(spec.transport, "ssh");
    assert_eq!(spec.inventory_name, "bastion");
    assert_eq!(spec.password, Some(Secret::new("pw")));
    assert_eq!(spec.timeout, Some(10));
    assert_eq!(spec.ssh_executable.as_deref(), Some("ssh"));
    assert_eq!(spec.python_path, vec!["/usr/bin/python3"]);
    assert!(spec.host_key_checking);
    assert!(spec.extra_args.is_empty());
    assert_eq!(spec.verbosity, 0);

    let rendered = serde_json::to_string(&spec).unwrap();
    assert!(!rendered.contains("\"pw\""));
}

#[test]
fn test_from_via_with_become() {
    let harness = Harness::new();
    let task_vars = TaskVars::from_json(json!({
        "hostvars": {
            "bastion": {
                "ansible_host": "10.0.0.5",
                "ansible_become_pass": "topsecret",
                "ansible_become_flags": "-H"
            }
        }
    }));
    let action = ActionState::new();

    let via = ViaSpec::parse("su:root@bastion").unwrap();
    let source = ProxyHostSource::from_via(harness.ctx(), &via, &task_vars, &action).unwrap();
    let spec = ConnectionSpec::resolve(&source, false).unwrap();

    assert!(spec.r#become);
    assert_eq!(spec.become_method.as_deref(), Some("su"));
    assert_eq!(spec.become_user.as_deref(), Some("root"));
    assert_eq!(spec.become_pass, Some(Secret::new("topsecret")));
    assert_eq!(spec.sudo_args, vec!["-H"]);
    assert_eq!(spec.remote_addr.as_deref(), Some("10.0.0.5"));
}

// ============================================================================
// Fallback Chains
// ============================================================================

#[test]
fn test_remote_addr_stops_at_first_hit() {
    let harness = Harness::new();
    let mut vars = MockHostVars::new();
    vars.expect_get_var()
        .withf(|name| name == "ansible_ssh_host")
        .times(1)
        .return_const(Some(json!("192.0.2.1")));
    vars.expect_get_var()
        .withf(|name| name == "ansible_host")
        .never();
    let task_vars = TaskVars::default();
    let action = ActionState::new();

    let source = proxy(&harness, &vars, &task_vars, &action);
    assert_eq!(source.remote_addr().unwrap().as_deref(), Some("192.0.2.1"));
}

#[test]
fn test_password_chain_skips_empty_values() {
    let harness = Harness::new();
    let mut vars = MockHostVars::new();
    vars.expect_get_var()
        .withf(|name| name == "ansible_ssh_password")
        .times(1)
        .return_const(Some(json!("")));
    vars.expect_get_var()
        .withf(|name| name == "ansible_ssh_pass")
        .times(1)
        .return_const(None::<Value>);
    vars.expect_get_var()
        .withf(|name| name == "ansible_password")
        .times(1)
        .return_const(Some(json!("third")));
    let task_vars = TaskVars::default();
    let action = ActionState::new();

    let source = proxy(&harness, &vars, &task_vars, &action);
    assert_eq!(source.password().unwrap(), Some(Secret::new("third")));
}

#[test]
fn test_user_and_port_stop_at_ssh_synonym() {
    let harness = Harness::new();
    let mut vars = MockHostVars::new();
    vars.expect_get_var()
        .withf(|name| name == "ansible_ssh_user")
        .return_const(Some(json!("legacy")));
    vars.expect_get_var()
        .withf(|name| name == "ansible_ssh_port")
        .return_const(Some(json!("2200")));
    vars.expect_get_var()
        .withf(|name| name == "ansible_user" || name == "ansible_port")
        .never();
    let task_vars = TaskVars::default();
    let action = ActionState::new();

    let source = proxy(&harness, &vars, &task_vars, &action);
    assert_eq!(source.remote_user().unwrap().as_deref(), Some("legacy"));
    assert_eq!(source.port().unwrap(), Some(2200));
}

#[test]
fn test_chains_end_in_defaults() {
    let harness = Harness::with_defaults(Defaults {
        transport: "paramiko".to_string(),
        remote_user: Some("automation".to_string()),
        remote_port: Some(2201),
        become_exe: Some("/usr/bin/sudo".to_string()),
        private_key_file: Some("/keys/id".to_string()),
        timeout: 42,
        ..Defaults::default()
    });
    let vars = host_vars(json!({}));
    let task_vars = TaskVars::default();
    let action = ActionState::new();

    let source = proxy(&harness, &vars, &task_vars, &action);
    assert_eq!(source.transport().unwrap(), "paramiko");
    assert_eq!(source.remote_addr().unwrap().as_deref(), Some("bastion"));
    assert_eq!(source.remote_user().unwrap().as_deref(), Some("automation"));
    assert_eq!(source.port().unwrap(), Some(2201));
    assert_eq!(source.become_exe().unwrap().as_deref(), Some("/usr/bin/sudo"));
    assert_eq!(source.private_key_file().unwrap().as_deref(), Some("/keys/id"));
    assert_eq!(source.password().unwrap(), None);
    assert_eq!(source.become_pass().unwrap(), None);
    assert_eq!(source.ssh_timeout().unwrap(), Some(42));
}

#[test]
fn test_invalid_values_name_the_matching_variable() {
    let harness = Harness::new();
    let vars = host_vars(json!({
        "ansible_ssh_port": "twenty-two",
        "ansible_port": 22,
        "ansible_ssh_timeout": "soon",
        "ansible_host_key_checking": "maybe"
    }));
    let task_vars = TaskVars::default();
    let action = ActionState::new();
    let source = proxy(&harness, &vars, &task_vars, &action);

    let invalid_name = |err: Error| match err {
        Error::InvalidValue { name, .. } => name,
        other => panic!("expected an invalid value error, got {:?}", other),
    };
    assert_eq!(invalid_name(source.port().unwrap_err()), "ansible_ssh_port");
    assert_eq!(invalid_name(source.ssh_timeout().unwrap_err()), "ansible_ssh_timeout");
    assert_eq!(
        invalid_name(source.host_key_checking().unwrap_err()),
        "ansible_host_key_checking"
    );
}

#[test]
fn test_become_requires_non_empty_user() {
    let harness = Harness::new();
    let vars = host_vars(json!({"ansible_become_user": ""}));
    let task_vars = TaskVars::default();
    let action = ActionState::new();

    let source = proxy(&harness, &vars, &task_vars, &action);
    assert!(!source.r#become().unwrap());

    let source = proxy(&harness, &vars, &task_vars, &action).with_become(None, Some(String::new()));
    assert!(!source.r#become().unwrap());

    let vars = host_vars(json!({"ansible_become_user": "postgres"}));
    let source = proxy(&harness, &vars, &task_vars, &action);
    assert!(source.r#become().unwrap());
}

#[test]
fn test_ssh_args_scoped_to_hop_variables() {
    let harness = Harness::new();
    let vars = host_vars(json!({
        "ansible_ssh_args": "-o ForwardAgent=yes",
        "ansible_ssh_common_args": "",
        "ansible_ssh_extra_args": "-4"
    }));
    let task_vars = TaskVars::default();
    let action = ActionState::new();

    let source = proxy(&harness, &vars, &task_vars, &action);
    assert_eq!(
        source.ssh_args().unwrap(),
        vec!["-o", "ForwardAgent=yes", "-4"]
    );
}

#[test]
fn test_doas_exe_and_verbosity() {
    let harness = Harness::with_defaults(Defaults {
        doas_exe: Some("/usr/bin/doas".to_string()),
        ..Defaults::default()
    });
    let task_vars = TaskVars::default();
    let action = ActionState::new();

    let vars = host_vars(json!({"ansible_ssh_verbosity": 3}));
    let source = proxy(&harness, &vars, &task_vars, &action);
    assert_eq!(source.doas_exe().unwrap().as_deref(), Some("/usr/bin/doas"));
    assert_eq!(source.verbosity().unwrap(), 3);

    let vars = host_vars(json!({
        "ansible_doas_exe": "/opt/doas",
        "ansible_ssh_verbosity": 0,
        "mitogen_ssh_debug_level": 4
    }));
    let source = proxy(&harness, &vars, &task_vars, &action);
    assert_eq!(source.doas_exe().unwrap().as_deref(), Some("/opt/doas"));
    assert_eq!(source.verbosity().unwrap(), 0);
}

// ============================================================================
// Lazy Host Variables
// ============================================================================

#[test]
fn test_lazy_host_vars_are_not_cached() {
    let harness = Harness::new();
    let lookups = RefCell::new(Vec::new());
    let vars = LazyHostVars::new("bastion", |name: &str| {
        lookups.borrow_mut().push(name.to_string());
        (name == "ansible_host").then(|| json!("10.0.0.9"))
    });
    let task_vars = TaskVars::default();
    let action = ActionState::new();

    let source = proxy(&harness, &vars, &task_vars, &action);
    source.remote_addr().unwrap();
    source.remote_addr().unwrap();

    let host_lookups = lookups
        .borrow()
        .iter()
        .filter(|name| name.as_str() == "ansible_host")
        .count();
    assert_eq!(host_lookups, 2);
}
