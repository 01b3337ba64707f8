//! Tests for loading process-wide defaults and the configuration service.

use std::io::Write;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use serial_test::serial;
use tempfile::NamedTempFile;

use rustible_transport::config::{
    ConfigManager, ConfigResolver, Defaults, DEFAULT_SSH_ARGS, SSH_CONNECTION,
};
use rustible_transport::Error;

fn write_file(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_load_explicit_toml_file() {
    let file = write_file(
        ".toml",
        r#"
transport = "paramiko"
remote_user = "deploy"
ssh_common_args = "-o StrictHostKeyChecking=no"
"#,
    );

    let defaults = Defaults::load(Some(file.path())).unwrap();
    assert_eq!(defaults.transport, "paramiko");
    assert_eq!(defaults.remote_user.as_deref(), Some("deploy"));
    assert_eq!(defaults.ssh_common_args, "-o StrictHostKeyChecking=no");
    assert_eq!(defaults.ssh_args, DEFAULT_SSH_ARGS);
}

#[test]
#[serial]
fn test_load_json_file() {
    let file = write_file(".json", r#"{"timeout": 60, "doas_exe": "/usr/bin/doas"}"#);

    let defaults = Defaults::load(Some(file.path())).unwrap();
    assert_eq!(defaults.timeout, 60);
    assert_eq!(defaults.doas_exe.as_deref(), Some("/usr/bin/doas"));
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    let file = write_file(".yml", "remote_user: from-file\nhost_key_checking: true\n");
    std::env::set_var("ANSIBLE_REMOTE_USER", "from-env");
    std::env::set_var("ANSIBLE_HOST_KEY_CHECKING", "False");

    let defaults = Defaults::load(Some(file.path()));
    std::env::remove_var("ANSIBLE_REMOTE_USER");
    std::env::remove_var("ANSIBLE_HOST_KEY_CHECKING");

    let defaults = defaults.unwrap();
    assert_eq!(defaults.remote_user.as_deref(), Some("from-env"));
    assert!(!defaults.host_key_checking);
}

#[test]
#[serial]
fn test_unparsable_environment_value_is_ignored() {
    std::env::set_var("ANSIBLE_REMOTE_PORT", "not-a-port");
    let defaults = Defaults::load(Some(std::path::Path::new("/nonexistent/transport.toml")));
    std::env::remove_var("ANSIBLE_REMOTE_PORT");

    assert_eq!(defaults.unwrap().remote_port, None);
}

#[test]
fn test_invalid_file_is_config_error() {
    let file = write_file(".yaml", "timeout: [1, 2");
    assert!(matches!(
        Defaults::from_file(file.path()),
        Err(Error::Config(_))
    ));
}

#[test]
fn test_manager_uses_its_defaults() {
    let manager = ConfigManager::new(Defaults {
        ssh_executable: "/opt/openssh/bin/ssh".to_string(),
        interpreter_python: "auto_silent".to_string(),
        ..Defaults::default()
    });
    let vars: indexmap::IndexMap<String, Value> = indexmap::IndexMap::new();

    assert_eq!(
        manager
            .get_config_value("ssh_executable", Some(SSH_CONNECTION), &vars)
            .unwrap()
            .as_deref(),
        Some("/opt/openssh/bin/ssh")
    );
    assert_eq!(
        manager
            .get_config_value("INTERPRETER_PYTHON", None, &vars)
            .unwrap()
            .as_deref(),
        Some("auto_silent")
    );
}

#[test]
fn test_manager_ignores_null_variables() {
    let manager = ConfigManager::default();
    let mut vars = serde_json::Map::new();
    vars.insert("ansible_ssh_executable".to_string(), json!(null));

    assert_eq!(
        manager
            .get_config_value("ssh_executable", Some(SSH_CONNECTION), &vars)
            .unwrap()
            .as_deref(),
        Some("ssh")
    );
}
