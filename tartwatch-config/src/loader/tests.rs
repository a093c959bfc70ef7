use super::*;

use crate::constants::env;
use crate::loader::layers::ConfigLayerSource;
use serial_test::serial;
use std::fs;

fn builder_for(workspace: &std::path::Path) -> ConfigBuilder {
    ConfigBuilder::new()
        .workspace(workspace.to_path_buf())
        .system_config(None)
        .home_config(None)
        .read_env(false)
}

#[test]
#[serial]
fn layered_config_loading_prefers_workspace_over_user() {
    let workspace = assert_fs::TempDir::new().expect("failed to create workspace");
    let root = workspace.path();

    let home_config = root.join("home").join("tartwatch.toml");
    fs::create_dir_all(home_config.parent().expect("parent")).expect("home dir");
    fs::write(&home_config, "api_url = \"http://user:1\"\nrefresh_rate = 9\n")
        .expect("write user config");
    fs::write(root.join("tartwatch.toml"), "api_url = \"http://workspace:2\"\n")
        .expect("write workspace config");

    let manager = builder_for(root)
        .home_config(Some(home_config))
        .build()
        .expect("load");

    assert_eq!(manager.config().api_url, "http://workspace:2");
    assert_eq!(manager.config().refresh_rate, 9);

    let layers = manager.layer_stack().layers();
    assert_eq!(layers.len(), 2);
    assert!(matches!(
        layers.first().map(|layer| &layer.source),
        Some(ConfigLayerSource::User { .. })
    ));
    assert!(matches!(
        layers.last().map(|layer| &layer.source),
        Some(ConfigLayerSource::Workspace { .. })
    ));
    assert_eq!(manager.config_path(), Some(root.join("tartwatch.toml").as_path()));
}

#[test]
#[serial]
fn missing_files_fall_back_to_defaults() {
    let workspace = assert_fs::TempDir::new().expect("failed to create workspace");
    let manager = builder_for(workspace.path()).build().expect("load");

    assert_eq!(manager.config(), &TartConfig::default());
    assert!(manager.layer_stack().layers().is_empty());
    assert_eq!(
        manager.save_path().expect("save path"),
        workspace.path().join("tartwatch.toml")
    );
}

#[test]
#[serial]
fn cli_overrides_win_over_files() {
    let workspace = assert_fs::TempDir::new().expect("failed to create workspace");
    fs::write(workspace.path().join("tartwatch.toml"), "refresh_rate = 3\n")
        .expect("write workspace config");

    let manager = builder_for(workspace.path())
        .cli_override("refresh_rate", toml::Value::Integer(30))
        .cli_overrides(&[("connection.max_reconnect_attempts".to_string(), "8".to_string())])
        .build()
        .expect("load");

    assert_eq!(manager.config().refresh_rate, 30);
    assert_eq!(manager.config().connection.max_reconnect_attempts, 8);
    assert!(matches!(
        manager.layer_stack().layers().last().map(|layer| &layer.source),
        Some(ConfigLayerSource::Runtime)
    ));
}

#[test]
#[serial]
fn environment_api_url_overrides_files() {
    let workspace = assert_fs::TempDir::new().expect("failed to create workspace");
    fs::write(workspace.path().join("tartwatch.toml"), "api_url = \"http://file:1\"\n")
        .expect("write workspace config");

    unsafe {
        std::env::set_var(env::API_URL, "http://env:2");
    }
    let loaded = builder_for(workspace.path()).read_env(true).build();
    unsafe {
        std::env::remove_var(env::API_URL);
    }

    let manager = loaded.expect("load");
    assert_eq!(manager.config().api_url, "http://env:2");
}

#[test]
#[serial]
fn invalid_values_fail_validation() {
    let workspace = assert_fs::TempDir::new().expect("failed to create workspace");
    fs::write(workspace.path().join("tartwatch.toml"), "refresh_rate = 0\n")
        .expect("write workspace config");

    let err = builder_for(workspace.path()).build().expect_err("must fail");
    assert!(format!("{err:#}").contains("refresh_rate"));
}

#[test]
#[serial]
fn unreadable_workspace_layer_is_skipped() {
    let workspace = assert_fs::TempDir::new().expect("failed to create workspace");
    fs::write(workspace.path().join("tartwatch.toml"), "refresh_rate = [").expect("write");

    let manager = builder_for(workspace.path()).build().expect("load");
    assert_eq!(manager.config(), &TartConfig::default());
}

#[test]
#[serial]
fn explicit_file_errors_are_reported() {
    let workspace = assert_fs::TempDir::new().expect("failed to create workspace");
    let missing = workspace.path().join("nope.toml");
    assert!(
        builder_for(workspace.path())
            .config_file(missing)
            .build()
            .is_err()
    );
}
