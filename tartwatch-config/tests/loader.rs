use anyhow::Result;
use assert_fs::TempDir;
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::fs;
use tartwatch_config::{ConfigBuilder, SettingsHandle, TartConfig, TraceLevel};

fn isolated(workspace: &TempDir) -> ConfigBuilder {
    ConfigBuilder::new()
        .workspace(workspace.path().to_path_buf())
        .system_config(None)
        .home_config(None)
        .read_env(false)
}

#[test]
#[serial]
fn explicit_file_layers_over_user_config() -> Result<()> {
    let temp = TempDir::new()?;
    let home = temp.path().join("home.toml");
    fs::write(&home, "[debug]\ntrace_level = \"debug\"\n")?;
    let explicit = temp.path().join("custom").join("tart.toml");
    fs::create_dir_all(explicit.parent().expect("parent"))?;
    fs::write(&explicit, "api_url = \"https://tart.example.org\"\n")?;

    let manager = isolated(&temp)
        .home_config(Some(home))
        .config_file(explicit.clone())
        .build()?;

    assert_eq!(manager.config().api_url, "https://tart.example.org");
    assert_eq!(manager.config().debug.trace_level, TraceLevel::Debug);
    assert_eq!(manager.config_path(), Some(explicit.as_path()));
    assert_eq!(
        manager.config().push_url()?.as_str(),
        "wss://tart.example.org/api/ws"
    );
    Ok(())
}

#[test]
#[serial]
fn saving_preserves_comments_and_unknown_keys() -> Result<()> {
    let temp = TempDir::new()?;
    let path = temp.path().join("tartwatch.toml");
    fs::write(
        &path,
        "# backend used by the lab cluster\napi_url = \"http://lab:8080\" # keep\nrefresh_rate = 5\n\n[extra]\nnote = \"kept\"\n",
    )?;

    let mut manager = isolated(&temp).build()?;
    let mut updated = manager.config().clone();
    updated.refresh_rate = 15;
    let saved_to = manager.save_config(&updated)?;

    assert_eq!(saved_to, path);
    let contents = fs::read_to_string(&path)?;
    assert!(contents.contains("# backend used by the lab cluster"));
    assert!(contents.contains("# keep"));
    assert!(contents.contains("note = \"kept\""));
    assert!(contents.contains("refresh_rate = 15"));

    let reloaded = isolated(&temp).build()?;
    assert_eq!(reloaded.config().refresh_rate, 15);
    assert_eq!(reloaded.config().api_url, "http://lab:8080");
    Ok(())
}

#[test]
#[serial]
fn settings_handle_persists_to_manager_path() -> Result<()> {
    let temp = TempDir::new()?;
    let manager = isolated(&temp).build()?;
    let handle = SettingsHandle::from_manager(&manager)?;

    handle.set_api_url("http://other:8080")?;

    let reloaded = isolated(&temp).build()?;
    assert_eq!(reloaded.config().api_url, "http://other:8080");
    assert_eq!(
        handle.persistence_path(),
        Some(temp.path().join("tartwatch.toml").as_path())
    );
    Ok(())
}

#[test]
#[serial]
fn saving_invalid_config_is_refused() -> Result<()> {
    let temp = TempDir::new()?;
    let mut manager = isolated(&temp).build()?;
    let invalid = TartConfig {
        refresh_rate: 0,
        ..TartConfig::default()
    };
    assert!(manager.save_config(&invalid).is_err());
    assert!(!temp.path().join("tartwatch.toml").exists());
    Ok(())
}
