//! Configuration loading from files on disk.

use std::io::Write;

use triangle_core::config::DEFAULT_CONFIG_FILE;
use triangle_core::{AppConfig, Error, PresentModePreference};

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig::load_or_default(dir.path().join(DEFAULT_CONFIG_FILE)).unwrap();
    assert_eq!(config, AppConfig::default());
}

#[test]
fn test_missing_file_is_error_for_load() {
    let dir = tempfile::tempdir().unwrap();
    let result = AppConfig::load(dir.path().join("absent.toml"));
    assert!(matches!(result, Err(Error::Io(_))));
}

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[window]
title = "Hello"
resizable = false

[renderer]
present_mode = "immediate"
clear_color = [0.1, 0.2, 0.3, 1.0]
"#
    )
    .unwrap();

    let config = AppConfig::load_or_default(file.path()).unwrap();
    assert_eq!(config.window.title, "Hello");
    assert!(!config.window.resizable);
    assert_eq!(config.renderer.present_mode, PresentModePreference::Immediate);
    assert_eq!(config.renderer.clear_color, [0.1, 0.2, 0.3, 1.0]);
}

#[test]
fn test_malformed_file_reports_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[window\nwidth = 3").unwrap();

    match AppConfig::load_or_default(file.path()) {
        Err(Error::Config(message)) => {
            assert!(message.contains(&file.path().display().to_string()));
        }
        other => panic!("Expected config error, got {:?}", other),
    }
}
