use std::io::Write;

use tempfile::NamedTempFile;

use crate::config::models::AppConfig;

#[test]
fn test_load_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[database]
url = "sqlite::memory:"
max_connections = 1
min_connections = 1
connection_timeout_seconds = 5
idle_timeout_seconds = 60

[cache]
task_list_ttl_seconds = 30
"#
    )
    .unwrap();

    let config = AppConfig::load(Some(file.path().to_str().unwrap())).unwrap();
    assert_eq!(config.database.url, "sqlite::memory:");
    assert_eq!(config.cache.task_list_ttl_seconds, 30);
    // 文件中未出现的部分回落到默认值
    assert_eq!(config.api.bind_address, "127.0.0.1:8080");
    assert_eq!(config.observability.log_level, "info");
}

#[test]
fn test_load_missing_file_fails() {
    let result = AppConfig::load(Some("/nonexistent/portal.toml"));
    assert!(result.is_err());
}

#[test]
fn test_environment_override() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[engine]
request_timeout_ms = 1000
score_retry_limit = 2
"#
    )
    .unwrap();

    std::env::set_var("CADET_ENGINE__REQUEST_TIMEOUT_MS", "2500");
    let config = AppConfig::load(Some(file.path().to_str().unwrap()));
    std::env::remove_var("CADET_ENGINE__REQUEST_TIMEOUT_MS");

    let config = config.unwrap();
    assert_eq!(config.engine.request_timeout_ms, 2500);
    assert_eq!(config.engine.score_retry_limit, 2);
}
