//! Integration tests for config

#[cfg(test)]
mod tests {
    use stagehand_config::*;
    use stagehand_errors::{ConfigError, Error};
    use stagehand_types::LogFormat;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to ensure env var tests don't run concurrently
    static ENV_TEST_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for var in [
            constants::ENV_TICK_INTERVAL_MS,
            constants::ENV_COMPLETION_PROBABILITY,
            constants::ENV_FAILURE_PROBABILITY,
            constants::ENV_MAX_LOG_LINES,
            constants::ENV_LOG_FORMAT,
        ] {
            std::env::remove_var(var);
        }
    }

    #[tokio::test]
    async fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[general]
log_format = "json"

[engine]
completion_probability = 0.5
failure_probability = 0.1
max_log_lines = 0

[scheduler]
tick_interval_ms = 250
stop_when_idle = false

[[templates]]
id = "nightly"
name = "Nightly build"

[[templates.stages]]
name = "Fetch"

[[templates.stages]]
name = "Upload"
checkpoints = [
    {{ progress = 50, message = "Half way" }},
    {{ progress = 100, message = "Uploaded" }},
]
        "#
        )
        .unwrap();

        let config = Config::load_from_file(temp_file.path()).await.unwrap();
        assert_eq!(config.general.log_format, LogFormat::Json);
        assert_eq!(config.general.log_filter, "info");
        assert!((config.engine.completion_probability - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.engine.log_capacity(), None);
        assert_eq!(config.engine.history_capacity(), Some(50));
        assert_eq!(config.scheduler.tick_interval_ms, 250);
        assert!(!config.scheduler.stop_when_idle);

        assert_eq!(config.templates.len(), 1);
        let template = &config.templates[0];
        assert_eq!(template.stage_names(), vec!["Fetch", "Upload"]);
        assert_eq!(template.stages[1].checkpoints.len(), 2);
        config.validate().unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load_from_file(&dir.path().join("absent.toml")).await;
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::NotFound { .. }))
        ));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let result = Config::from_toml("[engine\ncompletion_probability = ");
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::ParseError { .. }))
        ));
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.scheduler.tick_interval_ms = 750;
        config.save_to_file(&path).await.unwrap();

        let loaded = Config::load_or_default(Some(&path)).await.unwrap();
        assert_eq!(loaded.scheduler.tick_interval_ms, 750);
        assert!(loaded.templates.is_empty());
    }

    #[test]
    fn test_merge_env() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        clear_env();

        std::env::set_var(constants::ENV_TICK_INTERVAL_MS, "100");
        std::env::set_var(constants::ENV_FAILURE_PROBABILITY, "0.25");
        std::env::set_var(constants::ENV_MAX_LOG_LINES, "10");
        std::env::set_var(constants::ENV_LOG_FORMAT, "json");

        let mut config = Config::default();
        config.merge_env().unwrap();

        assert_eq!(config.scheduler.tick_interval_ms, 100);
        assert!((config.engine.failure_probability - 0.25).abs() < f64::EPSILON);
        assert_eq!(config.engine.log_capacity(), Some(10));
        assert_eq!(config.general.log_format, LogFormat::Json);

        clear_env();
    }

    #[test]
    fn test_invalid_env_value() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        clear_env();

        std::env::set_var(constants::ENV_TICK_INTERVAL_MS, "soon");

        let mut config = Config::default();
        let result = config.merge_env();
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::InvalidValue { ref field, .. }))
                if field == constants::ENV_TICK_INTERVAL_MS
        ));

        clear_env();
    }

    #[test]
    fn test_validate_rejects_bad_probabilities() {
        let mut config = Config::default();
        config.engine.completion_probability = 1.5;
        assert!(config.validate().is_err());

        config.engine.completion_probability = 0.7;
        config.engine.failure_probability = 0.5;
        assert!(matches!(
            config.validate(),
            Err(Error::Config(ConfigError::Invalid { .. }))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.scheduler.tick_interval_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(Error::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_validate_rejects_duplicate_templates() {
        let mut config = Config::default();
        let template = stagehand_types::OperationTemplate::new("dup", "Dup", ["A"]);
        config.templates = vec![template.clone(), template];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_builtin_template_ids() {
        let mut config = Config::default();
        config.templates = vec![stagehand_types::OperationTemplate::new(
            "react-app",
            "My React",
            ["Build"],
        )];
        let err = config.validate().unwrap_err();
        match err {
            Error::Config(ConfigError::Invalid { message }) => {
                assert!(message.contains("react-app"), "{message}");
                assert!(message.contains("built-in"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.scheduler.tick_interval().as_millis(), 2000);
        assert_eq!(config.engine.log_capacity(), Some(200));
    }
}
