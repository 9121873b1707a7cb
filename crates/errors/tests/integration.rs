//! Integration tests for error types

#[cfg(test)]
mod tests {
    use stagehand_errors::*;
    use uuid::Uuid;

    #[test]
    fn test_error_conversion() {
        let engine_err = EngineError::UnknownTemplate {
            template_id: "nope".into(),
        };
        let err: Error = engine_err.into();
        assert!(matches!(err, Error::Engine(_)));
        assert!(err.as_engine().is_some());
    }

    #[test]
    fn test_error_display() {
        let id = Uuid::nil();
        let err = EngineError::invalid_state(id, "pending", "running");
        assert_eq!(
            err.to_string(),
            format!("operation {id} is running, expected pending")
        );
    }

    #[test]
    fn test_user_codes_are_stable() {
        let err: Error = EngineError::NotFound {
            operation_id: Uuid::nil(),
        }
        .into();
        assert_eq!(err.user_code(), Some("engine.not_found"));
        assert!(err.user_hint().is_some());
        assert!(!err.is_retryable());

        let err: Error = ConfigError::InvalidValue {
            field: "STAGEHAND_TICK_INTERVAL_MS".into(),
            value: "soon".into(),
        }
        .into();
        assert_eq!(err.user_code(), Some("config.invalid_value"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "test");
        let storage_err = StorageError::from_io_with_path(&io_err, std::path::Path::new("/tmp/x"));
        assert!(matches!(storage_err, StorageError::PermissionDenied { .. }));

        let err: Error = std::io::Error::new(std::io::ErrorKind::Other, "boom").into();
        assert!(err.is_retryable());
        assert_eq!(err.user_code(), Some("error.io"));
    }
}
