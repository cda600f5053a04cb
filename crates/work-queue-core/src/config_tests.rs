//! Tests for consumer configuration.

use super::*;
use crate::error_type::{ErrorType, EXCEPTION, INDEX_OUT_OF_RANGE};

mod defaults {
    use super::*;

    #[test]
    fn test_default_sections() {
        let configuration = ConsumerConfiguration::default();

        assert!(configuration.heart_beat.enabled);
        assert_eq!(configuration.heart_beat.time, Duration::from_secs(600));
        assert_eq!(configuration.heart_beat.thread_pool.threads_max, 20);
        assert_eq!(configuration.worker.worker_count, 1);
        assert!(configuration.worker.single_worker_when_no_work_found);
        assert!(configuration.message_expiration.enabled);
        assert!(!configuration.message_error.enabled);
        assert_eq!(
            configuration.message_error.message_age,
            Duration::from_secs(30 * 24 * 60 * 60)
        );
        assert!(configuration.retry_delay.is_empty());
    }

    #[test]
    fn test_default_configuration_freezes() {
        assert!(ConsumerConfiguration::new().freeze().is_ok());
    }
}

mod freezing {
    use super::*;

    #[test]
    fn test_freeze_seals_retry_registry() {
        // Arrange
        let mut configuration = ConsumerConfiguration::new();
        configuration
            .retry_delay
            .add(&INDEX_OUT_OF_RANGE, vec![Duration::from_secs(1)])
            .unwrap();

        // Act
        let frozen = configuration.freeze().unwrap();

        // Assert
        assert!(frozen.retry_delay().is_read_only());
        assert_eq!(frozen.retry_delay().len(), 1);

        let mut copy = frozen.retry_delay().clone();
        let error = copy.add(&EXCEPTION, Vec::new()).unwrap_err();
        assert!(matches!(
            error,
            QueueError::Configuration(ConfigurationError::ReadOnly { .. })
        ));
    }

    #[test]
    fn test_zero_workers_is_invalid() {
        let mut configuration = ConsumerConfiguration::new();
        configuration.worker.worker_count = 0;

        assert!(matches!(
            configuration.freeze(),
            Err(QueueError::Configuration(ConfigurationError::Invalid { .. }))
        ));
    }

    #[test]
    fn test_update_time_must_be_shorter_than_lease() {
        let mut configuration = ConsumerConfiguration::new();
        configuration.heart_beat.update_time = configuration.heart_beat.time;

        assert!(configuration.freeze().is_err());
    }

    #[test]
    fn test_disabled_heart_beat_skips_heart_beat_validation() {
        let mut configuration = ConsumerConfiguration::new();
        configuration.heart_beat.enabled = false;
        configuration.heart_beat.update_time = Duration::ZERO;

        assert!(configuration.freeze().is_ok());
    }

    #[test]
    fn test_maximum_tasks_defaults_to_worker_count() {
        let mut configuration = ConsumerConfiguration::new();
        configuration.worker.worker_count = 4;
        let frozen = configuration.clone().freeze().unwrap();
        assert_eq!(frozen.maximum_tasks(), 4);

        configuration.task_scheduler.maximum_tasks = 9;
        let frozen = configuration.freeze().unwrap();
        assert_eq!(frozen.maximum_tasks(), 9);
    }

    #[test]
    fn test_maximum_tasks_above_semaphore_limit_is_invalid() {
        let mut configuration = ConsumerConfiguration::new();
        configuration.task_scheduler.maximum_tasks = usize::MAX;

        assert!(matches!(
            configuration.freeze(),
            Err(QueueError::Configuration(ConfigurationError::Invalid { .. }))
        ));
    }

    #[test]
    fn test_worker_count_above_semaphore_limit_is_invalid() {
        let mut configuration = ConsumerConfiguration::new();
        configuration.worker.worker_count = Semaphore::MAX_PERMITS + 1;

        assert!(configuration.freeze().is_err());
    }

    #[test]
    fn test_heart_beat_threads_above_semaphore_limit_is_invalid() {
        let mut configuration = ConsumerConfiguration::new();
        configuration.heart_beat.thread_pool.threads_max = usize::MAX;

        assert!(matches!(
            configuration.freeze(),
            Err(QueueError::Configuration(ConfigurationError::Invalid { .. }))
        ));
    }
}

mod settings {
    use super::*;

    static PAYMENT_DECLINED: ErrorType = ErrorType::derived("PaymentDeclined", &EXCEPTION);

    #[test]
    fn test_empty_document_uses_defaults() {
        let settings: ConsumerSettings = serde_yaml::from_str("{}").unwrap();

        let configuration = settings
            .into_configuration(&ErrorTypeCatalog::new())
            .unwrap();

        assert_eq!(configuration.worker, WorkerConfiguration::default());
        assert_eq!(configuration.heart_beat, HeartBeatConfiguration::default());
    }

    #[test]
    fn test_yaml_settings_convert_to_configuration() {
        // Arrange
        let yaml = r#"
worker:
  worker_count: 3
  poll_interval_ms: 50
heart_beat:
  time_seconds: 30
  update_time_seconds: 5
message_error:
  enabled: true
  message_age_seconds: 3600
retry_delays:
  - error_type: IndexOutOfRangeException
    delays_ms: [1000, 2000]
  - error_type: PaymentDeclined
    delays_ms: []
"#;
        let settings: ConsumerSettings = serde_yaml::from_str(yaml).unwrap();
        let mut catalog = ErrorTypeCatalog::new();
        catalog.register(&PAYMENT_DECLINED);

        // Act
        let configuration = settings.into_configuration(&catalog).unwrap();

        // Assert
        assert_eq!(configuration.worker.worker_count, 3);
        assert_eq!(configuration.worker.poll_interval, Duration::from_millis(50));
        assert_eq!(configuration.heart_beat.time, Duration::from_secs(30));
        assert_eq!(configuration.heart_beat.update_time, Duration::from_secs(5));
        assert!(configuration.message_error.enabled);
        assert_eq!(configuration.message_error.message_age, Duration::from_secs(3600));

        let info = configuration
            .retry_delay
            .retry_information_for(&INDEX_OUT_OF_RANGE);
        assert_eq!(
            info.times(),
            &[Duration::from_secs(1), Duration::from_secs(2)]
        );
        assert_eq!(
            configuration
                .retry_delay
                .retry_information_for(&PAYMENT_DECLINED)
                .max_retries(),
            0
        );
    }

    #[test]
    fn test_unknown_error_type_name_fails() {
        let yaml = r#"
retry_delays:
  - error_type: MadeUpException
    delays_ms: [10]
"#;
        let settings: ConsumerSettings = serde_yaml::from_str(yaml).unwrap();

        let error = settings
            .into_configuration(&ErrorTypeCatalog::new())
            .unwrap_err();

        assert!(matches!(
            error,
            QueueError::Configuration(ConfigurationError::UnknownErrorType { .. })
        ));
    }

    #[test]
    fn test_duplicate_error_type_in_file_fails() {
        let yaml = r#"
retry_delays:
  - error_type: TimeoutException
  - error_type: TimeoutException
"#;
        let settings: ConsumerSettings = serde_yaml::from_str(yaml).unwrap();

        assert!(matches!(
            settings.into_configuration(&ErrorTypeCatalog::new()),
            Err(QueueError::Configuration(
                ConfigurationError::DuplicateRetryType { .. }
            ))
        ));
    }
}
