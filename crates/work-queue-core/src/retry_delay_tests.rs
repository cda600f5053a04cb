//! Tests for the retry delay registry.

use super::*;
use crate::error_type::{
    ARGUMENT, ARGUMENT_NULL, ARGUMENT_OUT_OF_RANGE, EXCEPTION, INDEX_OUT_OF_RANGE, TIMEOUT,
};

static UNNAMED: ErrorType = ErrorType::root("");

fn secs(values: &[u64]) -> Vec<Duration> {
    values.iter().copied().map(Duration::from_secs).collect()
}

mod registration {
    use super::*;

    #[test]
    fn test_add_then_lookup_exact_type() {
        let mut registry = RetryDelayRegistry::new();
        registry.add(&TIMEOUT, secs(&[1, 2, 3])).unwrap();

        let info = registry.retry_information_for(&TIMEOUT);

        assert_eq!(info.error_type(), Some(&TIMEOUT));
        assert_eq!(info.max_retries(), 3);
        assert_eq!(info.times(), secs(&[1, 2, 3]).as_slice());
    }

    #[test]
    fn test_duplicate_type_is_rejected() {
        let mut registry = RetryDelayRegistry::new();
        registry.add(&TIMEOUT, secs(&[1])).unwrap();

        let error = registry.add(&TIMEOUT, secs(&[5])).unwrap_err();

        assert!(matches!(
            error,
            QueueError::Configuration(ConfigurationError::DuplicateRetryType { .. })
        ));
        assert_eq!(registry.retry_information_for(&TIMEOUT).times(), secs(&[1]).as_slice());
    }

    #[test]
    fn test_add_after_read_only_is_rejected() {
        let mut registry = RetryDelayRegistry::new();
        registry.set_read_only();

        let error = registry.add(&TIMEOUT, secs(&[1])).unwrap_err();

        assert!(registry.is_read_only());
        assert!(matches!(
            error,
            QueueError::Configuration(ConfigurationError::ReadOnly { .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unnamed_type_is_rejected() {
        let mut registry = RetryDelayRegistry::new();

        let error = registry.add(&UNNAMED, secs(&[1])).unwrap_err();

        assert!(matches!(
            error,
            QueueError::Validation(ValidationError::Required { .. })
        ));
    }

    #[test]
    fn test_empty_schedule_is_allowed() {
        let mut registry = RetryDelayRegistry::new();
        registry.add(&EXCEPTION, Vec::new()).unwrap();

        let info = registry.retry_information_for(&EXCEPTION);
        assert_eq!(info.error_type(), Some(&EXCEPTION));
        assert_eq!(info.max_retries(), 0);
    }
}

mod lookup {
    use super::*;

    #[test]
    fn test_derived_type_uses_ancestor_schedule() {
        let mut registry = RetryDelayRegistry::new();
        registry.add(&ARGUMENT, secs(&[4])).unwrap();

        let info = registry.retry_information_for(&ARGUMENT_NULL);

        assert_eq!(info.error_type(), Some(&ARGUMENT));
        assert_eq!(info.max_retries(), 1);
    }

    #[test]
    fn test_most_specific_registration_wins() {
        let mut registry = RetryDelayRegistry::new();
        registry.add(&EXCEPTION, secs(&[])).unwrap();
        registry.add(&ARGUMENT, secs(&[1])).unwrap();
        registry.add(&ARGUMENT_OUT_OF_RANGE, secs(&[1, 2])).unwrap();

        assert_eq!(
            registry.retry_information_for(&ARGUMENT_OUT_OF_RANGE).error_type(),
            Some(&ARGUMENT_OUT_OF_RANGE)
        );
        assert_eq!(
            registry.retry_information_for(&ARGUMENT_NULL).error_type(),
            Some(&ARGUMENT)
        );
        assert_eq!(
            registry.retry_information_for(&TIMEOUT).error_type(),
            Some(&EXCEPTION)
        );
    }

    #[test]
    fn test_unregistered_hierarchy_yields_no_information() {
        let mut registry = RetryDelayRegistry::new();
        registry.add(&INDEX_OUT_OF_RANGE, secs(&[1])).unwrap();

        let info = registry.retry_information(&HandlerError::new(&TIMEOUT, "slow"));

        assert_eq!(info, RetryInformation::none());
        assert_eq!(info.max_retries(), 0);
    }

    #[test]
    fn test_delay_for_attempt() {
        let mut registry = RetryDelayRegistry::new();
        registry.add(&INDEX_OUT_OF_RANGE, secs(&[1, 2])).unwrap();
        let info = registry.retry_information_for(&INDEX_OUT_OF_RANGE);

        assert_eq!(info.delay_for(0), Some(Duration::from_secs(1)));
        assert_eq!(info.delay_for(1), Some(Duration::from_secs(2)));
        assert_eq!(info.delay_for(2), None);
    }
}
