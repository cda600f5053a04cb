//! Tests for message types.

use super::*;

mod identifiers {
    use super::*;

    #[test]
    fn test_message_id_without_value() {
        let id = MessageId::none();

        assert!(!id.has_value());
        assert_eq!(id.as_str(), "");
        assert_eq!(id.to_string(), "<none>");
    }

    #[test]
    fn test_generated_message_ids_are_unique() {
        let first = MessageId::generate();
        let second = MessageId::generate();

        assert!(first.has_value());
        assert_ne!(first, second);
    }

    #[test]
    fn test_message_id_parse_rejects_empty() {
        assert!("".parse::<MessageId>().is_err());
        assert_eq!("abc".parse::<MessageId>().unwrap(), MessageId::new("abc"));
    }

    #[test]
    fn test_correlation_id_requires_value() {
        assert!(CorrelationId::new("").is_err());
        assert_eq!(CorrelationId::new("req-1").unwrap().as_str(), "req-1");
    }
}

mod timestamps {
    use super::*;

    #[test]
    fn test_add_and_sub_are_inverse() {
        let now = Timestamp::now();
        let later = now.add(Duration::from_secs(30));

        assert!(later > now);
        assert_eq!(later.sub(Duration::from_secs(30)), now);
        assert_eq!(later.duration_since(&now), Duration::from_secs(30));
    }

    #[test]
    fn test_duration_since_later_timestamp_is_zero() {
        let now = Timestamp::now();
        let later = now.add(Duration::from_secs(5));

        assert_eq!(now.duration_since(&later), Duration::ZERO);
    }

    #[test]
    fn test_huge_durations_saturate() {
        let now = Timestamp::now();
        let far = now.add(Duration::from_secs(u64::MAX));

        assert!(far > now);
    }

    #[test]
    fn test_rfc3339_text_parses_back() {
        let now = Timestamp::now();
        let text = now.as_datetime().to_rfc3339();

        assert_eq!(text.parse::<Timestamp>().unwrap(), now);
    }
}

mod message_headers {
    use super::*;

    #[test]
    fn test_well_known_headers_are_decoded() {
        // Arrange
        let expires = Timestamp::now().add(Duration::from_secs(60));
        let mut message_headers = MessageHeaders::new();
        message_headers.insert(headers::CORRELATION_ID, "req-7");
        message_headers.insert(headers::EXPIRATION, expires.as_datetime().to_rfc3339());

        // Act / Assert
        assert_eq!(
            message_headers.correlation_id(),
            Some(CorrelationId::new("req-7").unwrap())
        );
        assert_eq!(message_headers.expiration(), Some(expires));
    }

    #[test]
    fn test_invalid_expiration_is_ignored() {
        let message_headers: MessageHeaders =
            [(headers::EXPIRATION.to_string(), "tomorrow".to_string())]
                .into_iter()
                .collect();

        assert_eq!(message_headers.expiration(), None);
        assert!(message_headers.contains(headers::EXPIRATION));
    }
}

#[test]
fn test_message_builder() {
    let message = Message::new(Bytes::from_static(b"{}"))
        .with_header("tenant", "acme")
        .with_ttl(Duration::from_secs(10))
        .with_delay(Duration::from_secs(1));

    assert_eq!(message.headers.get("tenant"), Some("acme"));
    assert_eq!(message.time_to_live, Some(Duration::from_secs(10)));
    assert_eq!(message.delay, Some(Duration::from_secs(1)));
    assert!(message.correlation_id.is_none());
}
