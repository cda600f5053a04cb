//! Tests for serialization and typed handlers.

use super::*;
use crate::message::{MessageId, Timestamp};
use serde::Deserialize;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Resize {
    width: u32,
    height: u32,
}

fn received(body: &[u8], message_headers: MessageHeaders) -> ReceivedMessage {
    ReceivedMessage {
        message_id: MessageId::new("m-1"),
        correlation_id: None,
        body: Bytes::copy_from_slice(body),
        headers: message_headers,
        delivery_count: 1,
        enqueued_at: Timestamp::now(),
    }
}

#[test]
fn test_json_serializer_encodes_value() {
    let mut message_headers = MessageHeaders::new();

    let body = JsonSerializer
        .serialize(&Resize { width: 1, height: 2 }, &mut message_headers)
        .unwrap();

    assert_eq!(&body[..], br#"{"width":1,"height":2}"#);
}

#[test]
fn test_json_serializer_rejects_malformed_body() {
    let result: Result<Resize, _> = JsonSerializer.deserialize(b"{", &MessageHeaders::new());

    assert!(matches!(result, Err(SerializationError::JsonError(_))));
}

#[tokio::test]
async fn test_typed_handler_receives_decoded_value() {
    // Arrange
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handler = TypedHandler::new(JsonSerializer, move |value: Resize, _notification: WorkerNotification| {
        let sink = sink.clone();
        async move {
            sink.lock().unwrap().push(value);
            Ok::<(), ProcessingError>(())
        }
    });
    let mut message_headers = MessageHeaders::new();
    message_headers.insert(headers::MESSAGE_TYPE, message_type_name::<Resize>());

    // Act
    let result = handler
        .handle(
            &received(br#"{"width":3,"height":4}"#, message_headers),
            &WorkerNotification::default(),
        )
        .await;

    // Assert
    assert!(result.is_ok());
    assert_eq!(
        *seen.lock().unwrap(),
        vec![Resize {
            width: 3,
            height: 4
        }]
    );
}

#[tokio::test]
async fn test_typed_handler_reports_undecodable_body_as_poison() {
    let handler = TypedHandler::new(JsonSerializer, |_: Resize, _: WorkerNotification| async {
        Ok::<(), ProcessingError>(())
    });

    let result = handler
        .handle(&received(b"not json", MessageHeaders::new()), &WorkerNotification::default())
        .await;

    assert!(matches!(result, Err(ProcessingError::Poison(_))));
}

#[tokio::test]
async fn test_typed_handler_rejects_other_message_type() {
    let handler = TypedHandler::new(JsonSerializer, |_: Resize, _: WorkerNotification| async {
        Ok::<(), ProcessingError>(())
    });
    let mut message_headers = MessageHeaders::new();
    message_headers.insert(headers::MESSAGE_TYPE, "billing::Invoice");

    let result = handler
        .handle(
            &received(br#"{"width":3,"height":4}"#, message_headers),
            &WorkerNotification::default(),
        )
        .await;

    match result {
        Err(ProcessingError::Poison(poison)) => {
            assert!(poison.reason().contains("billing::Invoice"))
        }
        other => panic!("expected poison, got {:?}", other),
    }
}
