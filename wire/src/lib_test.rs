use super::*;
use board::{BoardShape, Shape, ShapeOperation, UserLevel};
use uuid::Uuid;

fn sample_shape() -> BoardShape {
    let mut record = BoardShape::new(Shape::rectangle(1.0, 2.0, 30.0, 40.0), "alice", UserLevel::Low);
    record.id = Uuid::from_u128(7);
    record.created_at = 100;
    record.last_modified = 150;
    record
}

fn sample_envelope() -> Envelope {
    Envelope {
        shapes: vec![sample_shape()],
        op: Operation::Create,
        requester: "alice".to_owned(),
        checkpoint_number: 2,
        generation: 1,
        error: None,
    }
}

#[test]
fn encode_decode_round_trip_preserves_envelope() {
    let envelope = sample_envelope();
    let text = encode_envelope(&envelope).expect("encode");
    let decoded = decode_envelope(&text).expect("decode");
    assert_eq!(decoded, envelope);
}

#[test]
fn decode_ignores_unknown_fields() {
    let text = r#"{
        "shapes": [],
        "op": "clear_state",
        "requester": "admin",
        "checkpoint_number": 0,
        "generation": 4,
        "future_field": {"nested": true}
    }"#;
    let envelope = decode_envelope(text).expect("decode");
    assert_eq!(envelope.op, Operation::ClearState);
    assert_eq!(envelope.generation, 4);
}

#[test]
fn decode_defaults_missing_optional_fields() {
    let text = r#"{"op": "fetch_state", "requester": "bob"}"#;
    let envelope = decode_envelope(text).expect("decode");
    assert!(envelope.shapes.is_empty());
    assert_eq!(envelope.checkpoint_number, 0);
    assert_eq!(envelope.generation, 0);
}

#[test]
fn decode_rejects_malformed_text() {
    let err = decode_envelope("{not json").expect_err("malformed");
    assert!(matches!(err, CodecError::Json(_)));
}

#[test]
fn decode_rejects_unknown_operation() {
    let text = r#"{"op": "teleport", "requester": "bob"}"#;
    assert!(decode_envelope(text).is_err());
}

#[test]
fn operation_serializes_snake_case() {
    assert_eq!(
        serde_json::to_string(&Operation::FetchCheckpoint).expect("serialize"),
        "\"fetch_checkpoint\""
    );
    assert_eq!(
        serde_json::to_string(&Operation::ClearState).expect("serialize"),
        "\"clear_state\""
    );
}

#[test]
fn data_op_classification() {
    assert!(Operation::Create.is_data_op());
    assert!(Operation::Modify.is_data_op());
    assert!(Operation::Delete.is_data_op());
    assert!(!Operation::FetchState.is_data_op());
    assert!(!Operation::CreateCheckpoint.is_data_op());
    assert!(!Operation::ClearState.is_data_op());
    assert!(!Operation::Hello.is_data_op());
}

#[test]
fn hello_carries_the_connection_id_in_requester() {
    let envelope = Envelope::hello("8f14e45f-ceea-4b11-9dec-f7d1af0be6b1", 4);
    assert_eq!(envelope.op, Operation::Hello);
    assert_eq!(envelope.requester, "8f14e45f-ceea-4b11-9dec-f7d1af0be6b1");
    assert_eq!(envelope.generation, 4);
    assert!(envelope.shapes.is_empty());

    let decoded = decode_envelope(&encode_envelope(&envelope).expect("encode")).expect("decode");
    assert_eq!(decoded, envelope);
}

#[test]
fn shape_operation_maps_onto_wire_flag() {
    assert_eq!(Operation::from(ShapeOperation::Create), Operation::Create);
    assert_eq!(Operation::from(ShapeOperation::Modify), Operation::Modify);
    assert_eq!(Operation::from(ShapeOperation::Delete), Operation::Delete);
}

#[test]
fn data_envelope_mirrors_shape_tag() {
    let shape = sample_shape().with_operation(ShapeOperation::Delete);
    let envelope = Envelope::data(shape, "alice", 3);
    assert_eq!(envelope.op, Operation::Delete);
    assert_eq!(envelope.shapes.len(), 1);
    assert_eq!(envelope.generation, 3);
}

#[test]
fn error_field_is_omitted_when_absent() {
    let text = encode_envelope(&sample_envelope()).expect("encode");
    assert!(!text.contains("error"));
}

#[test]
fn rejection_carries_code_and_message() {
    struct Stale;
    impl std::fmt::Display for Stale {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "stale update")
        }
    }
    impl ErrorCode for Stale {
        fn error_code(&self) -> &'static str {
            "E_STALE_GENERATION"
        }
    }

    let envelope = Envelope::rejection(Operation::Modify, &Stale);
    let error = envelope.error.as_ref().expect("error info");
    assert_eq!(error.code, "E_STALE_GENERATION");
    assert_eq!(error.message, "stale update");

    let decoded = decode_envelope(&encode_envelope(&envelope).expect("encode")).expect("decode");
    assert_eq!(decoded, envelope);
}

#[test]
fn control_envelope_carries_no_shapes() {
    let envelope = Envelope::control(Operation::FetchState, "bob", 0).with_checkpoint_number(5);
    assert!(envelope.shapes.is_empty());
    assert_eq!(envelope.checkpoint_number, 5);
}
