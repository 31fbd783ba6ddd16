//! Integration tests for the bitlink-core protocol layer.
//!
//! These tests feed raw serial chunks through the public API — [`LineBuffer`]
//! reassembly followed by [`parse_record`] — exercising the framing and the
//! record grammar together, the way the host engine consumes them.

use bitlink_core::{
    parse_record, Button, CommandReply, Gesture, LineBuffer, MicLevel, Pin, PinLevel, Record,
    RecordError,
};

/// Runs a sequence of chunks through a fresh buffer and parses every
/// completed line.
fn parse_chunks(chunks: &[&str]) -> Vec<Result<Record, RecordError>> {
    let mut buf = LineBuffer::new();
    chunks
        .iter()
        .flat_map(|chunk| buf.push_chunk(chunk))
        .map(|line| parse_record(&line))
        .collect()
}

#[test]
fn test_whole_line_and_split_line_parse_identically() {
    let whole = parse_chunks(&["button|a\n"]);
    let split = parse_chunks(&["but", "ton|a\n"]);
    assert_eq!(whole, split);
    assert_eq!(whole, vec![Ok(Record::Button(Button::A))]);
}

#[test]
fn test_byte_by_byte_delivery_parses_one_record() {
    let line = "gesture|face up\n";
    let chunks: Vec<String> = line.chars().map(String::from).collect();
    let chunk_refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
    assert_eq!(
        parse_chunks(&chunk_refs),
        vec![Ok(Record::Gesture(Gesture::FaceUp))]
    );
}

#[test]
fn test_coalesced_records_parse_in_arrival_order() {
    let records = parse_chunks(&["ok|5\npin|1|1\nmic|quiet\nmessage|hi\n"]);
    assert_eq!(
        records,
        vec![
            Ok(Record::Ok(vec!["5".to_string()])),
            Ok(Record::Pin {
                pin: Pin::P1,
                level: PinLevel::High,
            }),
            Ok(Record::Mic(MicLevel::Quiet)),
            Ok(Record::Message("hi".to_string())),
        ]
    );
}

#[test]
fn test_malformed_record_does_not_affect_neighbours() {
    let records = parse_chunks(&["button|a\nbutton|c\nbutton|b\n"]);
    assert_eq!(records.len(), 3);
    assert_eq!(records[0], Ok(Record::Button(Button::A)));
    assert_eq!(
        records[1],
        Err(RecordError::MalformedButton("c".to_string()))
    );
    assert_eq!(records[2], Ok(Record::Button(Button::B)));
}

#[test]
fn test_handshake_reply_split_mid_version_field() {
    let records = parse_chunks(&["hello|microbit|2.", "0.0|0.1\n"]);
    match &records[..] {
        [Ok(Record::Hello(hello))] => {
            assert_eq!(hello.board_type, "microbit");
            assert_eq!(hello.board_info.hardware_version, [2, 0, 0]);
            assert_eq!(hello.board_info.firmware_version, [0, 1]);
        }
        other => panic!("expected one hello record, got {other:?}"),
    }
}

#[test]
fn test_err_record_becomes_a_fault_value() {
    let records = parse_chunks(&["err|type|cannot parse arg\n"]);
    let fault = match &records[..] {
        [Ok(Record::Err(fault))] => fault.clone(),
        other => panic!("expected one err record, got {other:?}"),
    };
    // The fault travels to send() callers as a value, never a thrown error.
    let reply = CommandReply::Err(fault);
    assert!(!reply.is_ok());
    let fault = reply.into_result().unwrap_err();
    assert_eq!(fault.kind, "type");
    assert_eq!(fault.message, "cannot parse arg");
}

#[test]
fn test_unrecognized_tag_flows_through_as_unknown() {
    let records = parse_chunks(&["temperature|21\n"]);
    assert_eq!(
        records,
        vec![Ok(Record::Unknown("temperature".to_string()))]
    );
}
