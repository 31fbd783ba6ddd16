//! Inbound record grammar for the debug-link serial protocol.
//!
//! Every complete line is `<tag>[|<arg>]*`.  Recognized tags:
//! `ok`, `err`, `button`, `gesture`, `pin`, `message`, `mic`, `hello`.
//! Unrecognized tags parse as [`Record::Unknown`] — they are ignored by the
//! engine, not rejected.
//!
//! Enumerated argument values are validated here so the engine can drop a
//! single malformed record without touching any other in-flight state.

use thiserror::Error;

use crate::domain::board::BoardInfo;

// ── Parse errors ──────────────────────────────────────────────────────────────

/// A recognized tag carrying an out-of-range or missing argument.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("malformed button event ('{0}')")]
    MalformedButton(String),
    #[error("malformed gesture event ('{0}')")]
    MalformedGesture(String),
    #[error("malformed pin event (pin: '{pin}', level: '{level}')")]
    MalformedPin { pin: String, level: String },
    #[error("malformed mic event (level: '{0}')")]
    MalformedMic(String),
    #[error("malformed hello reply: {0}")]
    MalformedHello(String),
}

// ── Enumerated event arguments ────────────────────────────────────────────────

/// Physical buttons on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    A,
    B,
    Logo,
}

impl Button {
    pub fn as_str(&self) -> &'static str {
        match self {
            Button::A => "a",
            Button::B => "b",
            Button::Logo => "logo",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "a" => Some(Button::A),
            "b" => Some(Button::B),
            "logo" => Some(Button::Logo),
            _ => None,
        }
    }
}

/// Accelerometer gestures reported by the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    Down,
    FaceDown,
    FaceUp,
    Left,
    Right,
    Shake,
    Up,
}

impl Gesture {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gesture::Down => "down",
            Gesture::FaceDown => "face down",
            Gesture::FaceUp => "face up",
            Gesture::Left => "left",
            Gesture::Right => "right",
            Gesture::Shake => "shake",
            Gesture::Up => "up",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "down" => Some(Gesture::Down),
            "face down" => Some(Gesture::FaceDown),
            "face up" => Some(Gesture::FaceUp),
            "left" => Some(Gesture::Left),
            "right" => Some(Gesture::Right),
            "shake" => Some(Gesture::Shake),
            "up" => Some(Gesture::Up),
            _ => None,
        }
    }
}

/// Touch pins exposed on the board edge connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pin {
    P0,
    P1,
    P2,
}

impl Pin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pin::P0 => "0",
            Pin::P1 => "1",
            Pin::P2 => "2",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "0" => Some(Pin::P0),
            "1" => Some(Pin::P1),
            "2" => Some(Pin::P2),
            _ => None,
        }
    }
}

/// Logic level of a pin event: `0` is low, `1` is high.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinLevel {
    Low,
    High,
}

impl PinLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PinLevel::Low => "low",
            PinLevel::High => "high",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "0" => Some(PinLevel::Low),
            "1" => Some(PinLevel::High),
            _ => None,
        }
    }
}

/// Microphone loudness classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicLevel {
    Quiet,
    Loud,
}

impl MicLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MicLevel::Quiet => "quiet",
            MicLevel::Loud => "loud",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "quiet" => Some(MicLevel::Quiet),
            "loud" => Some(MicLevel::Loud),
            _ => None,
        }
    }
}

// ── Command replies ───────────────────────────────────────────────────────────

/// Structured error carried by an `err` reply.
///
/// This is a *value* handed to the `send()` caller, never a thrown error:
/// callers inspect the kind and decide the response themselves.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct BoardFault {
    /// Error class reported by the firmware (first `err` argument).
    pub kind: String,
    /// Human-readable detail (second `err` argument).
    pub message: String,
}

/// Outcome of one correlated command: the reply's argument list on `ok`, a
/// [`BoardFault`] on `err`.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandReply {
    Ok(Vec<String>),
    Err(BoardFault),
}

impl CommandReply {
    pub fn is_ok(&self) -> bool {
        matches!(self, CommandReply::Ok(_))
    }

    /// Converts into a `Result` for callers that treat a fault as fatal.
    pub fn into_result(self) -> Result<Vec<String>, BoardFault> {
        match self {
            CommandReply::Ok(args) => Ok(args),
            CommandReply::Err(fault) => Err(fault),
        }
    }
}

// ── Handshake reply ───────────────────────────────────────────────────────────

/// Parsed `hello` reply: `hello|<board-type>|<h0.h1.h2>|<f0.f1>`.
///
/// The board-type literal is carried through unchecked; verifying it against
/// the expected board family is the engine's contract, not the parser's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloRecord {
    pub board_type: String,
    pub board_info: BoardInfo,
}

// ── Record ────────────────────────────────────────────────────────────────────

/// One complete inbound line, classified by tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// Successful reply to the oldest in-flight command.
    Ok(Vec<String>),
    /// Error reply to the oldest in-flight command.
    Err(BoardFault),
    Button(Button),
    Gesture(Gesture),
    Pin { pin: Pin, level: PinLevel },
    /// Application-level message payload from the running program.
    Message(String),
    Mic(MicLevel),
    /// Handshake reply.
    Hello(HelloRecord),
    /// Unrecognized tag; ignored, not rejected.
    Unknown(String),
}

/// Parses one complete line (without its newline) into a [`Record`].
///
/// # Errors
///
/// Returns [`RecordError`] when a recognized tag carries an out-of-range or
/// missing argument; the caller is expected to log and drop that single
/// record.
pub fn parse_record(line: &str) -> Result<Record, RecordError> {
    let mut fields = line.split('|');
    // `split` always yields at least one item, even for an empty line.
    let tag = fields.next().unwrap_or_default();
    let args: Vec<&str> = fields.collect();

    match tag {
        "ok" => Ok(Record::Ok(args.iter().map(|a| a.to_string()).collect())),
        "err" => Ok(Record::Err(BoardFault {
            kind: args.first().unwrap_or(&"").to_string(),
            message: args.get(1).unwrap_or(&"").to_string(),
        })),
        "button" => {
            let raw = args.first().copied().unwrap_or_default();
            Button::parse(raw)
                .map(Record::Button)
                .ok_or_else(|| RecordError::MalformedButton(raw.to_string()))
        }
        "gesture" => {
            let raw = args.first().copied().unwrap_or_default();
            Gesture::parse(raw)
                .map(Record::Gesture)
                .ok_or_else(|| RecordError::MalformedGesture(raw.to_string()))
        }
        "pin" => {
            let pin_raw = args.first().copied().unwrap_or_default();
            let level_raw = args.get(1).copied().unwrap_or_default();
            match (Pin::parse(pin_raw), PinLevel::parse(level_raw)) {
                (Some(pin), Some(level)) => Ok(Record::Pin { pin, level }),
                _ => Err(RecordError::MalformedPin {
                    pin: pin_raw.to_string(),
                    level: level_raw.to_string(),
                }),
            }
        }
        "message" => Ok(Record::Message(
            args.first().unwrap_or(&"").to_string(),
        )),
        "mic" => {
            let raw = args.first().copied().unwrap_or_default();
            MicLevel::parse(raw)
                .map(Record::Mic)
                .ok_or_else(|| RecordError::MalformedMic(raw.to_string()))
        }
        "hello" => parse_hello(&args),
        other => Ok(Record::Unknown(other.to_string())),
    }
}

fn parse_hello(args: &[&str]) -> Result<Record, RecordError> {
    let board_type = args
        .first()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| RecordError::MalformedHello("missing board type".to_string()))?
        .to_string();
    let hardware_version = args
        .get(1)
        .and_then(|v| parse_version::<3>(v))
        .ok_or_else(|| {
            RecordError::MalformedHello(format!(
                "bad hardware version '{}'",
                args.get(1).unwrap_or(&"")
            ))
        })?;
    let firmware_version = args
        .get(2)
        .and_then(|v| parse_version::<2>(v))
        .ok_or_else(|| {
            RecordError::MalformedHello(format!(
                "bad firmware version '{}'",
                args.get(2).unwrap_or(&"")
            ))
        })?;

    Ok(Record::Hello(HelloRecord {
        board_type,
        board_info: BoardInfo {
            hardware_version,
            firmware_version,
        },
    }))
}

/// Parses exactly `N` period-separated integers.
fn parse_version<const N: usize>(value: &str) -> Option<[u32; N]> {
    let mut out = [0u32; N];
    let mut parts = value.split('.');
    for slot in &mut out {
        *slot = parts.next()?.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(out)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_reply_carries_argument_list() {
        assert_eq!(
            parse_record("ok|21|5").unwrap(),
            Record::Ok(vec!["21".to_string(), "5".to_string()])
        );
        assert_eq!(parse_record("ok").unwrap(), Record::Ok(vec![]));
    }

    #[test]
    fn test_err_reply_carries_kind_and_message() {
        let record = parse_record("err|value|pin must be 0-2").unwrap();
        assert_eq!(
            record,
            Record::Err(BoardFault {
                kind: "value".to_string(),
                message: "pin must be 0-2".to_string(),
            })
        );
    }

    #[test]
    fn test_err_reply_with_missing_args_defaults_to_empty_fields() {
        let record = parse_record("err").unwrap();
        assert_eq!(
            record,
            Record::Err(BoardFault {
                kind: String::new(),
                message: String::new(),
            })
        );
    }

    #[test]
    fn test_button_event_accepts_each_named_button() {
        assert_eq!(parse_record("button|a").unwrap(), Record::Button(Button::A));
        assert_eq!(parse_record("button|b").unwrap(), Record::Button(Button::B));
        assert_eq!(
            parse_record("button|logo").unwrap(),
            Record::Button(Button::Logo)
        );
    }

    #[test]
    fn test_button_event_rejects_out_of_range_value() {
        assert_eq!(
            parse_record("button|c"),
            Err(RecordError::MalformedButton("c".to_string()))
        );
        assert_eq!(
            parse_record("button"),
            Err(RecordError::MalformedButton(String::new()))
        );
    }

    #[test]
    fn test_gesture_event_accepts_the_fixed_seven_values() {
        for (raw, gesture) in [
            ("down", Gesture::Down),
            ("face down", Gesture::FaceDown),
            ("face up", Gesture::FaceUp),
            ("left", Gesture::Left),
            ("right", Gesture::Right),
            ("shake", Gesture::Shake),
            ("up", Gesture::Up),
        ] {
            assert_eq!(
                parse_record(&format!("gesture|{raw}")).unwrap(),
                Record::Gesture(gesture)
            );
        }
    }

    #[test]
    fn test_gesture_event_rejects_unknown_value() {
        assert_eq!(
            parse_record("gesture|twirl"),
            Err(RecordError::MalformedGesture("twirl".to_string()))
        );
    }

    #[test]
    fn test_pin_event_parses_id_and_level() {
        assert_eq!(
            parse_record("pin|0|1").unwrap(),
            Record::Pin {
                pin: Pin::P0,
                level: PinLevel::High,
            }
        );
        assert_eq!(
            parse_record("pin|2|0").unwrap(),
            Record::Pin {
                pin: Pin::P2,
                level: PinLevel::Low,
            }
        );
    }

    #[test]
    fn test_pin_event_rejects_bad_id_or_level() {
        assert!(matches!(
            parse_record("pin|3|1"),
            Err(RecordError::MalformedPin { .. })
        ));
        assert!(matches!(
            parse_record("pin|1|2"),
            Err(RecordError::MalformedPin { .. })
        ));
        assert!(matches!(
            parse_record("pin|1"),
            Err(RecordError::MalformedPin { .. })
        ));
    }

    #[test]
    fn test_message_event_carries_payload_verbatim() {
        assert_eq!(
            parse_record("message|score 42").unwrap(),
            Record::Message("score 42".to_string())
        );
    }

    #[test]
    fn test_message_event_without_payload_is_empty_string() {
        assert_eq!(parse_record("message").unwrap(), Record::Message(String::new()));
    }

    #[test]
    fn test_mic_event_accepts_quiet_and_loud() {
        assert_eq!(parse_record("mic|quiet").unwrap(), Record::Mic(MicLevel::Quiet));
        assert_eq!(parse_record("mic|loud").unwrap(), Record::Mic(MicLevel::Loud));
    }

    #[test]
    fn test_mic_event_rejects_unknown_level() {
        assert_eq!(
            parse_record("mic|deafening"),
            Err(RecordError::MalformedMic("deafening".to_string()))
        );
    }

    #[test]
    fn test_hello_reply_parses_versions() {
        let record = parse_record("hello|microbit|2.0.0|0.1").unwrap();
        assert_eq!(
            record,
            Record::Hello(HelloRecord {
                board_type: "microbit".to_string(),
                board_info: BoardInfo {
                    hardware_version: [2, 0, 0],
                    firmware_version: [0, 1],
                },
            })
        );
    }

    #[test]
    fn test_hello_reply_preserves_foreign_board_type() {
        // Identity checking belongs to the engine; the parser carries the
        // claimed type through.
        let record = parse_record("hello|calliope|1.0.0|0.9").unwrap();
        match record {
            Record::Hello(hello) => assert_eq!(hello.board_type, "calliope"),
            other => panic!("expected hello record, got {other:?}"),
        }
    }

    #[test]
    fn test_hello_reply_rejects_malformed_versions() {
        assert!(matches!(
            parse_record("hello|microbit|2.0|0.1"),
            Err(RecordError::MalformedHello(_))
        ));
        assert!(matches!(
            parse_record("hello|microbit|2.0.0|0.1.7"),
            Err(RecordError::MalformedHello(_))
        ));
        assert!(matches!(
            parse_record("hello|microbit|two.0.0|0.1"),
            Err(RecordError::MalformedHello(_))
        ));
        assert!(matches!(
            parse_record("hello|microbit"),
            Err(RecordError::MalformedHello(_))
        ));
        assert!(matches!(
            parse_record("hello"),
            Err(RecordError::MalformedHello(_))
        ));
    }

    #[test]
    fn test_unrecognized_tag_parses_as_unknown() {
        assert_eq!(
            parse_record("compass|north").unwrap(),
            Record::Unknown("compass".to_string())
        );
        assert_eq!(parse_record("").unwrap(), Record::Unknown(String::new()));
    }

    #[test]
    fn test_command_reply_into_result() {
        assert_eq!(
            CommandReply::Ok(vec!["1".to_string()]).into_result(),
            Ok(vec!["1".to_string()])
        );
        let fault = BoardFault {
            kind: "type".to_string(),
            message: "bad arg".to_string(),
        };
        assert_eq!(
            CommandReply::Err(fault.clone()).into_result(),
            Err(fault)
        );
    }

    #[test]
    fn test_board_fault_displays_kind_and_message() {
        let fault = BoardFault {
            kind: "value".to_string(),
            message: "unknown image".to_string(),
        };
        assert_eq!(fault.to_string(), "value: unknown image");
    }
}
