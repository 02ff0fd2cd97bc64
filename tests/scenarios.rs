//! Black-box scenarios exercising a `MessageTemplate`/`Protocol` pair
//! end to end, the way a test script built on this crate would.

use std::collections::VecDeque;
use std::time::Duration;

use matches::matches;
use protocol_templates::container::{Field, List, Struct};
use protocol_templates::field::{CharField, UIntField};
use protocol_templates::length::{LengthExpr, Size};
use protocol_templates::message::MessageTemplate;
use protocol_templates::net::Transport;
use protocol_templates::path::{ParamMap, ParamValue};
use protocol_templates::protocol::{HeaderField, PduField, Protocol, ProtocolError};
use protocol_templates::stream::{BufferedStream, Timeout};

fn greeting_template() -> MessageTemplate {
    let mut protocol = Protocol::new("Greeting");
    protocol
        .add(HeaderField::UInt(UIntField::new(2, "msgId".to_string(), ParamValue::Int(5))))
        .unwrap();
    protocol
        .add(HeaderField::UInt(UIntField {
            name: Some("length".to_string()),
            size: Size::literal(2),
            default: None,
        }))
        .unwrap();
    protocol
        .add(HeaderField::Pdu(PduField {
            expr: LengthExpr::parse("length-4").unwrap(),
        }))
        .unwrap();
    let mut t = MessageTemplate::new("Greeting", protocol);
    t.add(Field::UInt(UIntField::new(2, "field_1".to_string(), ParamValue::Int(1))));
    t.add(Field::UInt(UIntField::new(2, "field_2".to_string(), ParamValue::Int(2))));
    t
}

/// S1 — header + two body fields, default encode.
#[test]
fn s1_header_and_body_defaults() {
    let t = greeting_template();
    let message = t.encode(&ParamMap::new()).unwrap();
    assert_eq!(message.raw, vec![0x00, 0x05, 0x00, 0x08, 0x00, 0x01, 0x00, 0x02]);
    assert_eq!(message.header_field("msgId").unwrap().int(), Some(5));
    assert_eq!(message.header_field("length").unwrap().int(), Some(8));
}

/// S2 — decode with an overridden body.
#[test]
fn s2_decode_with_override() {
    let t = greeting_template();
    let decoded = t.decode(&[0x00, 0x05, 0x00, 0x08, 0xca, 0xfe, 0xba, 0xbe]).unwrap();
    assert_eq!(decoded.field("field_1").unwrap().hex().unwrap(), "0xcafe");
    assert_eq!(decoded.field("field_2").unwrap().hex().unwrap(), "0xbabe");
}

/// S3 — a dynamic-length primitive: each `Char` field's width comes from
/// the `UInt` field decoded immediately before it.
#[test]
fn s3_dynamic_length_primitive() {
    let protocol = Protocol::new("Dynamic");
    let mut t = MessageTemplate::new("Dynamic", protocol);
    t.add(Field::UInt(UIntField::new(1, "len".to_string(), ParamValue::Int(0))));
    t.add(Field::Char(CharField::new("len", "chars".to_string(), ParamValue::Str(String::new()))));
    t.add(Field::UInt(UIntField::new(1, "len2".to_string(), ParamValue::Int(0))));
    t.add(Field::Char(CharField::new("len2", "chars2".to_string(), ParamValue::Str(String::new()))));

    let decoded = t.decode(&[0x04, 0x61, 0x62, 0x63, 0x64, 0x02, 0x65, 0x66]).unwrap();
    assert_eq!(decoded.field("len").unwrap().int(), Some(4));
    assert_eq!(decoded.field("chars").unwrap().ascii().unwrap(), "abcd");
    assert_eq!(decoded.field("len2").unwrap().int(), Some(2));
    assert_eq!(decoded.field("chars2").unwrap().ascii().unwrap(), "ef");
}

/// S4 — a list of structs, overriding one element's field by index.
#[test]
fn s4_nested_list_of_structs() {
    let mut pair = Struct::new("Pair", "pair");
    pair.add(Field::UInt(UIntField::new(2, "first".to_string(), ParamValue::Int(1))));
    pair.add(Field::UInt(UIntField::new(2, "second".to_string(), ParamValue::Int(2))));
    let list = List::new(2, "liststruct".to_string(), Field::Struct(pair));

    let protocol = Protocol::new("ListOfPairs");
    let mut t = MessageTemplate::new("ListOfPairs", protocol);
    t.add(Field::List(list));

    let mut params = ParamMap::new();
    params.insert("liststruct[1].first".to_string(), ParamValue::Int(24));
    let message = t.encode(&params).unwrap();

    let decoded = t.decode(&message.raw).unwrap();
    let items = decoded.field("liststruct").unwrap();
    assert_eq!(items.at(0).unwrap().field("first").unwrap().int(), Some(1));
    assert_eq!(items.at(1).unwrap().field("first").unwrap().int(), Some(24));
}

/// S5 — validating a decoded message against a regex pattern.
#[test]
fn s5_validate_with_pattern() {
    let mut protocol = Protocol::new("Greeting");
    protocol
        .add(HeaderField::UInt(UIntField::new(2, "msgId".to_string(), ParamValue::Int(5))))
        .unwrap();
    protocol
        .add(HeaderField::UInt(UIntField {
            name: Some("length".to_string()),
            size: Size::literal(2),
            default: None,
        }))
        .unwrap();
    protocol
        .add(HeaderField::Pdu(PduField {
            expr: LengthExpr::parse("length-4").unwrap(),
        }))
        .unwrap();
    let mut t = MessageTemplate::new("Greeting", protocol);
    t.add(Field::UInt(UIntField::new(2, "field_1".to_string(), ParamValue::Int(1))));
    t.add(Field::UInt(UIntField::new(2, "field_2".to_string(), ParamValue::Str("0xbabe".to_string()))));

    let message = t.decode(&[0x00, 0x05, 0x00, 0x08, 0xca, 0xfe, 0x00, 0x02]).unwrap();

    let mut pass = ParamMap::new();
    pass.insert("field_2".to_string(), ParamValue::Str("(0|2)".to_string()));
    assert!(t.validate(&message, &pass).is_empty());

    let mut fail = ParamMap::new();
    fail.insert("field_2".to_string(), ParamValue::Str("(0|3)".to_string()));
    assert_eq!(t.validate(&message, &fail).len(), 1);
}

/// S6 — adding a PDU to a protocol with no undefaulted field to attach
/// to is an invariant violation, rejected at `add()` time.
#[test]
fn s6_pdu_needs_an_undefined_field() {
    let mut protocol = Protocol::new("Invalid");
    protocol
        .add(HeaderField::UInt(UIntField::new(2, "length".to_string(), ParamValue::Int(8))))
        .unwrap();
    let err = protocol.add(HeaderField::Pdu(PduField {
        expr: LengthExpr::parse("length").unwrap(),
    }));
    assert!(matches!(err, Err(ProtocolError::PduNeedsPrecedingField { .. })));
}

struct ChunkedTransport {
    chunks: VecDeque<Vec<u8>>,
}

impl Transport for ChunkedTransport {
    fn receive(&mut self, _timeout: Option<Duration>) -> std::io::Result<Vec<u8>> {
        Ok(self.chunks.pop_front().unwrap_or_default())
    }
}

/// End-to-end framing: a `BufferedStream` fed arbitrarily-chunked wire
/// bytes, `Protocol::get_message_stream` reassembling exactly one
/// message at a time, handed straight to `MessageTemplate::decode`.
#[test]
fn get_message_stream_feeds_message_template_decode() {
    let t = greeting_template();
    let transport = ChunkedTransport {
        chunks: VecDeque::from([vec![0x00, 0x05], vec![0x00, 0x08, 0xca], vec![0xfe, 0xba, 0xbe]]),
    };
    let mut stream = BufferedStream::new(transport);

    let raw = t
        .protocol
        .get_message_stream(&mut stream, Timeout::After(Duration::from_millis(100)))
        .unwrap();
    assert_eq!(raw, vec![0x00, 0x05, 0x00, 0x08, 0xca, 0xfe, 0xba, 0xbe]);

    let decoded = t.decode(&raw).unwrap();
    assert_eq!(decoded.field("field_1").unwrap().hex().unwrap(), "0xcafe");
    assert_eq!(decoded.field("field_2").unwrap().hex().unwrap(), "0xbabe");
}
