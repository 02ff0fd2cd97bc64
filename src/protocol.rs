//! The message header: an ordered sequence of fields with at most one
//! PDU placeholder, splitting the header into a prefix (encoded before
//! the body) and a suffix (encoded after it, e.g. a trailing checksum).

use snafu::{ensure, Backtrace, OptionExt, ResultExt, Snafu};

use crate::field::{CharField, FieldError, UIntField};
use crate::length::{LengthExpr, Siblings};
use crate::net::Transport;
use crate::path::ParamMap;
use crate::stream::{BufferedStream, StreamError, Timeout};
use crate::value::Value;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum ProtocolError {
    #[snafu(display("protocol may declare at most one PDU field"))]
    MultiplePdu { backtrace: Backtrace },

    #[snafu(display("PDU expression references `{}`, which must be an earlier field with no default", name))]
    PduNeedsPrecedingField { name: String, backtrace: Backtrace },

    #[snafu(display("failed to encode header field `{}`", name))]
    EncodeField { name: String, source: FieldError },

    #[snafu(display("failed to decode header field `{}`", name))]
    DecodeField { name: String, source: FieldError },

    #[snafu(display("could not resolve header length"))]
    HeaderLength,

    #[snafu(display("PDU references `{}`, but it was not decoded before the PDU marker", name))]
    UnresolvedPduReference { name: String },

    #[snafu(display("failed to read a full message from the stream"))]
    Stream { source: StreamError },
}

pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// The PDU placeholder: not encoded itself, it marks the point in the
/// header where an earlier, still-undefined field gets its value from
/// the body's encoded length.
#[derive(Debug, Clone)]
pub struct PduField {
    pub expr: LengthExpr,
}

/// One entry of the header's field sequence.
#[derive(Debug, Clone)]
pub enum HeaderField {
    UInt(UIntField),
    Char(CharField),
    Pdu(PduField),
}

impl HeaderField {
    pub fn name(&self) -> Option<&str> {
        match self {
            HeaderField::UInt(f) => f.name.as_deref(),
            HeaderField::Char(f) => f.name.as_deref(),
            HeaderField::Pdu(_) => None,
        }
    }

    pub fn effective_name(&self) -> &str {
        self.name().unwrap_or("")
    }

    fn has_default(&self) -> bool {
        match self {
            HeaderField::UInt(f) => f.default.is_some(),
            HeaderField::Char(f) => f.default.is_some(),
            HeaderField::Pdu(_) => true,
        }
    }

    fn byte_size(&self, siblings: &Siblings) -> Option<usize> {
        match self {
            HeaderField::UInt(f) => f.size.resolve(siblings).ok(),
            HeaderField::Char(f) => f.size.resolve(siblings).ok(),
            HeaderField::Pdu(_) => Some(0),
        }
    }
}

/// The fixed header layout of a message family.
#[derive(Debug, Clone, Default)]
pub struct Protocol {
    pub name: String,
    pub fields: Vec<HeaderField>,
}

impl Protocol {
    pub fn new(name: impl Into<String>) -> Self {
        Protocol {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a header field, enforcing the "at most one PDU" and
    /// "PDU references an earlier, still-undefined field" invariants
    /// at the point of insertion.
    pub fn add(&mut self, field: HeaderField) -> Result<&mut Self> {
        if let HeaderField::Pdu(pdu) = &field {
            ensure!(!self.fields.iter().any(|f| matches!(f, HeaderField::Pdu(_))), MultiplePduSnafu);
            let reference_ok = self
                .fields
                .iter()
                .any(|f| f.effective_name() == pdu.expr.reference && !f.has_default());
            ensure!(
                reference_ok,
                PduNeedsPrecedingFieldSnafu {
                    name: pdu.expr.reference.clone(),
                }
            );
        }
        self.fields.push(field);
        Ok(self)
    }

    fn pdu_index(&self) -> Option<usize> {
        self.fields.iter().position(|f| matches!(f, HeaderField::Pdu(_)))
    }

    fn pdu(&self) -> Option<&PduField> {
        self.fields.iter().find_map(|f| match f {
            HeaderField::Pdu(p) => Some(p),
            _ => None,
        })
    }

    /// Byte length of the header fields preceding the PDU placeholder
    /// (the PDU itself contributes 0; fields after it are the footer
    /// and are not part of `header_length`).
    pub fn header_length(&self, siblings: &Siblings) -> Result<usize> {
        let end = self.pdu_index().unwrap_or(self.fields.len());
        self.fields[..end]
            .iter()
            .map(|f| f.byte_size(siblings).context(HeaderLengthSnafu))
            .sum()
    }

    /// Encode the header, given the already-known encoded body length.
    /// Returns `(prefix, suffix)`: `prefix` is written before the body,
    /// `suffix` after it.
    pub fn encode(&self, params: &ParamMap, siblings: &mut Siblings, body_len: u64) -> Result<(Vec<u8>, Vec<u8>)> {
        let pdu = self.pdu().cloned();
        let mut prefix = Vec::new();
        let mut suffix = Vec::new();
        let mut past_pdu = false;
        for field in &self.fields {
            match field {
                HeaderField::Pdu(_) => past_pdu = true,
                HeaderField::UInt(f) => {
                    let is_deferred = f.default.is_none()
                        && pdu.as_ref().map(|p| p.expr.reference == f.effective_name()).unwrap_or(false);
                    let bytes = if is_deferred {
                        let size = f.size.resolve(siblings).ok().context(HeaderLengthSnafu)?;
                        let value = pdu.as_ref().unwrap().expr.field_value_from_body_len(body_len);
                        siblings.set(f.effective_name(), value);
                        value.to_be_bytes()[8 - size..].to_vec()
                    } else {
                        f.encode(params, siblings).context(EncodeFieldSnafu {
                            name: f.effective_name().to_string(),
                        })?
                    };
                    if past_pdu {
                        suffix.extend(bytes);
                    } else {
                        prefix.extend(bytes);
                    }
                }
                HeaderField::Char(f) => {
                    let bytes = f.encode(params, siblings).context(EncodeFieldSnafu {
                        name: f.effective_name().to_string(),
                    })?;
                    if past_pdu {
                        suffix.extend(bytes);
                    } else {
                        prefix.extend(bytes);
                    }
                }
            }
        }
        Ok((prefix, suffix))
    }

    /// Decode every field up to (but not including) the PDU marker,
    /// returning the decoded children, the byte offset past the prefix,
    /// and the body length the PDU's reference field implies (`None` if
    /// the protocol declares no PDU, in which case the body runs to
    /// end-of-input).
    pub fn decode_prefix(&self, bytes: &[u8], siblings: &mut Siblings) -> Result<(Vec<(String, Value)>, usize, Option<u64>)> {
        let mut offset = 0;
        let mut children = Vec::new();
        for field in &self.fields {
            match field {
                HeaderField::Pdu(pdu) => {
                    let field_value = siblings
                        .get(&pdu.expr.reference)
                        .context(UnresolvedPduReferenceSnafu {
                            name: pdu.expr.reference.clone(),
                        })?;
                    let body_len = pdu.expr.body_len_from_field_value(field_value);
                    return Ok((children, offset, Some(body_len)));
                }
                HeaderField::UInt(f) => {
                    let (value, consumed) = f.decode(&bytes[offset..], siblings).context(DecodeFieldSnafu {
                        name: f.effective_name().to_string(),
                    })?;
                    offset += consumed;
                    children.push((f.effective_name().to_string(), value));
                }
                HeaderField::Char(f) => {
                    let (value, consumed) = f.decode(&bytes[offset..], siblings).context(DecodeFieldSnafu {
                        name: f.effective_name().to_string(),
                    })?;
                    offset += consumed;
                    children.push((f.effective_name().to_string(), value));
                }
            }
        }
        Ok((children, offset, None))
    }

    /// Byte length of the header fields declared after the PDU marker
    /// (the footer, e.g. a trailing checksum), resolved against whatever
    /// sibling values are already known.
    fn footer_length(&self, siblings: &Siblings) -> Result<usize> {
        let Some(index) = self.pdu_index() else {
            return Ok(0);
        };
        self.fields[index + 1..]
            .iter()
            .map(|f| f.byte_size(siblings).context(HeaderLengthSnafu))
            .sum()
    }

    /// Read exactly one full message's worth of bytes off `stream`: the
    /// header prefix (`header_length()` bytes), then — once the prefix
    /// reveals the PDU body length — the body, then the footer. The
    /// concatenation is what [`crate::message::MessageTemplate::decode`]
    /// expects.
    pub fn get_message_stream<T: Transport>(&self, stream: &mut BufferedStream<T>, timeout: Timeout) -> Result<Vec<u8>> {
        let mut siblings = Siblings::new();
        let prefix_len = self.header_length(&siblings)?;
        let prefix = stream.read(prefix_len, timeout).context(StreamSnafu)?;

        let (_, _, body_len) = self.decode_prefix(&prefix, &mut siblings)?;
        let body = match body_len {
            Some(len) => stream.read(len as usize, timeout).context(StreamSnafu)?,
            None => Vec::new(),
        };

        let footer_len = self.footer_length(&siblings)?;
        let footer = stream.read(footer_len, timeout).context(StreamSnafu)?;

        let mut message = prefix;
        message.extend(body);
        message.extend(footer);
        Ok(message)
    }

    /// Decode any header fields declared after the PDU marker (the
    /// footer, e.g. a trailing checksum).
    pub fn decode_suffix(&self, bytes: &[u8], siblings: &mut Siblings) -> Result<(Vec<(String, Value)>, usize)> {
        let Some(index) = self.pdu_index() else {
            return Ok((Vec::new(), 0));
        };
        let mut offset = 0;
        let mut children = Vec::new();
        for field in &self.fields[index + 1..] {
            match field {
                HeaderField::Pdu(_) => unreachable!("at most one PDU per protocol"),
                HeaderField::UInt(f) => {
                    let (value, consumed) = f.decode(&bytes[offset..], siblings).context(DecodeFieldSnafu {
                        name: f.effective_name().to_string(),
                    })?;
                    offset += consumed;
                    children.push((f.effective_name().to_string(), value));
                }
                HeaderField::Char(f) => {
                    let (value, consumed) = f.decode(&bytes[offset..], siblings).context(DecodeFieldSnafu {
                        name: f.effective_name().to_string(),
                    })?;
                    offset += consumed;
                    children.push((f.effective_name().to_string(), value));
                }
            }
        }
        Ok((children, offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::length::Size;
    use crate::path::ParamValue;

    fn s1_protocol() -> Protocol {
        let mut p = Protocol::new("TestProtocol");
        p.add(HeaderField::UInt(UIntField::new(2, "msgId".to_string(), ParamValue::Int(5))))
            .unwrap();
        p.add(HeaderField::UInt(UIntField { name: Some("length".into()), size: Size::literal(2), default: None }))
            .unwrap();
        p.add(HeaderField::Pdu(PduField { expr: LengthExpr::parse("length-4").unwrap() }))
            .unwrap();
        p
    }

    #[test]
    fn pdu_needs_undefaulted_reference() {
        let mut p = Protocol::new("TestProtocol");
        p.add(HeaderField::UInt(UIntField::new(2, "msgId".to_string(), ParamValue::Int(5))))
            .unwrap();
        let err = p.add(HeaderField::Pdu(PduField { expr: LengthExpr::parse("length").unwrap() }));
        assert!(matches!(err, Err(ProtocolError::PduNeedsPrecedingField { .. })));
    }

    #[test]
    fn pdu_rejects_second_declaration() {
        let mut p = s1_protocol();
        let err = p.add(HeaderField::Pdu(PduField { expr: LengthExpr::parse("length").unwrap() }));
        assert!(matches!(err, Err(ProtocolError::MultiplePdu { .. })));
    }

    #[test]
    fn header_length_excludes_pdu_and_footer() {
        let p = s1_protocol();
        assert_eq!(p.header_length(&Siblings::new()).unwrap(), 4);
    }

    #[test]
    fn s1_header_prefix_matches_scenario() {
        let p = s1_protocol();
        let mut siblings = Siblings::new();
        let (prefix, suffix) = p.encode(&ParamMap::new(), &mut siblings, 4).unwrap();
        assert_eq!(prefix, vec![0x00, 0x05, 0x00, 0x08]);
        assert!(suffix.is_empty());
    }

    #[test]
    fn s1_header_decode_recovers_body_len() {
        let p = s1_protocol();
        let mut siblings = Siblings::new();
        let (children, offset, body_len) = p.decode_prefix(&[0x00, 0x05, 0x00, 0x08], &mut siblings).unwrap();
        assert_eq!(offset, 4);
        assert_eq!(body_len, Some(4));
        assert_eq!(children[0].1.int(), Some(5));
        assert_eq!(children[1].1.int(), Some(8));
    }

    struct FakeTransport {
        chunks: std::collections::VecDeque<Vec<u8>>,
    }

    impl Transport for FakeTransport {
        fn receive(&mut self, _timeout: Option<std::time::Duration>) -> std::io::Result<Vec<u8>> {
            Ok(self.chunks.pop_front().unwrap_or_default())
        }
    }

    #[test]
    fn get_message_stream_frames_one_message_off_the_wire() {
        let p = s1_protocol();
        // Two full S1 messages back to back, split across arbitrary chunk
        // boundaries, to exercise BufferedStream reassembly.
        let transport = FakeTransport {
            chunks: std::collections::VecDeque::from([
                vec![0x00, 0x05, 0x00],
                vec![0x08, 0x00, 0x01, 0x00, 0x02, 0x00, 0x05, 0x00, 0x08],
                vec![0x00, 0x01, 0x00, 0x02],
            ]),
        };
        let mut stream = BufferedStream::new(transport);
        let timeout = Timeout::After(std::time::Duration::from_millis(100));

        let first = p.get_message_stream(&mut stream, timeout).unwrap();
        assert_eq!(first, vec![0x00, 0x05, 0x00, 0x08, 0x00, 0x01, 0x00, 0x02]);

        let second = p.get_message_stream(&mut stream, timeout).unwrap();
        assert_eq!(second, vec![0x00, 0x05, 0x00, 0x08, 0x00, 0x01, 0x00, 0x02]);
    }
}
