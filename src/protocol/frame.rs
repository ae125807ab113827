//! RESP Frame Structure
//!
//! Typed representation of RESP wire data and its byte encoding.

use bytes::{BufMut, Bytes, BytesMut};

/// Exact reply required for type mismatches, verbatim per the protocol.
pub const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

/// A single RESP value, either parsed off the wire or built as a reply.
///
/// Bulk payloads are binary safe and carried as [`Bytes`]; `NullBulk` and
/// `NullArray` are the `$-1`/`*-1` nil forms. `Plain` is a line that carried
/// no framing prefix, surfaced verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    NullBulk,
    Array(Vec<Frame>),
    NullArray,
    Plain(Bytes),
}

impl Frame {
    pub fn simple(s: impl Into<String>) -> Self {
        Frame::Simple(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        Frame::Error(s.into())
    }

    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Frame::Bulk(data.into())
    }

    /// `+OK` reply shared by many write commands.
    pub fn ok() -> Self {
        Frame::Simple("OK".to_string())
    }

    pub fn pong() -> Self {
        Frame::Simple("PONG".to_string())
    }

    pub fn wrong_type() -> Self {
        Frame::Error(WRONGTYPE.to_string())
    }

    pub fn unknown_command(verb: &str) -> Self {
        Frame::Error(format!("ERR unknown command {}", verb))
    }

    pub fn wrong_args(verb: &str) -> Self {
        Frame::Error(format!(
            "ERR wrong number of arguments for '{}' command",
            verb
        ))
    }

    pub fn syntax_error() -> Self {
        Frame::Error("ERR syntax error".to_string())
    }

    pub fn not_integer() -> Self {
        Frame::Error("ERR value is not an integer or out of range".to_string())
    }

    pub fn not_float() -> Self {
        Frame::Error("ERR value is not a valid float".to_string())
    }

    /// Interpret an array frame as a command: one binary-safe argument per
    /// element. Non-bulk elements are tolerated the way the wire surfaced
    /// them. Returns `None` for anything that is not an array.
    pub fn into_command(self) -> Option<Vec<Bytes>> {
        match self {
            Frame::Array(items) => {
                let mut argv = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Frame::Bulk(b) | Frame::Plain(b) => argv.push(b),
                        Frame::Simple(s) | Frame::Error(s) => argv.push(Bytes::from(s)),
                        Frame::Integer(n) => argv.push(Bytes::from(n.to_string())),
                        Frame::NullBulk => argv.push(Bytes::new()),
                        _ => return None,
                    }
                }
                Some(argv)
            }
            _ => None,
        }
    }

    /// Serialize into `dst`. The encoding is the exact dual of the decoder:
    /// `encode(decode(bytes)) == bytes` for any framed value.
    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            Frame::Simple(s) => {
                dst.put_u8(b'+');
                dst.put_slice(s.as_bytes());
                dst.put_slice(b"\r\n");
            }
            Frame::Error(s) => {
                dst.put_u8(b'-');
                dst.put_slice(s.as_bytes());
                dst.put_slice(b"\r\n");
            }
            Frame::Integer(n) => {
                dst.put_u8(b':');
                dst.put_slice(n.to_string().as_bytes());
                dst.put_slice(b"\r\n");
            }
            Frame::Bulk(data) => {
                dst.put_u8(b'$');
                dst.put_slice(data.len().to_string().as_bytes());
                dst.put_slice(b"\r\n");
                dst.put_slice(data);
                dst.put_slice(b"\r\n");
            }
            Frame::NullBulk => dst.put_slice(b"$-1\r\n"),
            Frame::Array(items) => {
                dst.put_u8(b'*');
                dst.put_slice(items.len().to_string().as_bytes());
                dst.put_slice(b"\r\n");
                for item in items {
                    item.encode(dst);
                }
            }
            Frame::NullArray => dst.put_slice(b"*-1\r\n"),
            Frame::Plain(data) => {
                dst.put_slice(data);
                dst.put_slice(b"\r\n");
            }
        }
    }

    /// Convenience for single replies outside the framed writer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_simple_and_error() {
        assert_eq!(Frame::ok().to_bytes().as_ref(), b"+OK\r\n");
        assert_eq!(
            Frame::error("ERR boom").to_bytes().as_ref(),
            b"-ERR boom\r\n"
        );
    }

    #[test]
    fn test_encode_integer() {
        assert_eq!(Frame::Integer(2).to_bytes().as_ref(), b":2\r\n");
        assert_eq!(Frame::Integer(-7).to_bytes().as_ref(), b":-7\r\n");
    }

    #[test]
    fn test_encode_bulk_binary_safe() {
        let frame = Frame::bulk(&b"a\r\nb\x00c"[..]);
        assert_eq!(frame.to_bytes().as_ref(), b"$7\r\na\r\nb\x00c\r\n");
        assert_eq!(Frame::NullBulk.to_bytes().as_ref(), b"$-1\r\n");
    }

    #[test]
    fn test_encode_array() {
        let frame = Frame::Array(vec![
            Frame::bulk(&b"message"[..]),
            Frame::bulk(&b"ch"[..]),
            Frame::Integer(1),
        ]);
        assert_eq!(
            frame.to_bytes().as_ref(),
            b"*3\r\n$7\r\nmessage\r\n$2\r\nch\r\n:1\r\n"
        );
        assert_eq!(Frame::NullArray.to_bytes().as_ref(), b"*-1\r\n");
        assert_eq!(Frame::Array(vec![]).to_bytes().as_ref(), b"*0\r\n");
    }

    #[test]
    fn test_into_command() {
        let frame = Frame::Array(vec![Frame::bulk(&b"GET"[..]), Frame::bulk(&b"k"[..])]);
        let argv = frame.into_command().unwrap();
        assert_eq!(argv.len(), 2);
        assert_eq!(argv[0].as_ref(), b"GET");
        assert!(Frame::Integer(1).into_command().is_none());
    }
}
