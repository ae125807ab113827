//! RESP Codec for Tokio
//!
//! Implements Encoder and Decoder traits for framed I/O. The decoder is a
//! small per-connection state machine: array headers push onto a stack and
//! elements accumulate until the array completes, so a command arriving one
//! byte at a time still surfaces as a single frame.

use bytes::{Buf, BytesMut};
use std::io;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use super::frame::Frame;

/// Decode-side failures.
///
/// `Protocol` is recoverable: the offending line has been consumed and the
/// caller may answer with an error reply and keep reading. `Io` is fatal and
/// tears the connection down.
#[derive(Debug, Error)]
pub enum RespError {
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl RespError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RespError::Protocol(_))
    }
}

/// Largest accepted bulk payload, matching the widely deployed server.
pub const MAX_BULK_SIZE: i64 = 512 * 1024 * 1024;

/// Largest accepted element count for one array.
pub const MAX_ARRAY_LEN: i64 = 1024 * 1024;

/// Tokio codec for RESP frames.
#[derive(Debug, Default)]
pub struct RespCodec {
    /// Arrays still waiting for elements, innermost last.
    stack: Vec<(usize, Vec<Frame>)>,
}

impl RespCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

/// One parsing step: either a complete scalar value or an array header.
enum Step {
    Value(Frame),
    ArrayHeader(i64),
}

impl Decoder for RespCodec {
    type Item = Frame;
    type Error = RespError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, RespError> {
        loop {
            let step = match parse_step(src) {
                Ok(Some(step)) => step,
                Ok(None) => return Ok(None),
                Err(e) => {
                    // A malformed element invalidates any array in flight.
                    self.stack.clear();
                    return Err(e);
                }
            };

            let mut value = match step {
                Step::Value(frame) => frame,
                Step::ArrayHeader(-1) => Frame::NullArray,
                Step::ArrayHeader(0) => Frame::Array(Vec::new()),
                Step::ArrayHeader(n) => {
                    self.stack.push((n as usize, Vec::with_capacity(n as usize)));
                    continue;
                }
            };

            // Feed the value into enclosing arrays, completing them inward-out.
            loop {
                match self.stack.last_mut() {
                    None => return Ok(Some(value)),
                    Some((expect, items)) => {
                        items.push(value);
                        if items.len() == *expect {
                            let (_, items) = self.stack.pop().expect("non-empty stack");
                            value = Frame::Array(items);
                        } else {
                            break;
                        }
                    }
                }
            }
        }
    }
}

impl Encoder<Frame> for RespCodec {
    type Error = RespError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), RespError> {
        item.encode(dst);
        Ok(())
    }
}

/// Parse a single element off the front of `src`, consuming it only when it
/// is complete. Bulk payloads are read by exact byte length, never by
/// delimiter.
fn parse_step(src: &mut BytesMut) -> Result<Option<Step>, RespError> {
    if src.is_empty() {
        return Ok(None);
    }
    match src[0] {
        b'+' | b'-' | b':' => {
            let Some(end) = find_crlf(&src[1..]) else {
                return Ok(None);
            };
            let line = src.split_to(1 + end + 2);
            let body = &line[1..line.len() - 2];
            let step = match line[0] {
                b'+' => Step::Value(Frame::Simple(
                    String::from_utf8_lossy(body).into_owned(),
                )),
                b'-' => Step::Value(Frame::Error(
                    String::from_utf8_lossy(body).into_owned(),
                )),
                _ => Step::Value(Frame::Integer(parse_int(body)?)),
            };
            Ok(Some(step))
        }
        b'$' => {
            let Some(end) = find_crlf(&src[1..]) else {
                return Ok(None);
            };
            let len = match parse_int(&src[1..1 + end]) {
                Ok(n) if (-1..=MAX_BULK_SIZE).contains(&n) => n,
                _ => {
                    let line = src.split_to(1 + end + 2);
                    return Err(bad_frame(&line));
                }
            };
            if len == -1 {
                src.advance(1 + end + 2);
                return Ok(Some(Step::Value(Frame::NullBulk)));
            }
            let header = 1 + end + 2;
            let len = len as usize;
            let total = header + len + 2;
            if src.len() < total {
                return Ok(None);
            }
            if &src[header + len..total] != b"\r\n" {
                let line = src.split_to(total);
                return Err(bad_frame(&line));
            }
            let mut payload = src.split_to(total);
            payload.advance(header);
            payload.truncate(len);
            Ok(Some(Step::Value(Frame::Bulk(payload.freeze()))))
        }
        b'*' => {
            let Some(end) = find_crlf(&src[1..]) else {
                return Ok(None);
            };
            let n = match parse_int(&src[1..1 + end]) {
                Ok(n) if (-1..=MAX_ARRAY_LEN).contains(&n) => n,
                _ => {
                    let line = src.split_to(1 + end + 2);
                    return Err(bad_frame(&line));
                }
            };
            src.advance(1 + end + 2);
            Ok(Some(Step::ArrayHeader(n)))
        }
        _ => {
            // No framing prefix: surface the raw line verbatim.
            let Some(end) = find_crlf(src) else {
                return Ok(None);
            };
            let mut line = src.split_to(end + 2);
            line.truncate(end);
            Ok(Some(Step::Value(Frame::Plain(line.freeze()))))
        }
    }
}

fn parse_int(body: &[u8]) -> Result<i64, RespError> {
    std::str::from_utf8(body)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            RespError::Protocol(format!("invalid integer {:?}", String::from_utf8_lossy(body)))
        })
}

fn bad_frame(line: &[u8]) -> RespError {
    RespError::Protocol(format!(
        "stream message {:?} is invalid",
        String::from_utf8_lossy(line)
    ))
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn decode_all(codec: &mut RespCodec, buf: &mut BytesMut) -> Vec<Frame> {
        let mut out = Vec::new();
        while let Some(frame) = codec.decode(buf).unwrap() {
            out.push(frame);
        }
        out
    }

    #[test]
    fn test_decode_command_array() {
        let mut codec = RespCodec::new();
        let mut buf = BytesMut::from(&b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n"[..]);
        let frames = decode_all(&mut codec, &mut buf);
        assert_eq!(frames.len(), 1);
        let argv = frames.into_iter().next().unwrap().into_command().unwrap();
        assert_eq!(argv[0].as_ref(), b"SET");
        assert_eq!(argv[2].as_ref(), b"1");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_single_byte_fragments() {
        let mut codec = RespCodec::new();
        let wire = b"*2\r\n$4\r\nLPOP\r\n$1\r\nL\r\n";
        let mut buf = BytesMut::new();
        let mut seen = Vec::new();
        for &b in wire.iter() {
            buf.extend_from_slice(&[b]);
            if let Some(frame) = codec.decode(&mut buf).unwrap() {
                seen.push(frame);
            }
        }
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0],
            Frame::Array(vec![
                Frame::Bulk(Bytes::from_static(b"LPOP")),
                Frame::Bulk(Bytes::from_static(b"L")),
            ])
        );
    }

    #[test]
    fn test_decode_bulk_with_embedded_crlf() {
        let mut codec = RespCodec::new();
        let mut buf = BytesMut::from(&b"$7\r\na\r\nb\x00c\r\n"[..]);
        let frames = decode_all(&mut codec, &mut buf);
        assert_eq!(frames, vec![Frame::Bulk(Bytes::from_static(b"a\r\nb\x00c"))]);
    }

    #[test]
    fn test_decode_nil_forms() {
        let mut codec = RespCodec::new();
        let mut buf = BytesMut::from(&b"$-1\r\n*-1\r\n*0\r\n"[..]);
        let frames = decode_all(&mut codec, &mut buf);
        assert_eq!(
            frames,
            vec![Frame::NullBulk, Frame::NullArray, Frame::Array(vec![])]
        );
    }

    #[test]
    fn test_decode_nil_bulk_inside_array() {
        let mut codec = RespCodec::new();
        let mut buf = BytesMut::from(&b"*2\r\n$-1\r\n:5\r\n"[..]);
        let frames = decode_all(&mut codec, &mut buf);
        assert_eq!(
            frames,
            vec![Frame::Array(vec![Frame::NullBulk, Frame::Integer(5)])]
        );
    }

    #[test]
    fn test_decode_plain_line() {
        let mut codec = RespCodec::new();
        let mut buf = BytesMut::from(&b"hello there\r\n"[..]);
        let frames = decode_all(&mut codec, &mut buf);
        assert_eq!(frames, vec![Frame::Plain(Bytes::from_static(b"hello there"))]);
    }

    #[test]
    fn test_protocol_error_is_recoverable() {
        let mut codec = RespCodec::new();
        let mut buf = BytesMut::from(&b"$abc\r\n+OK\r\n"[..]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(err.is_recoverable());
        // The offending line was consumed; the stream continues.
        let frames = decode_all(&mut codec, &mut buf);
        assert_eq!(frames, vec![Frame::Simple("OK".to_string())]);
    }

    #[test]
    fn test_roundtrip() {
        let original = Frame::Array(vec![
            Frame::Simple("OK".into()),
            Frame::Error("ERR syntax error".into()),
            Frame::Integer(-42),
            Frame::Bulk(Bytes::from_static(b"payload")),
            Frame::NullBulk,
        ]);
        let mut codec = RespCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(original.clone(), &mut buf).unwrap();
        let wire = buf.clone();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, original);
        // And back out to the identical bytes.
        assert_eq!(decoded.to_bytes(), wire.freeze());
    }
}
