//! Text framing: `Content-Length: N\r\n[<header>\r\n]*\r\n<N bytes JSON>`.
//!
//! Grounded on the teacher's own repeated hand-rolled implementation of
//! this exact framing (`src/dap/transport.rs::{StdioTransport,
//! TcpTransport}`, `src/dap/yadap/io.rs::DapIo`, `src/bin/bs_dap.rs::DapIo`)
//! and on `third_party/dap-rs/src/server.rs`'s state-machine shape, here
//! unified into one reader so every transport shares one implementation
//! instead of three copy-pasted ones.

use std::io::{BufRead, Write};

use serde::Serialize;
use serde_json::Value;

use crate::error::FramingError;

/// Reads one frame. Returns `Ok(None)` on a clean EOF at a frame
/// boundary, and also for an explicit `Content-Length: 0` header (spec
/// §4.1 testable property #12), matching the original adapter's
/// `read_message` behavior.
pub fn read_text_frame(reader: &mut (impl BufRead + ?Sized)) -> Result<Option<Value>, FramingError> {
    let mut content_length: Option<usize> = None;
    loop {
        let mut line = String::new();
        let read = reader.read_line(&mut line)?;
        if read == 0 {
            // EOF before any header byte: clean end of stream.
            if content_length.is_none() && line.is_empty() {
                return Ok(None);
            }
            return Err(FramingError::ShortRead);
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        if let Some(value) = trimmed.strip_prefix("Content-Length:") {
            let value = value.trim();
            let parsed: usize = value
                .parse()
                .map_err(|_| FramingError::MalformedContentLength(value.to_string()))?;
            content_length = Some(parsed);
        }
        // Other headers are accepted and ignored, per spec §4.1.
    }

    let len = content_length.ok_or(FramingError::ContentLengthMissing)?;
    if len == 0 {
        return Ok(None);
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    let value: Value = serde_json::from_slice(&buf)?;
    Ok(Some(value))
}

/// Writes one frame atomically (a single buffered write call per frame,
/// so concurrent writers never interleave headers and payloads —
/// spec §4.1 "Writers MUST issue each frame atomically").
pub fn write_text_frame(writer: &mut (impl Write + ?Sized), message: &impl Serialize) -> Result<(), FramingError> {
    let payload = serde_json::to_vec(message)?;
    let mut framed = Vec::with_capacity(payload.len() + 32);
    framed.extend_from_slice(format!("Content-Length: {}\r\n\r\n", payload.len()).as_bytes());
    framed.extend_from_slice(&payload);
    writer.write_all(&framed)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    fn roundtrip(value: &Value) -> Value {
        let mut buf = Vec::new();
        write_text_frame(&mut buf, value).unwrap();
        let mut cursor = Cursor::new(buf);
        read_text_frame(&mut cursor).unwrap().unwrap()
    }

    #[test]
    fn roundtrips_arbitrary_message() {
        let msg = json!({"seq": 1, "type": "request", "command": "initialize", "arguments": {}});
        assert_eq!(roundtrip(&msg), msg);
    }

    #[test]
    fn missing_content_length_errors() {
        let mut cursor = Cursor::new(b"X-Other: 1\r\n\r\n".to_vec());
        assert!(matches!(
            read_text_frame(&mut cursor),
            Err(FramingError::ContentLengthMissing)
        ));
    }

    #[test]
    fn malformed_content_length_errors() {
        let mut cursor = Cursor::new(b"Content-Length: not-a-number\r\n\r\n".to_vec());
        assert!(matches!(
            read_text_frame(&mut cursor),
            Err(FramingError::MalformedContentLength(_))
        ));
    }

    #[test]
    fn zero_length_content_length_returns_none() {
        let mut cursor = Cursor::new(b"Content-Length: 0\r\n\r\n".to_vec());
        assert!(read_text_frame(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn clean_eof_at_frame_boundary_is_none() {
        let mut cursor = Cursor::new(Vec::new());
        assert!(read_text_frame(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn short_read_mid_frame_errors() {
        let mut cursor = Cursor::new(b"Content-Length: 50\r\n\r\n{\"a\":1}".to_vec());
        assert!(matches!(
            read_text_frame(&mut cursor),
            Err(FramingError::ShortRead) | Err(FramingError::Io(_))
        ));
    }

    #[test]
    fn invalid_json_errors() {
        let mut cursor = Cursor::new(b"Content-Length: 7\r\n\r\nnotjson".to_vec());
        assert!(matches!(
            read_text_frame(&mut cursor),
            Err(FramingError::InvalidJson(_))
        ));
    }

    #[test]
    fn extra_headers_are_ignored() {
        let mut raw = Vec::new();
        raw.extend_from_slice(b"X-Foo: bar\r\n");
        let payload = b"{\"ok\":true}";
        raw.extend_from_slice(format!("Content-Length: {}\r\n\r\n", payload.len()).as_bytes());
        raw.extend_from_slice(payload);
        let mut cursor = Cursor::new(raw);
        let msg = read_text_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(msg, json!({"ok": true}));
    }
}
