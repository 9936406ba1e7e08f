//! Wire-level RESP request decoding for live connections (§4.G input).
//!
//! Distinct from `aof::read_resp_array`, which parses the same `*N`/`$len`
//! shape synchronously off disk: this one reads off an async socket and
//! additionally accepts the inline-command form real clients sometimes use
//! (a bare line with no `*`/`$` framing, e.g. `PING\r\n` typed by hand over
//! telnet), the way the teacher's `net.rs` request reader does.

use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::AofError;

/// Reads one command's argv off `reader`. Returns `Ok(None)` on a clean EOF
/// between commands (the connection closed tidily). A malformed frame is
/// reported as `AofError::Corrupt` — reused here rather than inventing a
/// second "this stream is malformed" error type, since the shape of the
/// failure is the same one replay already has to handle.
pub async fn read_command<R>(reader: &mut R) -> Result<Option<Vec<Bytes>>, AofError>
where
    R: AsyncBufRead + Unpin,
{
    let mut header = String::new();
    if reader.read_line(&mut header).await? == 0 {
        return Ok(None);
    }
    let header = header.trim_end_matches(['\r', '\n']);
    if header.is_empty() {
        // blank line between commands; keep reading rather than treat it
        // as a zero-argument command
        return Box::pin(read_command(reader)).await;
    }

    if !header.starts_with('*') {
        return Ok(Some(split_inline(header)));
    }

    let count: i64 = header[1..]
        .parse()
        .map_err(|_| AofError::Corrupt(format!("bad array length {header:?}")))?;
    if count < 0 {
        return Ok(Some(Vec::new()));
    }

    let mut argv = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mut len_line = String::new();
        if reader.read_line(&mut len_line).await? == 0 {
            return Err(AofError::Corrupt("truncated request".to_string()));
        }
        let len_line = len_line.trim_end_matches(['\r', '\n']);
        if !len_line.starts_with('$') {
            return Err(AofError::Corrupt(format!("expected bulk header, got {len_line:?}")));
        }
        let len: usize = len_line[1..]
            .parse()
            .map_err(|_| AofError::Corrupt(format!("bad bulk length {len_line:?}")))?;

        let mut buf = vec![0u8; len + 2];
        reader.read_exact(&mut buf).await?;
        buf.truncate(len);
        argv.push(Bytes::from(buf));
    }
    Ok(Some(argv))
}

/// Splits a non-`*`-prefixed line on ASCII whitespace, the inline-command
/// fallback real clients occasionally rely on.
fn split_inline(line: &str) -> Vec<Bytes> {
    line.split_whitespace()
        .map(|s| Bytes::copy_from_slice(s.as_bytes()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::BufReader;

    async fn read_from(data: &[u8]) -> Option<Vec<Bytes>> {
        let mut reader = BufReader::new(Cursor::new(data.to_vec()));
        read_command(&mut reader).await.unwrap()
    }

    #[tokio::test]
    async fn parses_multi_bulk_array() {
        let argv = read_from(b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n").await.unwrap();
        assert_eq!(argv, vec![Bytes::from_static(b"GET"), Bytes::from_static(b"k")]);
    }

    #[tokio::test]
    async fn parses_inline_command() {
        let argv = read_from(b"PING\r\n").await.unwrap();
        assert_eq!(argv, vec![Bytes::from_static(b"PING")]);
    }

    #[tokio::test]
    async fn clean_eof_returns_none() {
        assert!(read_from(b"").await.is_none());
    }

    #[tokio::test]
    async fn truncated_array_is_corrupt() {
        let mut reader = BufReader::new(Cursor::new(b"*2\r\n$3\r\nGET\r\n".to_vec()));
        let result = read_command(&mut reader).await;
        assert!(result.is_err());
    }
}
