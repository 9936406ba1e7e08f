//! Typed replies and their RESP emission (§4.K / §6).
//!
//! Mirrors the teacher's shared constant-reply statics in `obj.rs`
//! (`OK`, `PONG`, `NULL_BULK`, ...) but without the `Arc<RwLock<_>>`
//! wrapper those carried — the values here are immutable, so a bare
//! `Lazy<Reply>` is enough.

use bytes::{BufMut, Bytes, BytesMut};
use once_cell::sync::Lazy;
use std::borrow::Cow;

use crate::error::{DbError, DispatchError};

#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    Simple(Cow<'static, str>),
    Error(String),
    Integer(i64),
    Bulk(Option<Bytes>),
    Multi(Vec<Reply>),
    /// Several independent top-level replies sent back-to-back on the wire
    /// (no enclosing `*N` array) — SUBSCRIBE/UNSUBSCRIBE with more than one
    /// channel acknowledge each one this way rather than as a nested array.
    Batch(Vec<Reply>),
}

pub static OK: Lazy<Reply> = Lazy::new(|| Reply::Simple(Cow::Borrowed("OK")));
pub static PONG: Lazy<Reply> = Lazy::new(|| Reply::Simple(Cow::Borrowed("PONG")));
pub static NIL: Lazy<Reply> = Lazy::new(|| Reply::Bulk(None));
pub static ZERO: Lazy<Reply> = Lazy::new(|| Reply::Integer(0));
pub static ONE: Lazy<Reply> = Lazy::new(|| Reply::Integer(1));

impl Reply {
    pub fn bulk(bytes: impl Into<Bytes>) -> Reply {
        Reply::Bulk(Some(bytes.into()))
    }

    pub fn status(s: &'static str) -> Reply {
        Reply::Simple(Cow::Borrowed(s))
    }

    pub fn error(s: impl Into<String>) -> Reply {
        Reply::Error(s.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Serializes this reply as RESP bytes, appending to `out`.
    pub fn write_resp(&self, out: &mut BytesMut) {
        match self {
            Reply::Simple(s) => {
                out.put_u8(b'+');
                out.extend_from_slice(s.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Reply::Error(e) => {
                out.put_u8(b'-');
                out.extend_from_slice(e.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Reply::Integer(i) => {
                out.put_u8(b':');
                out.extend_from_slice(i.to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Reply::Bulk(None) => {
                out.extend_from_slice(b"$-1\r\n");
            }
            Reply::Bulk(Some(b)) => {
                out.put_u8(b'$');
                out.extend_from_slice(b.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                out.extend_from_slice(b);
                out.extend_from_slice(b"\r\n");
            }
            Reply::Multi(items) => {
                out.put_u8(b'*');
                out.extend_from_slice(items.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                for item in items {
                    item.write_resp(out);
                }
            }
            Reply::Batch(items) => {
                for item in items {
                    item.write_resp(out);
                }
            }
        }
    }

    pub fn to_resp_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.write_resp(&mut buf);
        buf.freeze()
    }
}

impl From<DbError> for Reply {
    fn from(e: DbError) -> Self {
        Reply::Error(e.to_string())
    }
}

impl From<DispatchError> for Reply {
    fn from(e: DispatchError) -> Self {
        Reply::Error(e.to_string())
    }
}
