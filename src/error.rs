//! Error types for the keyspace, dispatcher and AOF engine.
//!
//! Handlers return `DbError`/`DispatchError`; the dispatcher turns the
//! latter into a `Reply::Error` with the canonical message from §7 of the
//! spec. Nothing here panics on a bad client request — only on a corrupt
//! AOF file at startup, which is documented as fatal.

use thiserror::Error;

/// Errors raised while a command handler manipulates the keyspace.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DbError {
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("ERR no such key")]
    NoSuchKey,

    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,

    #[error("ERR value is not a valid float")]
    NotAFloat,

    #[error("ERR syntax error")]
    SyntaxError,

    #[error("ERR {0}")]
    Other(String),
}

/// Errors raised by the dispatcher before a handler ever runs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(String),

    #[error(transparent)]
    Db(#[from] DbError),
}

/// Failures from the append-only-file engine. Never surfaced to a client;
/// logged and folded into the `degraded` flag (§7).
#[derive(Debug, Error)]
pub enum AofError {
    #[error("aof io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt aof record: {0}")]
    Corrupt(String),

    #[error("unknown command '{0}' replaying append only file")]
    UnknownCommand(String),
}
