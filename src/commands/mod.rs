//! Command handlers (§6) and the registry they populate (§4.F).
//!
//! Each submodule groups handlers by the `Entity` variant they operate on,
//! mirroring how the teacher splits `cmd.rs`'s table entries conceptually
//! by type even though the teacher keeps them in one file. `build_registry`
//! is what `registry::CMD_TABLE` lazily initializes from.

mod admin;
mod generic;
mod hash;
mod list;
mod pubsub;
mod set;
mod string;
mod zset;

use crate::error::DbError;
use crate::registry::CommandSpec;
use bytes::Bytes;
use std::collections::HashMap;

/// Parses a RESP bulk string argument as a base-10 `i64`, the way every
/// integer-taking command in this table needs to.
pub(crate) fn parse_i64(arg: &Bytes) -> Result<i64, DbError> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(DbError::NotAnInteger)
}

pub(crate) fn parse_f64(arg: &Bytes) -> Result<f64, DbError> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|f| !f.is_nan())
        .ok_or(DbError::NotAFloat)
}

/// Formats a score the way ZSCORE/ZRANGE WITHSCORES reply with it: integral
/// values print without a decimal point, everything else prints with
/// Rust's shortest round-trippable representation.
pub(crate) fn format_f64(f: f64) -> String {
    if f.fract() == 0.0 && f.is_finite() {
        format!("{}", f as i64)
    } else {
        format!("{}", f)
    }
}

macro_rules! register {
    ($table:expr, $name:expr, $handler:expr, $prepare:expr, $arity:expr, $mutating:expr) => {
        $table.insert(
            $name,
            CommandSpec {
                name: $name,
                handler: $handler,
                prepare: $prepare,
                arity: $arity,
                mutating: $mutating,
            },
        );
    };
}

pub(crate) fn build_registry() -> HashMap<&'static str, CommandSpec> {
    let mut t = HashMap::new();

    generic::register(&mut t);
    string::register(&mut t);
    list::register(&mut t);
    hash::register(&mut t);
    set::register(&mut t);
    zset::register(&mut t);
    pubsub::register(&mut t);
    admin::register(&mut t);

    t
}

pub(crate) use register;
