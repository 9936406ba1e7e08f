//! Command registry (§4.F): case-insensitive command name →
//! `{ handler, prepare, arity }`.
//!
//! Mirrors the teacher's `CMD_TABLE` (`once_cell::sync::Lazy<HashMap<&str,
//! Arc<RedisCommand>>>` in `src/cmd.rs`) almost verbatim, generalized so
//! `prepare` returns the declared read/write key sets §4.F requires
//! instead of the teacher's inline/bulk/deny-oom flag bits.

use crate::db::Db;
use crate::dispatcher::CallContext;
use crate::error::DispatchError;
use crate::reply::Reply;
use bytes::Bytes;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// The keys a handler declares it will read and write, used by the
/// dispatcher to decide which locks to take (§4.G step 5).
#[derive(Clone, Debug, Default)]
pub struct KeySpec {
    pub write_keys: Vec<Bytes>,
    pub read_keys: Vec<Bytes>,
}

impl KeySpec {
    pub fn write(keys: impl IntoIterator<Item = Bytes>) -> Self {
        KeySpec {
            write_keys: keys.into_iter().collect(),
            read_keys: Vec::new(),
        }
    }

    pub fn read(keys: impl IntoIterator<Item = Bytes>) -> Self {
        KeySpec {
            write_keys: Vec::new(),
            read_keys: keys.into_iter().collect(),
        }
    }

    pub fn none() -> Self {
        KeySpec::default()
    }

    /// Default prepare: write-lock the first argument, as §4.F specifies
    /// for handlers that don't declare their own `prepare`.
    pub fn first_arg_write(args: &[Bytes]) -> Self {
        match args.first() {
            Some(k) => KeySpec::write([k.clone()]),
            None => KeySpec::none(),
        }
    }

    pub fn all_keys(&self) -> Vec<Bytes> {
        let mut all = self.write_keys.clone();
        all.extend(self.read_keys.iter().cloned());
        all
    }
}

pub type HandlerFn = fn(&Db, &[Bytes], &mut CallContext) -> Result<Reply, DispatchError>;
pub type PrepareFn = fn(&[Bytes]) -> KeySpec;

#[derive(Clone, Copy)]
pub struct CommandSpec {
    pub name: &'static str,
    pub handler: HandlerFn,
    pub prepare: PrepareFn,
    /// Positive = exact arg count (name + N args); negative = minimum.
    pub arity: i32,
    /// Whether a successful call should be fed to the AOF engine.
    pub mutating: bool,
}

impl CommandSpec {
    pub fn arity_ok(&self, argc: usize) -> bool {
        if self.arity >= 0 {
            argc == self.arity as usize
        } else {
            argc >= (-self.arity) as usize
        }
    }
}

pub static CMD_TABLE: Lazy<HashMap<&'static str, CommandSpec>> =
    Lazy::new(crate::commands::build_registry);

pub fn lookup(name: &str) -> Option<CommandSpec> {
    CMD_TABLE.get(name.to_ascii_lowercase().as_str()).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_exact_and_minimum() {
        let spec = CommandSpec {
            name: "get",
            handler: |_, _, _| unreachable!(),
            prepare: KeySpec::first_arg_write,
            arity: 2,
            mutating: false,
        };
        assert!(spec.arity_ok(2));
        assert!(!spec.arity_ok(3));

        let spec = CommandSpec {
            name: "del",
            handler: |_, _, _| unreachable!(),
            prepare: KeySpec::first_arg_write,
            arity: -2,
            mutating: true,
        };
        assert!(spec.arity_ok(2));
        assert!(spec.arity_ok(5));
        assert!(!spec.arity_ok(1));
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert!(lookup("GET").is_some());
        assert!(lookup("get").is_some());
        assert!(lookup("GeT").is_some());
        assert!(lookup("frob").is_none());
    }
}
