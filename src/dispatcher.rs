//! Command dispatcher (§4.G): arity check → lock acquisition → handler
//! invocation → AOF emission → lock release.
//!
//! Grounded on the teacher's `handler.rs`/`cmd.rs` call path (`lookupCommand`
//! then `cmd.proc()(c)`), extended with the locking and AOF steps the
//! teacher's single-threaded event loop never needed. The critical section
//! runs under `tokio::task::block_in_place` so the synchronous,
//! `parking_lot`-guarded locking in `Db` never blocks other tasks on the
//! same worker thread (§4.G rationale).

use bytes::Bytes;
use tracing::{debug, instrument};

use crate::conn::ConnState;
use crate::db::Db;
use crate::error::DispatchError;
use crate::pubsub::PubSub;
use crate::registry::{self, KeySpec};
use crate::reply::Reply;

/// Everything a handler needs beyond the keyspace itself: the calling
/// connection's subscription state and a handle to the pub/sub hub.
pub struct CallContext<'a> {
    pub conn: &'a mut ConnState,
    pub pubsub: &'a PubSub,
    /// Cleared during AOF replay so replayed commands don't re-enqueue
    /// themselves (§4.G step 7, §5 invariant 3).
    pub emit_aof: bool,
}

pub struct Dispatcher {
    db: std::sync::Arc<Db>,
}

impl Dispatcher {
    pub fn new(db: std::sync::Arc<Db>) -> Self {
        Dispatcher { db }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Executes one already-parsed command line. `argv[0]` is the command
    /// name; the rest are its arguments.
    #[instrument(skip(self, ctx, argv), fields(cmd = %String::from_utf8_lossy(argv.get(0).map(|b| b.as_ref()).unwrap_or(b""))))]
    pub fn exec(&self, ctx: &mut CallContext<'_>, argv: Vec<Bytes>) -> Reply {
        let name = match argv.first() {
            Some(n) => n.clone(),
            None => return Reply::error("ERR empty command"),
        };
        let name_str = String::from_utf8_lossy(&name).to_ascii_lowercase();

        let spec = match registry::lookup(&name_str) {
            Some(s) => s,
            None => {
                return Reply::error(format!(
                    "ERR unknown command '{}'",
                    String::from_utf8_lossy(&name)
                ))
            }
        };

        if !spec.arity_ok(argv.len()) {
            return Reply::error(format!(
                "ERR wrong number of arguments for '{}' command",
                spec.name
            ));
        }

        let args = &argv[1..];
        let key_spec: KeySpec = (spec.prepare)(args);

        // §4.G step 5/6/7: acquire locks in canonical order, run the
        // handler, enqueue AOF, release locks in reverse order — all
        // inside one synchronous critical section so AOF order matches
        // commit order per key.
        let db = self.db.clone();
        let argv_for_aof = argv.clone();
        let reply = tokio::task::block_in_place(|| {
            let keys = key_spec.all_keys();
            let _guard = if key_spec.write_keys.is_empty() {
                None
            } else {
                Some(db.lock_keys(&keys))
            };
            let _rguard = if key_spec.write_keys.is_empty() && !key_spec.read_keys.is_empty() {
                Some(db.rlock_keys(&keys))
            } else {
                None
            };

            let result = (spec.handler)(&db, args, ctx);

            if let Ok(reply) = &result {
                if spec.mutating && ctx.emit_aof && !reply.is_error() {
                    db.feed_aof(argv_for_aof);
                }
            }
            result
        });

        debug!(ok = reply.is_ok(), "command executed");
        match reply {
            Ok(r) => r,
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubsub::PubSub;
    use std::sync::Arc;

    fn bytes_vec(parts: &[&str]) -> Vec<Bytes> {
        parts.iter().map(|p| Bytes::copy_from_slice(p.as_bytes())).collect()
    }

    #[test]
    fn unknown_command_is_an_error_reply() {
        let db = Arc::new(Db::new(4, 16, None));
        let dispatcher = Dispatcher::new(db);
        let pubsub = PubSub::new();
        let (mut conn, _rx) = ConnState::new();
        let mut ctx = CallContext { conn: &mut conn, pubsub: &pubsub, emit_aof: true };
        let reply = dispatcher.exec(&mut ctx, bytes_vec(&["frobnicate", "x"]));
        assert!(reply.is_error());
    }

    #[test]
    fn wrong_arity_is_an_error_reply() {
        let db = Arc::new(Db::new(4, 16, None));
        let dispatcher = Dispatcher::new(db);
        let pubsub = PubSub::new();
        let (mut conn, _rx) = ConnState::new();
        let mut ctx = CallContext { conn: &mut conn, pubsub: &pubsub, emit_aof: true };
        let reply = dispatcher.exec(&mut ctx, bytes_vec(&["get"]));
        assert!(reply.is_error());
    }

    #[test]
    fn set_then_get_round_trips_through_dispatch() {
        let db = Arc::new(Db::new(4, 16, None));
        let dispatcher = Dispatcher::new(db);
        let pubsub = PubSub::new();
        let (mut conn, _rx) = ConnState::new();
        let mut ctx = CallContext { conn: &mut conn, pubsub: &pubsub, emit_aof: true };

        let reply = dispatcher.exec(&mut ctx, bytes_vec(&["set", "k", "v"]));
        assert_eq!(reply, Reply::status("OK"));

        let reply = dispatcher.exec(&mut ctx, bytes_vec(&["get", "k"]));
        assert_eq!(reply, Reply::bulk(Bytes::from_static(b"v")));
    }
}
