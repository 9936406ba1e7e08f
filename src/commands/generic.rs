//! Generic, type-agnostic commands (§6): DEL, EXISTS, EXPIRE family, TTL
//! family, PERSIST, TYPE, RENAME family, KEYS, FLUSHDB/FLUSHALL,
//! BGREWRITEAOF.
//!
//! Grounded on `original_source/keys.go`'s `execDel`/`execExists`/
//! `execExpire`/`execRename`/... for exact semantics (TTL transfer on
//! rename, `-2`/`-1` TTL sentinels, RENAME on a missing source erroring
//! with "no such key").

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::db::Db;
use crate::dispatcher::CallContext;
use crate::error::DispatchError;
use crate::pattern::glob_match;
use crate::registry::{CommandSpec, KeySpec};
use crate::reply::{Reply, ONE, OK, ZERO};

pub(crate) fn register(t: &mut HashMap<&'static str, CommandSpec>) {
    crate::commands::register!(t, "del", del, |a: &[Bytes]| KeySpec::write(a.to_vec()), -2, true);
    crate::commands::register!(t, "exists", exists, |a: &[Bytes]| KeySpec::read(a.to_vec()), -2, false);
    crate::commands::register!(t, "expire", expire, KeySpec::first_arg_write, 3, true);
    crate::commands::register!(t, "expireat", expireat, KeySpec::first_arg_write, 3, true);
    crate::commands::register!(t, "pexpire", pexpire, KeySpec::first_arg_write, 3, true);
    crate::commands::register!(t, "pexpireat", pexpireat, KeySpec::first_arg_write, 3, true);
    crate::commands::register!(t, "ttl", ttl, |a: &[Bytes]| KeySpec::read(a.first().cloned()), 2, false);
    crate::commands::register!(t, "pttl", pttl, |a: &[Bytes]| KeySpec::read(a.first().cloned()), 2, false);
    crate::commands::register!(t, "persist", persist, KeySpec::first_arg_write, 2, true);
    crate::commands::register!(t, "type", type_cmd, |a: &[Bytes]| KeySpec::read(a.first().cloned()), 2, false);
    crate::commands::register!(t, "rename", rename, |a: &[Bytes]| KeySpec::write(a.to_vec()), 3, true);
    crate::commands::register!(t, "renamenx", renamenx, |a: &[Bytes]| KeySpec::write(a.to_vec()), 3, true);
    crate::commands::register!(t, "keys", keys, |_: &[Bytes]| KeySpec::none(), 2, false);
    crate::commands::register!(t, "flushdb", flushdb, |_: &[Bytes]| KeySpec::none(), 1, true);
    crate::commands::register!(t, "flushall", flushall, |_: &[Bytes]| KeySpec::none(), 1, true);
    crate::commands::register!(t, "bgrewriteaof", bgrewriteaof, |_: &[Bytes]| KeySpec::none(), 1, true);
}

fn del(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    Ok(Reply::Integer(db.removes(args) as i64))
}

fn exists(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let count = args.iter().filter(|k| db.contains(k)).count();
    Ok(Reply::Integer(count as i64))
}

fn expire(db: &Db, args: &[Bytes], ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    expire_with(db, args, ctx, |secs| Duration::from_secs(secs.max(0) as u64), false)
}

fn pexpire(db: &Db, args: &[Bytes], ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    expire_with(db, args, ctx, |ms| Duration::from_millis(ms.max(0) as u64), false)
}

fn expireat(db: &Db, args: &[Bytes], ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    expire_with(db, args, ctx, |secs| Duration::from_secs(secs.max(0) as u64), true)
}

fn pexpireat(db: &Db, args: &[Bytes], ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    expire_with(db, args, ctx, |ms| Duration::from_millis(ms.max(0) as u64), true)
}

/// Shared EXPIRE/PEXPIRE/EXPIREAT/PEXPIREAT body. `to_duration` turns the
/// raw integer argument into a `Duration`; `absolute` says whether that
/// duration is already measured from the unix epoch (EXPIRE*AT) rather than
/// from now.
fn expire_with(
    db: &Db,
    args: &[Bytes],
    _ctx: &mut CallContext,
    to_duration: impl Fn(i64) -> Duration,
    absolute: bool,
) -> Result<Reply, DispatchError> {
    let key = &args[0];
    if !db.contains(key) {
        return Ok(ZERO.clone());
    }
    let n = crate::commands::parse_i64(&args[1])?;
    let at = if absolute {
        // Measured from the unix epoch on the wire; translated into this
        // process's monotonic clock by rebasing against "now".
        let target = to_duration(n);
        let now_epoch = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        if target > now_epoch {
            Instant::now() + (target - now_epoch)
        } else {
            Instant::now()
                .checked_sub(now_epoch - target)
                .unwrap_or_else(Instant::now)
        }
    } else {
        Instant::now() + to_duration(n)
    };
    db.expire(key, at);
    Ok(ONE.clone())
}

fn ttl(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    Ok(Reply::Integer(ttl_seconds_or_sentinel(db, &args[0])))
}

fn pttl(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    Ok(Reply::Integer(ttl_millis_or_sentinel(db, &args[0])))
}

fn ttl_seconds_or_sentinel(db: &Db, key: &Bytes) -> i64 {
    if !db.contains(key) {
        return -2;
    }
    match db.ttl_at(key) {
        None => -1,
        Some(at) => {
            let remaining = at.saturating_duration_since(Instant::now());
            remaining.as_secs() as i64
        }
    }
}

fn ttl_millis_or_sentinel(db: &Db, key: &Bytes) -> i64 {
    if !db.contains(key) {
        return -2;
    }
    match db.ttl_at(key) {
        None => -1,
        Some(at) => {
            let remaining = at.saturating_duration_since(Instant::now());
            remaining.as_millis() as i64
        }
    }
}

fn persist(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    if !db.contains(&args[0]) {
        return Ok(ZERO.clone());
    }
    Ok(Reply::Integer(db.persist(&args[0]) as i64))
}

fn type_cmd(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    match db.get_entity(&args[0]) {
        Some(e) => Ok(Reply::status(e.type_name())),
        None => Ok(Reply::status("none")),
    }
}

fn rename(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let (src, dst) = (&args[0], &args[1]);
    if src == dst {
        // Open question resolved: RENAME where src == dst is a no-op OK,
        // matching this repo's documented decision rather than erroring.
        if !db.contains(src) {
            return Err(crate::error::DbError::NoSuchKey.into());
        }
        return Ok(OK.clone());
    }
    let entity = match db.get_entity(src) {
        Some(e) => e,
        None => return Err(crate::error::DbError::NoSuchKey.into()),
    };
    let ttl_at = db.ttl_at(src);
    db.remove(src);
    db.put_entity(dst.clone(), entity);
    match ttl_at {
        Some(at) => db.expire(dst, at),
        None => {
            db.persist(dst);
        }
    }
    Ok(OK.clone())
}

fn renamenx(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let (src, dst) = (&args[0], &args[1]);
    if src == dst {
        // Open question resolved: src == dst is a no-op success, since the
        // "does dst already exist" check is vacuous against itself.
        if !db.contains(src) {
            return Err(crate::error::DbError::NoSuchKey.into());
        }
        return Ok(ONE.clone());
    }
    if db.contains(dst) {
        return Ok(ZERO.clone());
    }
    let entity = match db.get_entity(src) {
        Some(e) => e,
        None => return Err(crate::error::DbError::NoSuchKey.into()),
    };
    let ttl_at = db.ttl_at(src);
    db.remove(src);
    db.put_entity(dst.clone(), entity);
    if let Some(at) = ttl_at {
        db.expire(dst, at);
    }
    Ok(ONE.clone())
}

fn keys(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let pattern = &args[0];
    let mut matched = Vec::new();
    db.for_each(|k, _| {
        if glob_match(pattern, k) {
            matched.push(Reply::bulk(k.clone()));
        }
        true
    });
    Ok(Reply::Multi(matched))
}

fn flushdb(db: &Db, _args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    db.flush();
    Ok(OK.clone())
}

fn flushall(db: &Db, _args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    // Open question resolved: this engine has no multi-DB SELECT, so
    // FLUSHALL and FLUSHDB both flush the single keyspace.
    db.flush();
    Ok(OK.clone())
}

fn bgrewriteaof(_db: &Db, _args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    // The actual rewrite is driven by the AOF engine's background task,
    // which watches for this command on the record channel (see
    // `aof::run_append_task`) rather than running synchronously here.
    Ok(Reply::status("Background append only file rewriting started"))
}
