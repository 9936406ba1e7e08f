//! String commands (§6 / §4.D): SET (+ EX/PX/NX/XX), GET, GETSET, MGET,
//! SETNX, MSET, MSETNX, INCR/INCRBY/DECR/DECRBY, APPEND, STRLEN,
//! GETRANGE, SETRANGE.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};

use crate::db::Db;
use crate::dispatcher::CallContext;
use crate::entity::Entity;
use crate::error::{DbError, DispatchError};
use crate::registry::{CommandSpec, KeySpec};
use crate::reply::{Reply, NIL, ONE, OK, ZERO};

pub(crate) fn register(t: &mut HashMap<&'static str, CommandSpec>) {
    crate::commands::register!(t, "set", set, KeySpec::first_arg_write, -3, true);
    crate::commands::register!(t, "get", get, |a: &[Bytes]| KeySpec::read(a.first().cloned()), 2, false);
    crate::commands::register!(t, "getset", getset, KeySpec::first_arg_write, 3, true);
    crate::commands::register!(t, "mget", mget, |a: &[Bytes]| KeySpec::read(a.to_vec()), -2, false);
    crate::commands::register!(t, "setnx", setnx, KeySpec::first_arg_write, 3, true);
    crate::commands::register!(t, "mset", mset, mset_keys, -3, true);
    crate::commands::register!(t, "msetnx", msetnx, mset_keys, -3, true);
    crate::commands::register!(t, "incr", incr, KeySpec::first_arg_write, 2, true);
    crate::commands::register!(t, "incrby", incrby, KeySpec::first_arg_write, 3, true);
    crate::commands::register!(t, "decr", decr, KeySpec::first_arg_write, 2, true);
    crate::commands::register!(t, "decrby", decrby, KeySpec::first_arg_write, 3, true);
    crate::commands::register!(t, "append", append, KeySpec::first_arg_write, 3, true);
    crate::commands::register!(t, "strlen", strlen, |a: &[Bytes]| KeySpec::read(a.first().cloned()), 2, false);
    crate::commands::register!(t, "getrange", getrange, |a: &[Bytes]| KeySpec::read(a.first().cloned()), 4, false);
    crate::commands::register!(t, "setrange", setrange, KeySpec::first_arg_write, 4, true);
}

fn mset_keys(args: &[Bytes]) -> KeySpec {
    KeySpec::write(args.iter().step_by(2).cloned())
}

fn set(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let key = args[0].clone();
    let value = args[1].clone();

    let mut expire_at: Option<Instant> = None;
    let mut nx = false;
    let mut xx = false;

    let mut i = 2;
    while i < args.len() {
        let opt = String::from_utf8_lossy(&args[i]).to_ascii_uppercase();
        match opt.as_str() {
            "EX" => {
                let secs = crate::commands::parse_i64(args.get(i + 1).ok_or(DbError::SyntaxError)?)?;
                expire_at = Some(Instant::now() + Duration::from_secs(secs.max(0) as u64));
                i += 2;
            }
            "PX" => {
                let ms = crate::commands::parse_i64(args.get(i + 1).ok_or(DbError::SyntaxError)?)?;
                expire_at = Some(Instant::now() + Duration::from_millis(ms.max(0) as u64));
                i += 2;
            }
            "NX" => {
                nx = true;
                i += 1;
            }
            "XX" => {
                xx = true;
                i += 1;
            }
            _ => return Err(DbError::SyntaxError.into()),
        }
    }

    if nx && xx {
        return Err(DbError::SyntaxError.into());
    }

    let exists = db.contains(&key);
    if (nx && exists) || (xx && !exists) {
        return Ok(NIL.clone());
    }

    db.put_entity(key.clone(), Entity::String(value));
    match expire_at {
        Some(at) => db.expire(&key, at),
        None => {
            db.persist(&key);
        }
    }
    Ok(OK.clone())
}

fn get(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    match db.get_entity(&args[0]) {
        Some(e) => Ok(Reply::bulk(e.as_string()?.clone())),
        None => Ok(NIL.clone()),
    }
}

fn getset(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let key = &args[0];
    let old = match db.get_entity(key) {
        Some(e) => Some(e.as_string()?.clone()),
        None => None,
    };
    db.put_entity(key.clone(), Entity::String(args[1].clone()));
    db.persist(key);
    Ok(match old {
        Some(v) => Reply::bulk(v),
        None => NIL.clone(),
    })
}

fn mget(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let replies = args
        .iter()
        .map(|k| match db.get_entity(k) {
            Some(Entity::String(s)) => Reply::bulk(s),
            _ => NIL.clone(),
        })
        .collect();
    Ok(Reply::Multi(replies))
}

fn setnx(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let inserted = db.put_entity_if_absent(args[0].clone(), Entity::String(args[1].clone()));
    Ok(if inserted { ONE.clone() } else { ZERO.clone() })
}

fn mset(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    if args.len() % 2 != 0 {
        return Err(DbError::SyntaxError.into());
    }
    for pair in args.chunks(2) {
        db.put_entity(pair[0].clone(), Entity::String(pair[1].clone()));
        db.persist(&pair[0]);
    }
    Ok(OK.clone())
}

fn msetnx(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    if args.len() % 2 != 0 {
        return Err(DbError::SyntaxError.into());
    }
    if args.chunks(2).any(|pair| db.contains(&pair[0])) {
        return Ok(ZERO.clone());
    }
    for pair in args.chunks(2) {
        db.put_entity(pair[0].clone(), Entity::String(pair[1].clone()));
    }
    Ok(ONE.clone())
}

fn incr(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    incr_by(db, &args[0], 1)
}

fn incrby(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let delta = crate::commands::parse_i64(&args[1])?;
    incr_by(db, &args[0], delta)
}

fn decr(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    incr_by(db, &args[0], -1)
}

fn decrby(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let delta = crate::commands::parse_i64(&args[1])?;
    incr_by(db, &args[0], delta.checked_neg().ok_or(DbError::NotAnInteger)?)
}

fn incr_by(db: &Db, key: &Bytes, delta: i64) -> Result<Reply, DispatchError> {
    let current = match db.get_entity(key) {
        Some(e) => {
            let s = e.as_string()?.clone();
            std::str::from_utf8(&s)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or(DbError::NotAnInteger)?
        }
        None => 0,
    };
    let updated = current.checked_add(delta).ok_or(DbError::NotAnInteger)?;
    db.put_entity(key.clone(), Entity::String(Bytes::from(updated.to_string())));
    Ok(Reply::Integer(updated))
}

fn append(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let key = &args[0];
    let mut buf = match db.get_entity(key) {
        Some(e) => BytesMut::from(&e.as_string()?[..]),
        None => BytesMut::new(),
    };
    buf.extend_from_slice(&args[1]);
    let len = buf.len();
    db.put_entity(key.clone(), Entity::String(buf.freeze()));
    Ok(Reply::Integer(len as i64))
}

fn strlen(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    match db.get_entity(&args[0]) {
        Some(e) => Ok(Reply::Integer(e.as_string()?.len() as i64)),
        None => Ok(ZERO.clone()),
    }
}

fn getrange(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let s = match db.get_entity(&args[0]) {
        Some(e) => e.as_string()?.clone(),
        None => return Ok(Reply::bulk(Bytes::new())),
    };
    let start = crate::commands::parse_i64(&args[1])?;
    let stop = crate::commands::parse_i64(&args[2])?;
    match crate::entity::clamp_range(s.len(), start, stop) {
        Some((a, b)) => Ok(Reply::bulk(s.slice(a..=b))),
        None => Ok(Reply::bulk(Bytes::new())),
    }
}

fn setrange(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let key = &args[0];
    let offset = crate::commands::parse_i64(&args[1])?;
    if offset < 0 {
        return Err(DbError::Other("offset is out of range".to_string()).into());
    }
    let offset = offset as usize;
    let patch = &args[2];

    let mut buf = match db.get_entity(key) {
        Some(e) => BytesMut::from(&e.as_string()?[..]),
        None => BytesMut::new(),
    };
    if buf.len() < offset + patch.len() {
        buf.resize(offset + patch.len(), 0);
    }
    buf[offset..offset + patch.len()].copy_from_slice(patch);
    let len = buf.len();
    db.put_entity(key.clone(), Entity::String(buf.freeze()));
    Ok(Reply::Integer(len as i64))
}
