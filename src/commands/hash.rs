//! Hash commands (§6 / §4.D): HSET, HGET, HDEL, HEXISTS, HGETALL, HKEYS,
//! HVALS, HLEN, HMGET, HMSET, HINCRBY.

use std::collections::HashMap;

use bytes::Bytes;

use crate::db::Db;
use crate::dispatcher::CallContext;
use crate::entity::Entity;
use crate::error::{DbError, DispatchError};
use crate::registry::{CommandSpec, KeySpec};
use crate::reply::{Reply, NIL, ZERO};

pub(crate) fn register(t: &mut HashMap<&'static str, CommandSpec>) {
    crate::commands::register!(t, "hset", hset, KeySpec::first_arg_write, -4, true);
    crate::commands::register!(t, "hmset", hmset, KeySpec::first_arg_write, -4, true);
    crate::commands::register!(t, "hget", hget, |a: &[Bytes]| KeySpec::read(a.first().cloned()), 3, false);
    crate::commands::register!(t, "hdel", hdel, KeySpec::first_arg_write, -3, true);
    crate::commands::register!(t, "hexists", hexists, |a: &[Bytes]| KeySpec::read(a.first().cloned()), 3, false);
    crate::commands::register!(t, "hgetall", hgetall, |a: &[Bytes]| KeySpec::read(a.first().cloned()), 2, false);
    crate::commands::register!(t, "hkeys", hkeys, |a: &[Bytes]| KeySpec::read(a.first().cloned()), 2, false);
    crate::commands::register!(t, "hvals", hvals, |a: &[Bytes]| KeySpec::read(a.first().cloned()), 2, false);
    crate::commands::register!(t, "hlen", hlen, |a: &[Bytes]| KeySpec::read(a.first().cloned()), 2, false);
    crate::commands::register!(t, "hmget", hmget, |a: &[Bytes]| KeySpec::read(a.first().cloned()), -3, false);
    crate::commands::register!(t, "hincrby", hincrby, KeySpec::first_arg_write, 4, true);
}

fn hash_pairs_ok(n: usize) -> Result<(), DispatchError> {
    if n % 2 != 0 {
        Err(DbError::SyntaxError.into())
    } else {
        Ok(())
    }
}

fn hset(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    hash_pairs_ok(args.len() - 1)?;
    let key = &args[0];
    let mut entity = db.get_entity(key).unwrap_or_else(|| Entity::Hash(Default::default()));
    let map = entity.as_hash_mut()?;
    let mut added = 0i64;
    for pair in args[1..].chunks(2) {
        if map.insert(pair[0].clone(), pair[1].clone()).is_none() {
            added += 1;
        }
    }
    db.put_entity(key.clone(), entity);
    Ok(Reply::Integer(added))
}

fn hmset(db: &Db, args: &[Bytes], ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    hset(db, args, ctx)?;
    Ok(Reply::status("OK"))
}

fn hget(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    match db.get_entity(&args[0]) {
        Some(e) => match e.as_hash()?.get(&args[1]) {
            Some(v) => Ok(Reply::bulk(v.clone())),
            None => Ok(NIL.clone()),
        },
        None => Ok(NIL.clone()),
    }
}

fn hdel(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let key = &args[0];
    let mut entity = match db.get_entity(key) {
        Some(e) => e,
        None => return Ok(ZERO.clone()),
    };
    let map = entity.as_hash_mut()?;
    let mut removed = 0i64;
    for field in &args[1..] {
        if map.remove(field).is_some() {
            removed += 1;
        }
    }
    if map.is_empty() {
        db.remove(key);
    } else {
        db.put_entity(key.clone(), entity);
    }
    Ok(Reply::Integer(removed))
}

fn hexists(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    match db.get_entity(&args[0]) {
        Some(e) => Ok(Reply::Integer(e.as_hash()?.contains_key(&args[1]) as i64)),
        None => Ok(ZERO.clone()),
    }
}

fn hgetall(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    match db.get_entity(&args[0]) {
        Some(e) => {
            let mut out = Vec::new();
            for (k, v) in e.as_hash()? {
                out.push(Reply::bulk(k.clone()));
                out.push(Reply::bulk(v.clone()));
            }
            Ok(Reply::Multi(out))
        }
        None => Ok(Reply::Multi(Vec::new())),
    }
}

fn hkeys(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    match db.get_entity(&args[0]) {
        Some(e) => Ok(Reply::Multi(e.as_hash()?.keys().map(|k| Reply::bulk(k.clone())).collect())),
        None => Ok(Reply::Multi(Vec::new())),
    }
}

fn hvals(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    match db.get_entity(&args[0]) {
        Some(e) => Ok(Reply::Multi(e.as_hash()?.values().map(|v| Reply::bulk(v.clone())).collect())),
        None => Ok(Reply::Multi(Vec::new())),
    }
}

fn hlen(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    match db.get_entity(&args[0]) {
        Some(e) => Ok(Reply::Integer(e.as_hash()?.len() as i64)),
        None => Ok(ZERO.clone()),
    }
}

fn hmget(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let entity = db.get_entity(&args[0]);
    let map = match &entity {
        Some(e) => Some(e.as_hash()?),
        None => None,
    };
    let out = args[1..]
        .iter()
        .map(|f| match map.and_then(|m| m.get(f)) {
            Some(v) => Reply::bulk(v.clone()),
            None => NIL.clone(),
        })
        .collect();
    Ok(Reply::Multi(out))
}

fn hincrby(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let key = &args[0];
    let field = &args[1];
    let delta = crate::commands::parse_i64(&args[2])?;

    let mut entity = db.get_entity(key).unwrap_or_else(|| Entity::Hash(Default::default()));
    let map = entity.as_hash_mut()?;
    let current = match map.get(field) {
        Some(v) => std::str::from_utf8(v)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or(DbError::NotAnInteger)?,
        None => 0,
    };
    let updated = current.checked_add(delta).ok_or(DbError::NotAnInteger)?;
    map.insert(field.clone(), Bytes::from(updated.to_string()));
    db.put_entity(key.clone(), entity);
    Ok(Reply::Integer(updated))
}
