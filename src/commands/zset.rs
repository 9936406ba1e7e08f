//! Sorted-set commands (§6 / §4.D): ZADD, ZREM, ZSCORE, ZCARD, ZINCRBY,
//! ZRANGE, ZREVRANGE, ZRANGEBYSCORE, ZREMRANGEBYSCORE.

use std::collections::HashMap;

use bytes::Bytes;

use crate::db::Db;
use crate::dispatcher::CallContext;
use crate::entity::Entity;
use crate::error::{DbError, DispatchError};
use crate::registry::{CommandSpec, KeySpec};
use crate::reply::{Reply, NIL, ZERO};
use crate::zset::Bound;

pub(crate) fn register(t: &mut HashMap<&'static str, CommandSpec>) {
    crate::commands::register!(t, "zadd", zadd, KeySpec::first_arg_write, -4, true);
    crate::commands::register!(t, "zrem", zrem, KeySpec::first_arg_write, -3, true);
    crate::commands::register!(t, "zscore", zscore, |a: &[Bytes]| KeySpec::read(a.first().cloned()), 3, false);
    crate::commands::register!(t, "zcard", zcard, |a: &[Bytes]| KeySpec::read(a.first().cloned()), 2, false);
    crate::commands::register!(t, "zincrby", zincrby, KeySpec::first_arg_write, 4, true);
    crate::commands::register!(t, "zrange", zrange, |a: &[Bytes]| KeySpec::read(a.first().cloned()), -4, false);
    crate::commands::register!(t, "zrevrange", zrevrange, |a: &[Bytes]| KeySpec::read(a.first().cloned()), -4, false);
    crate::commands::register!(t, "zrangebyscore", zrangebyscore, |a: &[Bytes]| KeySpec::read(a.first().cloned()), -4, false);
    crate::commands::register!(t, "zremrangebyscore", zremrangebyscore, KeySpec::first_arg_write, 4, true);
}

fn parse_bound(arg: &Bytes) -> Result<Bound, DbError> {
    match arg.as_ref() {
        b"-inf" => Ok(Bound::NegInf),
        b"+inf" | b"inf" => Ok(Bound::PosInf),
        _ if arg.first() == Some(&b'(') => {
            let rest = std::str::from_utf8(&arg[1..]).map_err(|_| DbError::NotAFloat)?;
            rest.parse::<f64>().map(Bound::Exclusive).map_err(|_| DbError::NotAFloat)
        }
        _ => {
            let s = std::str::from_utf8(arg).map_err(|_| DbError::NotAFloat)?;
            s.parse::<f64>().map(Bound::Inclusive).map_err(|_| DbError::NotAFloat)
        }
    }
}

fn has_withscores(args: &[Bytes]) -> bool {
    args.last()
        .map(|a| a.eq_ignore_ascii_case(b"WITHSCORES"))
        .unwrap_or(false)
}

fn format_score(score: f64) -> Bytes {
    Bytes::from(crate::commands::format_f64(score))
}

fn members_reply(items: Vec<(Bytes, f64)>, withscores: bool) -> Reply {
    let mut out = Vec::with_capacity(items.len() * if withscores { 2 } else { 1 });
    for (member, score) in items {
        out.push(Reply::bulk(member));
        if withscores {
            out.push(Reply::bulk(format_score(score)));
        }
    }
    Reply::Multi(out)
}

fn zadd(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    if (args.len() - 1) % 2 != 0 {
        return Err(DbError::SyntaxError.into());
    }
    let key = &args[0];
    let mut entity = db.get_entity(key).unwrap_or_else(|| Entity::ZSet(Default::default()));
    let zset = entity.as_zset_mut()?;
    let mut added = 0i64;
    for pair in args[1..].chunks(2) {
        let score = crate::commands::parse_f64(&pair[0])?;
        if zset.insert(pair[1].clone(), score) {
            added += 1;
        }
    }
    db.put_entity(key.clone(), entity);
    Ok(Reply::Integer(added))
}

fn zrem(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let key = &args[0];
    let mut entity = match db.get_entity(key) {
        Some(e) => e,
        None => return Ok(ZERO.clone()),
    };
    let zset = entity.as_zset_mut()?;
    let mut removed = 0i64;
    for m in &args[1..] {
        if zset.remove(m) {
            removed += 1;
        }
    }
    if zset.is_empty() {
        db.remove(key);
    } else {
        db.put_entity(key.clone(), entity);
    }
    Ok(Reply::Integer(removed))
}

fn zscore(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    match db.get_entity(&args[0]) {
        Some(e) => match e.as_zset()?.score(&args[1]) {
            Some(s) => Ok(Reply::bulk(format_score(s))),
            None => Ok(NIL.clone()),
        },
        None => Ok(NIL.clone()),
    }
}

fn zcard(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    match db.get_entity(&args[0]) {
        Some(e) => Ok(Reply::Integer(e.as_zset()?.len() as i64)),
        None => Ok(ZERO.clone()),
    }
}

fn zincrby(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let key = &args[0];
    let delta = crate::commands::parse_f64(&args[1])?;
    let member = args[2].clone();
    let mut entity = db.get_entity(key).unwrap_or_else(|| Entity::ZSet(Default::default()));
    let zset = entity.as_zset_mut()?;
    let new_score = zset.incr_by(member, delta);
    db.put_entity(key.clone(), entity);
    Ok(Reply::bulk(format_score(new_score)))
}

fn zrange(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    range_by_rank(db, args, false)
}

fn zrevrange(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    range_by_rank(db, args, true)
}

fn range_by_rank(db: &Db, args: &[Bytes], rev: bool) -> Result<Reply, DispatchError> {
    let withscores = has_withscores(args);
    let arg_end = if withscores { args.len() - 1 } else { args.len() };
    if arg_end != 3 {
        return Err(DbError::SyntaxError.into());
    }
    let start = crate::commands::parse_i64(&args[1])?;
    let stop = crate::commands::parse_i64(&args[2])?;
    let items = match db.get_entity(&args[0]) {
        Some(e) => e.as_zset()?.range_by_rank(start, stop, rev),
        None => Vec::new(),
    };
    Ok(members_reply(items, withscores))
}

fn zrangebyscore(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let withscores = has_withscores(args);
    let arg_end = if withscores { args.len() - 1 } else { args.len() };
    if arg_end != 3 {
        return Err(DbError::SyntaxError.into());
    }
    let min = parse_bound(&args[1])?;
    let max = parse_bound(&args[2])?;
    let items = match db.get_entity(&args[0]) {
        Some(e) => e.as_zset()?.range_by_score(min, max),
        None => Vec::new(),
    };
    Ok(members_reply(items, withscores))
}

fn zremrangebyscore(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let key = &args[0];
    let min = parse_bound(&args[1])?;
    let max = parse_bound(&args[2])?;
    let mut entity = match db.get_entity(key) {
        Some(e) => e,
        None => return Ok(ZERO.clone()),
    };
    let zset = entity.as_zset_mut()?;
    let removed = zset.remove_range_by_score(min, max);
    if zset.is_empty() {
        db.remove(key);
    } else {
        db.put_entity(key.clone(), entity);
    }
    Ok(Reply::Integer(removed as i64))
}
