//! Set commands (§6 / §4.D): SADD, SREM, SISMEMBER, SCARD, SMEMBERS,
//! SINTER, SUNION, SDIFF, SINTERSTORE, SUNIONSTORE, SDIFFSTORE, SMOVE,
//! SPOP, SRANDMEMBER.

use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use rand::seq::IteratorRandom;
use rand::thread_rng;

use crate::db::Db;
use crate::dispatcher::CallContext;
use crate::entity::Entity;
use crate::error::DispatchError;
use crate::registry::{CommandSpec, KeySpec};
use crate::reply::{Reply, NIL, ZERO};

pub(crate) fn register(t: &mut HashMap<&'static str, CommandSpec>) {
    crate::commands::register!(t, "sadd", sadd, KeySpec::first_arg_write, -3, true);
    crate::commands::register!(t, "srem", srem, KeySpec::first_arg_write, -3, true);
    crate::commands::register!(t, "sismember", sismember, |a: &[Bytes]| KeySpec::read(a.first().cloned()), 3, false);
    crate::commands::register!(t, "scard", scard, |a: &[Bytes]| KeySpec::read(a.first().cloned()), 2, false);
    crate::commands::register!(t, "smembers", smembers, |a: &[Bytes]| KeySpec::read(a.first().cloned()), 2, false);
    crate::commands::register!(t, "sinter", sinter, |a: &[Bytes]| KeySpec::read(a.to_vec()), -2, false);
    crate::commands::register!(t, "sunion", sunion, |a: &[Bytes]| KeySpec::read(a.to_vec()), -2, false);
    crate::commands::register!(t, "sdiff", sdiff, |a: &[Bytes]| KeySpec::read(a.to_vec()), -2, false);
    crate::commands::register!(t, "sinterstore", sinterstore, |a: &[Bytes]| KeySpec::write(a.to_vec()), -3, true);
    crate::commands::register!(t, "sunionstore", sunionstore, |a: &[Bytes]| KeySpec::write(a.to_vec()), -3, true);
    crate::commands::register!(t, "sdiffstore", sdiffstore, |a: &[Bytes]| KeySpec::write(a.to_vec()), -3, true);
    crate::commands::register!(t, "smove", smove, |a: &[Bytes]| KeySpec::write(a[..2].to_vec()), 4, true);
    crate::commands::register!(t, "spop", spop, KeySpec::first_arg_write, -2, true);
    crate::commands::register!(t, "srandmember", srandmember, |a: &[Bytes]| KeySpec::read(a.first().cloned()), -2, false);
}

fn sadd(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let key = &args[0];
    let mut entity = db.get_entity(key).unwrap_or_else(|| Entity::Set(Default::default()));
    let set = entity.as_set_mut()?;
    let mut added = 0i64;
    for m in &args[1..] {
        if set.insert(m.clone()) {
            added += 1;
        }
    }
    db.put_entity(key.clone(), entity);
    Ok(Reply::Integer(added))
}

fn srem(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let key = &args[0];
    let mut entity = match db.get_entity(key) {
        Some(e) => e,
        None => return Ok(ZERO.clone()),
    };
    let set = entity.as_set_mut()?;
    let mut removed = 0i64;
    for m in &args[1..] {
        if set.remove(m) {
            removed += 1;
        }
    }
    if set.is_empty() {
        db.remove(key);
    } else {
        db.put_entity(key.clone(), entity);
    }
    Ok(Reply::Integer(removed))
}

fn sismember(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    match db.get_entity(&args[0]) {
        Some(e) => Ok(Reply::Integer(e.as_set()?.contains(&args[1]) as i64)),
        None => Ok(ZERO.clone()),
    }
}

fn scard(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    match db.get_entity(&args[0]) {
        Some(e) => Ok(Reply::Integer(e.as_set()?.len() as i64)),
        None => Ok(ZERO.clone()),
    }
}

fn smembers(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    match db.get_entity(&args[0]) {
        Some(e) => Ok(Reply::Multi(e.as_set()?.iter().map(|m| Reply::bulk(m.clone())).collect())),
        None => Ok(Reply::Multi(Vec::new())),
    }
}

fn load_set(db: &Db, key: &Bytes) -> Result<HashSet<Bytes>, DispatchError> {
    match db.get_entity(key) {
        Some(e) => Ok(e.as_set()?.clone()),
        None => Ok(HashSet::new()),
    }
}

fn sinter(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let result = combine_sets(db, args, SetOp::Inter)?;
    Ok(Reply::Multi(result.into_iter().map(Reply::bulk).collect()))
}

fn sunion(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let result = combine_sets(db, args, SetOp::Union)?;
    Ok(Reply::Multi(result.into_iter().map(Reply::bulk).collect()))
}

fn sdiff(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let result = combine_sets(db, args, SetOp::Diff)?;
    Ok(Reply::Multi(result.into_iter().map(Reply::bulk).collect()))
}

fn sinterstore(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    store_combined(db, &args[0], &args[1..], SetOp::Inter)
}

fn sunionstore(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    store_combined(db, &args[0], &args[1..], SetOp::Union)
}

fn sdiffstore(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    store_combined(db, &args[0], &args[1..], SetOp::Diff)
}

#[derive(Clone, Copy)]
enum SetOp {
    Inter,
    Union,
    Diff,
}

fn combine_sets(db: &Db, keys: &[Bytes], op: SetOp) -> Result<Vec<Bytes>, DispatchError> {
    let mut sets = Vec::with_capacity(keys.len());
    for k in keys {
        sets.push(load_set(db, k)?);
    }
    let mut iter = sets.into_iter();
    let mut acc = iter.next().unwrap_or_default();
    for next in iter {
        acc = match op {
            SetOp::Inter => acc.intersection(&next).cloned().collect(),
            SetOp::Union => acc.union(&next).cloned().collect(),
            SetOp::Diff => acc.difference(&next).cloned().collect(),
        };
    }
    Ok(acc.into_iter().collect())
}

fn store_combined(db: &Db, dst: &Bytes, keys: &[Bytes], op: SetOp) -> Result<Reply, DispatchError> {
    let result = combine_sets(db, keys, op)?;
    let len = result.len();
    if result.is_empty() {
        db.remove(dst);
    } else {
        db.put_entity(dst.clone(), Entity::Set(result.into_iter().collect()));
    }
    Ok(Reply::Integer(len as i64))
}

fn smove(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let (src, dst, member) = (&args[0], &args[1], &args[2]);
    let mut src_entity = match db.get_entity(src) {
        Some(e) => e,
        None => return Ok(ZERO.clone()),
    };

    // validate dst's type before mutating anything
    if let Some(existing) = db.get_entity(dst) {
        existing.as_set()?;
    }

    let src_set = src_entity.as_set_mut()?;
    if !src_set.remove(member) {
        return Ok(ZERO.clone());
    }
    if src_set.is_empty() {
        db.remove(src);
    } else {
        db.put_entity(src.clone(), src_entity);
    }

    let mut dst_entity = db.get_entity(dst).unwrap_or_else(|| Entity::Set(Default::default()));
    dst_entity.as_set_mut()?.insert(member.clone());
    db.put_entity(dst.clone(), dst_entity);
    Ok(Reply::Integer(1))
}

fn spop(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let key = &args[0];
    let count = match args.get(1) {
        Some(n) => crate::commands::parse_i64(n)?.max(0) as usize,
        None => 1,
    };
    let single_reply = args.len() == 1;

    let mut entity = match db.get_entity(key) {
        Some(e) => e,
        None => {
            return Ok(if single_reply { NIL.clone() } else { Reply::Multi(Vec::new()) });
        }
    };
    let set = entity.as_set_mut()?;
    let mut rng = thread_rng();
    let chosen: Vec<Bytes> = set.iter().cloned().choose_multiple(&mut rng, count);
    for m in &chosen {
        set.remove(m);
    }
    if set.is_empty() {
        db.remove(key);
    } else {
        db.put_entity(key.clone(), entity);
    }

    if single_reply {
        Ok(match chosen.into_iter().next() {
            Some(m) => Reply::bulk(m),
            None => NIL.clone(),
        })
    } else {
        Ok(Reply::Multi(chosen.into_iter().map(Reply::bulk).collect()))
    }
}

fn srandmember(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let key = &args[0];
    let entity = match db.get_entity(key) {
        Some(e) => e,
        None => {
            return Ok(if args.len() == 1 { NIL.clone() } else { Reply::Multi(Vec::new()) });
        }
    };
    let set = entity.as_set()?;
    let mut rng = thread_rng();

    match args.get(1) {
        None => Ok(match set.iter().choose(&mut rng) {
            Some(m) => Reply::bulk(m.clone()),
            None => NIL.clone(),
        }),
        Some(n) => {
            let count = crate::commands::parse_i64(n)?;
            let chosen: Vec<Bytes> = if count >= 0 {
                set.iter().cloned().choose_multiple(&mut rng, count as usize)
            } else {
                // negative count: allow repeats, draw (-count) independent
                // samples. `checked_neg` guards i64::MIN (whose negation
                // overflows i64), and the draw count is capped the same way
                // a real server bounds any client-supplied repeat count, so
                // one call can't pin this connection's lock indefinitely.
                const MAX_SRANDMEMBER_DRAWS: usize = 1_000_000;
                let n = count
                    .checked_neg()
                    .map(|c| c as usize)
                    .unwrap_or(usize::MAX)
                    .min(MAX_SRANDMEMBER_DRAWS);
                (0..n)
                    .filter_map(|_| set.iter().choose(&mut rng).cloned())
                    .collect()
            };
            Ok(Reply::Multi(chosen.into_iter().map(Reply::bulk).collect()))
        }
    }
}
