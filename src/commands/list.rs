//! List commands (§6 / §4.D): LPUSH, RPUSH, LPOP, RPOP, LLEN, LRANGE,
//! LINDEX, LSET, LINSERT, LREM, LTRIM, RPOPLPUSH.

use std::collections::HashMap;

use bytes::Bytes;

use crate::db::Db;
use crate::dispatcher::CallContext;
use crate::entity::{clamp_list_index, clamp_range, Entity};
use crate::error::{DbError, DispatchError};
use crate::registry::{CommandSpec, KeySpec};
use crate::reply::{Reply, NIL, ZERO};

pub(crate) fn register(t: &mut HashMap<&'static str, CommandSpec>) {
    crate::commands::register!(t, "lpush", lpush, KeySpec::first_arg_write, -3, true);
    crate::commands::register!(t, "rpush", rpush, KeySpec::first_arg_write, -3, true);
    crate::commands::register!(t, "lpop", lpop, KeySpec::first_arg_write, 2, true);
    crate::commands::register!(t, "rpop", rpop, KeySpec::first_arg_write, 2, true);
    crate::commands::register!(t, "llen", llen, |a: &[Bytes]| KeySpec::read(a.first().cloned()), 2, false);
    crate::commands::register!(t, "lrange", lrange, |a: &[Bytes]| KeySpec::read(a.first().cloned()), 4, false);
    crate::commands::register!(t, "lindex", lindex, |a: &[Bytes]| KeySpec::read(a.first().cloned()), 3, false);
    crate::commands::register!(t, "lset", lset, KeySpec::first_arg_write, 4, true);
    crate::commands::register!(t, "linsert", linsert, KeySpec::first_arg_write, 5, true);
    crate::commands::register!(t, "lrem", lrem, KeySpec::first_arg_write, 4, true);
    crate::commands::register!(t, "ltrim", ltrim, KeySpec::first_arg_write, 4, true);
    crate::commands::register!(t, "rpoplpush", rpoplpush, |a: &[Bytes]| KeySpec::write(a.to_vec()), 3, true);
}

fn lpush(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    push(db, &args[0], &args[1..], true)
}

fn rpush(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    push(db, &args[0], &args[1..], false)
}

fn push(db: &Db, key: &Bytes, values: &[Bytes], front: bool) -> Result<Reply, DispatchError> {
    let mut entity = match db.get_entity(key) {
        Some(e) => e,
        None => Entity::List(Default::default()),
    };
    let list = entity.as_list_mut()?;
    for v in values {
        if front {
            list.push_front(v.clone());
        } else {
            list.push_back(v.clone());
        }
    }
    let len = list.len();
    db.put_entity(key.clone(), entity);
    Ok(Reply::Integer(len as i64))
}

fn lpop(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    pop(db, &args[0], true)
}

fn rpop(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    pop(db, &args[0], false)
}

fn pop(db: &Db, key: &Bytes, front: bool) -> Result<Reply, DispatchError> {
    let mut entity = match db.get_entity(key) {
        Some(e) => e,
        None => return Ok(NIL.clone()),
    };
    let list = entity.as_list_mut()?;
    let popped = if front { list.pop_front() } else { list.pop_back() };
    let now_empty = list.is_empty();
    match popped {
        Some(v) => {
            if now_empty {
                db.remove(key);
            } else {
                db.put_entity(key.clone(), entity);
            }
            Ok(Reply::bulk(v))
        }
        None => Ok(NIL.clone()),
    }
}

fn llen(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    match db.get_entity(&args[0]) {
        Some(e) => Ok(Reply::Integer(e.as_list()?.len() as i64)),
        None => Ok(ZERO.clone()),
    }
}

fn lrange(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let entity = match db.get_entity(&args[0]) {
        Some(e) => e,
        None => return Ok(Reply::Multi(Vec::new())),
    };
    let list = entity.as_list()?;
    let start = crate::commands::parse_i64(&args[1])?;
    let stop = crate::commands::parse_i64(&args[2])?;
    match clamp_range(list.len(), start, stop) {
        Some((a, b)) => Ok(Reply::Multi(
            list.iter().skip(a).take(b - a + 1).map(|v| Reply::bulk(v.clone())).collect(),
        )),
        None => Ok(Reply::Multi(Vec::new())),
    }
}

fn lindex(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let entity = match db.get_entity(&args[0]) {
        Some(e) => e,
        None => return Ok(NIL.clone()),
    };
    let list = entity.as_list()?;
    let idx = crate::commands::parse_i64(&args[1])?;
    match clamp_list_index(list.len(), idx) {
        Some(i) => Ok(Reply::bulk(list[i].clone())),
        None => Ok(NIL.clone()),
    }
}

fn lset(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let key = &args[0];
    let mut entity = match db.get_entity(key) {
        Some(e) => e,
        None => return Err(DbError::NoSuchKey.into()),
    };
    let idx = crate::commands::parse_i64(&args[1])?;
    let list = entity.as_list_mut()?;
    match clamp_list_index(list.len(), idx) {
        Some(i) => {
            list[i] = args[2].clone();
            db.put_entity(key.clone(), entity);
            Ok(Reply::status("OK"))
        }
        None => Err(DbError::Other("index out of range".to_string()).into()),
    }
}

fn linsert(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let key = &args[0];
    let before = match String::from_utf8_lossy(&args[1]).to_ascii_uppercase().as_str() {
        "BEFORE" => true,
        "AFTER" => false,
        _ => return Err(DbError::SyntaxError.into()),
    };
    let pivot = &args[2];
    let value = &args[3];

    let mut entity = match db.get_entity(key) {
        Some(e) => e,
        None => return Ok(ZERO.clone()),
    };
    let list = entity.as_list_mut()?;
    match list.iter().position(|v| v == pivot) {
        Some(pos) => {
            let insert_at = if before { pos } else { pos + 1 };
            list.insert(insert_at, value.clone());
            let len = list.len();
            db.put_entity(key.clone(), entity);
            Ok(Reply::Integer(len as i64))
        }
        None => Ok(Reply::Integer(-1)),
    }
}

fn lrem(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let key = &args[0];
    let count = crate::commands::parse_i64(&args[1])?;
    let value = &args[2];

    let mut entity = match db.get_entity(key) {
        Some(e) => e,
        None => return Ok(ZERO.clone()),
    };
    let list = entity.as_list_mut()?;

    let mut removed = 0i64;
    if count >= 0 {
        let limit = if count == 0 { usize::MAX } else { count as usize };
        let mut i = 0;
        while i < list.len() && (removed as usize) < limit {
            if list[i] == *value {
                list.remove(i);
                removed += 1;
            } else {
                i += 1;
            }
        }
    } else {
        let limit = (-count) as usize;
        let mut i = list.len();
        while i > 0 && (removed as usize) < limit {
            i -= 1;
            if list[i] == *value {
                list.remove(i);
                removed += 1;
            }
        }
    }

    let now_empty = list.is_empty();
    if now_empty {
        db.remove(key);
    } else {
        db.put_entity(key.clone(), entity);
    }
    Ok(Reply::Integer(removed))
}

fn ltrim(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let key = &args[0];
    let start = crate::commands::parse_i64(&args[1])?;
    let stop = crate::commands::parse_i64(&args[2])?;

    let mut entity = match db.get_entity(key) {
        Some(e) => e,
        None => return Ok(Reply::status("OK")),
    };
    let list = entity.as_list_mut()?;
    match clamp_range(list.len(), start, stop) {
        Some((a, b)) => {
            let trimmed: std::collections::VecDeque<Bytes> =
                list.iter().skip(a).take(b - a + 1).cloned().collect();
            *list = trimmed;
        }
        None => list.clear(),
    }
    if list.is_empty() {
        db.remove(key);
    } else {
        db.put_entity(key.clone(), entity);
    }
    Ok(Reply::status("OK"))
}

fn rpoplpush(db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let (src, dst) = (&args[0], &args[1]);

    // Validate the destination's type before popping anything off the
    // source, so a WRONGTYPE on dst never loses the source's tail value.
    if let Some(existing) = db.get_entity(dst) {
        existing.as_list()?;
    }

    let mut src_entity = match db.get_entity(src) {
        Some(e) => e,
        None => return Ok(NIL.clone()),
    };
    let src_list = src_entity.as_list_mut()?;
    let value = match src_list.pop_back() {
        Some(v) => v,
        None => return Ok(NIL.clone()),
    };
    let src_now_empty = src_list.is_empty();
    if src_now_empty {
        db.remove(src);
    } else {
        db.put_entity(src.clone(), src_entity);
    }

    let mut dst_entity = db.get_entity(dst).unwrap_or_else(|| Entity::List(Default::default()));
    dst_entity.as_list_mut()?.push_front(value.clone());
    db.put_entity(dst.clone(), dst_entity);
    Ok(Reply::bulk(value))
}
