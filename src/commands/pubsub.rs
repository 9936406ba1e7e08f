//! Pub/sub commands (§6 / §4.I): SUBSCRIBE, UNSUBSCRIBE, PUBLISH, plus
//! PSUBSCRIBE/PUNSUBSCRIBE (supplementing the named command set, grounded
//! on the pattern matcher §4.J explicitly being shared with PSUBSCRIBE).
//!
//! None of these touch the keyspace, so every `prepare` here returns
//! `KeySpec::none()` — there is nothing to lock.

use std::collections::HashMap;

use bytes::Bytes;

use crate::db::Db;
use crate::dispatcher::CallContext;
use crate::error::DispatchError;
use crate::registry::{CommandSpec, KeySpec};
use crate::reply::Reply;

pub(crate) fn register(t: &mut HashMap<&'static str, CommandSpec>) {
    crate::commands::register!(t, "subscribe", subscribe, |_: &[Bytes]| KeySpec::none(), -2, false);
    crate::commands::register!(t, "unsubscribe", unsubscribe, |_: &[Bytes]| KeySpec::none(), -1, false);
    crate::commands::register!(t, "psubscribe", psubscribe, |_: &[Bytes]| KeySpec::none(), -2, false);
    crate::commands::register!(t, "punsubscribe", punsubscribe, |_: &[Bytes]| KeySpec::none(), -1, false);
    crate::commands::register!(t, "publish", publish, |_: &[Bytes]| KeySpec::none(), 3, false);
}

fn subscribe(_db: &Db, args: &[Bytes], ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let mut acks = Vec::with_capacity(args.len());
    for channel in args {
        ctx.pubsub.subscribe(ctx.conn.id, &ctx.conn.pubsub_tx, channel.clone());
        ctx.conn.channels.insert(channel.clone());
        acks.push(subscribe_ack("subscribe", channel, ctx.conn.subscription_count()));
    }
    Ok(Reply::Batch(acks))
}

fn psubscribe(_db: &Db, args: &[Bytes], ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let mut acks = Vec::with_capacity(args.len());
    for pattern in args {
        ctx.pubsub.psubscribe(ctx.conn.id, &ctx.conn.pubsub_tx, pattern.clone());
        ctx.conn.patterns.insert(pattern.clone());
        acks.push(subscribe_ack("psubscribe", pattern, ctx.conn.subscription_count()));
    }
    Ok(Reply::Batch(acks))
}

fn unsubscribe(_db: &Db, args: &[Bytes], ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let channels: Vec<Bytes> = if args.is_empty() {
        ctx.conn.channels.iter().cloned().collect()
    } else {
        args.to_vec()
    };
    if channels.is_empty() {
        return Ok(Reply::Batch(vec![subscribe_ack_none("unsubscribe", ctx.conn.subscription_count())]));
    }
    let mut acks = Vec::with_capacity(channels.len());
    for channel in &channels {
        ctx.pubsub.unsubscribe(ctx.conn.id, channel);
        ctx.conn.channels.remove(channel);
        acks.push(subscribe_ack("unsubscribe", channel, ctx.conn.subscription_count()));
    }
    Ok(Reply::Batch(acks))
}

fn punsubscribe(_db: &Db, args: &[Bytes], ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let patterns: Vec<Bytes> = if args.is_empty() {
        ctx.conn.patterns.iter().cloned().collect()
    } else {
        args.to_vec()
    };
    if patterns.is_empty() {
        return Ok(Reply::Batch(vec![subscribe_ack_none("punsubscribe", ctx.conn.subscription_count())]));
    }
    let mut acks = Vec::with_capacity(patterns.len());
    for pattern in &patterns {
        ctx.pubsub.punsubscribe(ctx.conn.id, pattern);
        ctx.conn.patterns.remove(pattern);
        acks.push(subscribe_ack("punsubscribe", pattern, ctx.conn.subscription_count()));
    }
    Ok(Reply::Batch(acks))
}

fn publish(_db: &Db, args: &[Bytes], ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    let delivered = ctx.pubsub.publish(&args[0], args[1].clone());
    Ok(Reply::Integer(delivered as i64))
}

fn subscribe_ack(kind: &'static str, channel: &Bytes, count: usize) -> Reply {
    Reply::Multi(vec![
        Reply::bulk(Bytes::from_static(kind.as_bytes())),
        Reply::bulk(channel.clone()),
        Reply::Integer(count as i64),
    ])
}

fn subscribe_ack_none(kind: &'static str, count: usize) -> Reply {
    Reply::Multi(vec![
        Reply::bulk(Bytes::from_static(kind.as_bytes())),
        Reply::Bulk(None),
        Reply::Integer(count as i64),
    ])
}
