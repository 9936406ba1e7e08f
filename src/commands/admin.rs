//! Connection/admin commands (§6): PING, ECHO.

use std::collections::HashMap;

use bytes::Bytes;

use crate::db::Db;
use crate::dispatcher::CallContext;
use crate::error::DispatchError;
use crate::registry::{CommandSpec, KeySpec};
use crate::reply::{Reply, PONG};

pub(crate) fn register(t: &mut HashMap<&'static str, CommandSpec>) {
    crate::commands::register!(t, "ping", ping, |_: &[Bytes]| KeySpec::none(), -1, false);
    crate::commands::register!(t, "echo", echo, |_: &[Bytes]| KeySpec::none(), 2, false);
}

fn ping(_db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    match args.first() {
        Some(msg) => Ok(Reply::bulk(msg.clone())),
        None => Ok(PONG.clone()),
    }
}

fn echo(_db: &Db, args: &[Bytes], _ctx: &mut CallContext) -> Result<Reply, DispatchError> {
    Ok(Reply::bulk(args[0].clone()))
}
