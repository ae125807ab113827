//! String Commands
//!
//! SET with its option matrix, GET, and the numeric/bulk family.

use bytes::{Bytes, BytesMut};

use super::{parse_i64, CmdContext, Registry};
use crate::protocol::Frame;
use crate::storage::{now_secs, Value};

pub(super) fn register(r: &mut Registry) {
    r.register("set", |ctx| Box::pin(set(ctx)));
    r.register("get", |ctx| Box::pin(get(ctx)));
    r.register("mset", |ctx| Box::pin(mset(ctx)));
    r.register("mget", |ctx| Box::pin(mget(ctx)));
    r.register("strlen", |ctx| Box::pin(strlen(ctx)));
    r.register("append", |ctx| Box::pin(append(ctx)));
    r.register("incr", |ctx| Box::pin(incr(ctx)));
    r.register("decr", |ctx| Box::pin(decr(ctx)));
    r.register("incrby", |ctx| Box::pin(incrby(ctx)));
    r.register("decrby", |ctx| Box::pin(decrby(ctx)));
}

/// Parsed SET options. `expire_at` is absolute unix seconds.
#[derive(Default)]
struct SetOpts {
    nx: bool,
    xx: bool,
    get: bool,
    keep_ttl: bool,
    expire_at: Option<i64>,
}

fn parse_set_opts(ctx: &CmdContext) -> Result<SetOpts, Frame> {
    let mut opts = SetOpts::default();
    let mut i = 3;
    while i < ctx.argv.len() {
        match ctx.arg_lower(i).as_str() {
            "nx" => opts.nx = true,
            "xx" => opts.xx = true,
            "get" => opts.get = true,
            "keepttl" => opts.keep_ttl = true,
            word @ ("ex" | "px" | "exat" | "pxat") => {
                if opts.expire_at.is_some() || i + 1 >= ctx.argv.len() {
                    return Err(Frame::syntax_error());
                }
                let Some(n) = parse_i64(&ctx.argv[i + 1]) else {
                    return Err(Frame::not_integer());
                };
                opts.expire_at = Some(match word {
                    "ex" => now_secs() + n,
                    "px" => now_secs() + n / 1000,
                    "exat" => n,
                    _ => n / 1000,
                });
                i += 1;
            }
            _ => return Err(Frame::syntax_error()),
        }
        i += 1;
    }
    if opts.nx && opts.xx {
        return Err(Frame::syntax_error());
    }
    if opts.keep_ttl && opts.expire_at.is_some() {
        return Err(Frame::syntax_error());
    }
    Ok(opts)
}

async fn set(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() < 3 {
        return Some(Frame::wrong_args("set"));
    }
    let opts = match parse_set_opts(&ctx) {
        Ok(opts) => opts,
        Err(reply) => return Some(reply),
    };
    let key = ctx.arg_str(1);
    let value = ctx.argv[2].clone();
    ctx.db.check_ttl(&key);

    let _guard = ctx.db.locks().lock(&key);
    let old = ctx.db.data().get(&key);
    let old_str = match &old {
        Some(Value::Str(b)) => Some(b.clone()),
        Some(_) if opts.get => return Some(Frame::wrong_type()),
        _ => None,
    };
    let failed_reply = || {
        if opts.get {
            match &old_str {
                Some(b) => Frame::Bulk(b.clone()),
                None => Frame::NullBulk,
            }
        } else {
            Frame::NullBulk
        }
    };
    if opts.nx && old.is_some() {
        return Some(failed_reply());
    }
    if opts.xx && old.is_none() {
        return Some(failed_reply());
    }

    ctx.db.data().set(&key, Value::Str(value));
    if !opts.keep_ttl {
        ctx.db.del_ttl(&key);
    }
    if let Some(at) = opts.expire_at {
        ctx.db.set_ttl(&key, at);
    }
    if opts.get {
        return Some(match old_str {
            Some(b) => Frame::Bulk(b),
            None => Frame::NullBulk,
        });
    }
    Some(Frame::ok())
}

async fn get(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() != 2 {
        return Some(Frame::wrong_args("get"));
    }
    let key = ctx.arg_str(1);
    if !ctx.db.check_ttl(&key) {
        return Some(Frame::NullBulk);
    }
    let _guard = ctx.db.locks().rlock(&key);
    match ctx.db.data().get(&key) {
        None => Some(Frame::NullBulk),
        Some(Value::Str(b)) => Some(Frame::Bulk(b)),
        Some(_) => Some(Frame::wrong_type()),
    }
}

async fn mset(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() < 3 || ctx.argv.len() % 2 == 0 {
        return Some(Frame::wrong_args("mset"));
    }
    let keys: Vec<String> = (1..ctx.argv.len()).step_by(2).map(|i| ctx.arg_str(i)).collect();
    let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
    let _guards = ctx.db.locks().lock_multi(&key_refs);
    for (pair, key) in keys.iter().enumerate() {
        let value = ctx.argv[2 + pair * 2].clone();
        ctx.db.data().set(key, Value::Str(value));
        ctx.db.del_ttl(key);
    }
    Some(Frame::ok())
}

async fn mget(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() < 2 {
        return Some(Frame::wrong_args("mget"));
    }
    let mut out = Vec::with_capacity(ctx.argv.len() - 1);
    for i in 1..ctx.argv.len() {
        let key = ctx.arg_str(i);
        if !ctx.db.check_ttl(&key) {
            out.push(Frame::NullBulk);
            continue;
        }
        let _guard = ctx.db.locks().rlock(&key);
        match ctx.db.data().get(&key) {
            Some(Value::Str(b)) => out.push(Frame::Bulk(b)),
            _ => out.push(Frame::NullBulk),
        }
    }
    Some(Frame::Array(out))
}

async fn strlen(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() != 2 {
        return Some(Frame::wrong_args("strlen"));
    }
    let key = ctx.arg_str(1);
    if !ctx.db.check_ttl(&key) {
        return Some(Frame::Integer(0));
    }
    let _guard = ctx.db.locks().rlock(&key);
    match ctx.db.data().get(&key) {
        None => Some(Frame::Integer(0)),
        Some(Value::Str(b)) => Some(Frame::Integer(b.len() as i64)),
        Some(_) => Some(Frame::wrong_type()),
    }
}

async fn append(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() != 3 {
        return Some(Frame::wrong_args("append"));
    }
    let key = ctx.arg_str(1);
    ctx.db.check_ttl(&key);
    let _guard = ctx.db.locks().lock(&key);
    let combined = match ctx.db.data().get(&key) {
        None => ctx.argv[2].clone(),
        Some(Value::Str(old)) => {
            let mut buf = BytesMut::with_capacity(old.len() + ctx.argv[2].len());
            buf.extend_from_slice(&old);
            buf.extend_from_slice(&ctx.argv[2]);
            buf.freeze()
        }
        Some(_) => return Some(Frame::wrong_type()),
    };
    let len = combined.len() as i64;
    ctx.db.data().set(&key, Value::Str(combined));
    Some(Frame::Integer(len))
}

/// Shared add-to-counter path for INCR/DECR and the BY variants.
fn add_to_key(ctx: &CmdContext, key: &str, delta: i64) -> Frame {
    ctx.db.check_ttl(key);
    let _guard = ctx.db.locks().lock(key);
    let current = match ctx.db.data().get(key) {
        None => 0,
        Some(Value::Str(b)) => match parse_i64(&b) {
            Some(n) => n,
            None => return Frame::not_integer(),
        },
        Some(_) => return Frame::wrong_type(),
    };
    let Some(next) = current.checked_add(delta) else {
        return Frame::not_integer();
    };
    ctx.db
        .data()
        .set(key, Value::Str(Bytes::from(next.to_string())));
    Frame::Integer(next)
}

async fn incr(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() != 2 {
        return Some(Frame::wrong_args("incr"));
    }
    Some(add_to_key(&ctx, &ctx.arg_str(1), 1))
}

async fn decr(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() != 2 {
        return Some(Frame::wrong_args("decr"));
    }
    Some(add_to_key(&ctx, &ctx.arg_str(1), -1))
}

async fn incrby(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() != 3 {
        return Some(Frame::wrong_args("incrby"));
    }
    let Some(delta) = parse_i64(&ctx.argv[2]) else {
        return Some(Frame::not_integer());
    };
    Some(add_to_key(&ctx, &ctx.arg_str(1), delta))
}

async fn decrby(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() != 3 {
        return Some(Frame::wrong_args("decrby"));
    }
    let Some(delta) = parse_i64(&ctx.argv[2]) else {
        return Some(Frame::not_integer());
    };
    let Some(delta) = delta.checked_neg() else {
        return Some(Frame::not_integer());
    };
    Some(add_to_key(&ctx, &ctx.arg_str(1), delta))
}
