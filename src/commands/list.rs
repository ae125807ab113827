//! List Commands
//!
//! The list family, including the LPOS scan options and the blocking pops.
//! Any operation that empties a list deletes the key and its TTL.

use std::time::Duration;

use super::{parse_f64, parse_i64, CmdContext, Registry};
use crate::protocol::Frame;
use crate::storage::Value;

pub(super) fn register(r: &mut Registry) {
    r.register("llen", |ctx| Box::pin(llen(ctx)));
    r.register("lindex", |ctx| Box::pin(lindex(ctx)));
    r.register("lpos", |ctx| Box::pin(lpos(ctx)));
    r.register("lpush", |ctx| Box::pin(lpush(ctx)));
    r.register("lpushx", |ctx| Box::pin(lpushx(ctx)));
    r.register("rpush", |ctx| Box::pin(rpush(ctx)));
    r.register("rpushx", |ctx| Box::pin(rpushx(ctx)));
    r.register("lpop", |ctx| Box::pin(lpop(ctx)));
    r.register("rpop", |ctx| Box::pin(rpop(ctx)));
    r.register("lset", |ctx| Box::pin(lset(ctx)));
    r.register("lrem", |ctx| Box::pin(lrem(ctx)));
    r.register("ltrim", |ctx| Box::pin(ltrim(ctx)));
    r.register("lrange", |ctx| Box::pin(lrange(ctx)));
    r.register("lmove", |ctx| Box::pin(lmove(ctx)));
    r.register("blpop", |ctx| Box::pin(blpop(ctx)));
    r.register("brpop", |ctx| Box::pin(brpop(ctx)));
}

/// Fetch the list at `key`, distinguishing "absent" from "wrong type".
/// Callers hold the appropriate stripe lock.
fn list_at(ctx: &CmdContext, key: &str) -> Result<Option<std::sync::Arc<std::sync::RwLock<crate::storage::List>>>, Frame> {
    match ctx.db.data().get(key) {
        None => Ok(None),
        Some(Value::List(list)) => Ok(Some(list)),
        Some(_) => Err(Frame::wrong_type()),
    }
}

/// Delete the key when its list has emptied. Callers hold the stripe lock.
fn drop_if_empty(ctx: &CmdContext, key: &str, list: &std::sync::Arc<std::sync::RwLock<crate::storage::List>>) {
    if list.read().unwrap().is_empty() {
        ctx.db.remove_key(key);
    }
}

async fn llen(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() != 2 {
        return Some(Frame::wrong_args("llen"));
    }
    let key = ctx.arg_str(1);
    if !ctx.db.check_ttl(&key) {
        return Some(Frame::Integer(0));
    }
    let _guard = ctx.db.locks().rlock(&key);
    match list_at(&ctx, &key) {
        Err(reply) => Some(reply),
        Ok(None) => Some(Frame::Integer(0)),
        Ok(Some(list)) => Some(Frame::Integer(list.read().unwrap().len() as i64)),
    }
}

async fn lindex(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() != 3 {
        return Some(Frame::wrong_args("lindex"));
    }
    let Some(index) = parse_i64(&ctx.argv[2]) else {
        return Some(Frame::not_integer());
    };
    let key = ctx.arg_str(1);
    if !ctx.db.check_ttl(&key) {
        return Some(Frame::NullBulk);
    }
    let _guard = ctx.db.locks().rlock(&key);
    match list_at(&ctx, &key) {
        Err(reply) => Some(reply),
        Ok(None) => Some(Frame::NullBulk),
        Ok(Some(list)) => match list.read().unwrap().index(index) {
            Some(item) => Some(Frame::Bulk(item.clone())),
            None => Some(Frame::NullBulk),
        },
    }
}

async fn lpos(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() < 3 || ctx.argv.len() % 2 != 1 {
        return Some(Frame::wrong_args("lpos"));
    }
    let key = ctx.arg_str(1);
    let elem = ctx.argv[2].clone();
    let mut rank = 1i64;
    let mut count: Option<usize> = None;
    let mut maxlen = 0usize;
    let mut i = 3;
    while i < ctx.argv.len() {
        match ctx.arg_lower(i).as_str() {
            "rank" => {
                let Some(v) = parse_i64(&ctx.argv[i + 1]) else {
                    return Some(Frame::not_integer());
                };
                if v == 0 {
                    return Some(Frame::error("ERR RANK can't be zero"));
                }
                rank = v;
            }
            "count" => {
                let Some(v) = parse_i64(&ctx.argv[i + 1]) else {
                    return Some(Frame::not_integer());
                };
                if v < 0 {
                    return Some(Frame::error("ERR COUNT can't be negative"));
                }
                count = Some(v as usize);
            }
            "maxlen" => {
                let Some(v) = parse_i64(&ctx.argv[i + 1]) else {
                    return Some(Frame::not_integer());
                };
                if v < 0 {
                    return Some(Frame::error("ERR MAXLEN can't be negative"));
                }
                maxlen = v as usize;
            }
            _ => return Some(Frame::syntax_error()),
        }
        i += 2;
    }

    if !ctx.db.check_ttl(&key) {
        return Some(Frame::NullBulk);
    }
    let _guard = ctx.db.locks().rlock(&key);
    let list = match list_at(&ctx, &key) {
        Err(reply) => return Some(reply),
        Ok(None) => return Some(Frame::NullBulk),
        Ok(Some(list)) => list,
    };
    let list = list.read().unwrap();
    match count {
        None => match list.positions(&elem, rank, 1, maxlen).first() {
            Some(&pos) => Some(Frame::Integer(pos as i64)),
            None => Some(Frame::NullBulk),
        },
        Some(limit) => {
            let found = list.positions(&elem, rank, limit, maxlen);
            if found.is_empty() {
                return Some(Frame::NullBulk);
            }
            Some(Frame::Array(
                found.into_iter().map(|p| Frame::Integer(p as i64)).collect(),
            ))
        }
    }
}

async fn push(ctx: CmdContext, verb: &'static str, from_left: bool, require_existing: bool) -> Option<Frame> {
    if ctx.argv.len() < 3 {
        return Some(Frame::wrong_args(verb));
    }
    let key = ctx.arg_str(1);
    ctx.db.check_ttl(&key);
    let _guard = ctx.db.locks().lock(&key);
    let list = match list_at(&ctx, &key) {
        Err(reply) => return Some(reply),
        Ok(Some(list)) => list,
        Ok(None) => {
            if require_existing {
                return Some(Frame::Integer(0));
            }
            let value = Value::new_list();
            ctx.db.data().set(&key, value.clone());
            match value {
                Value::List(list) => list,
                _ => unreachable!(),
            }
        }
    };
    let mut list = list.write().unwrap();
    for item in &ctx.argv[2..] {
        if from_left {
            list.lpush(item.clone());
        } else {
            list.rpush(item.clone());
        }
    }
    Some(Frame::Integer(list.len() as i64))
}

async fn lpush(ctx: CmdContext) -> Option<Frame> {
    push(ctx, "lpush", true, false).await
}

async fn lpushx(ctx: CmdContext) -> Option<Frame> {
    push(ctx, "lpushx", true, true).await
}

async fn rpush(ctx: CmdContext) -> Option<Frame> {
    push(ctx, "rpush", false, false).await
}

async fn rpushx(ctx: CmdContext) -> Option<Frame> {
    push(ctx, "rpushx", false, true).await
}

async fn pop(ctx: CmdContext, verb: &'static str, from_left: bool) -> Option<Frame> {
    if ctx.argv.len() != 2 && ctx.argv.len() != 3 {
        return Some(Frame::wrong_args(verb));
    }
    let mut count = 0usize;
    if ctx.argv.len() == 3 {
        match parse_i64(&ctx.argv[2]) {
            Some(n) if n > 0 => count = n as usize,
            _ => {
                return Some(Frame::error(
                    "ERR value is out of range, must be positive",
                ))
            }
        }
    }
    let key = ctx.arg_str(1);
    if !ctx.db.check_ttl(&key) {
        return Some(Frame::NullBulk);
    }
    let _guard = ctx.db.locks().lock(&key);
    let list = match list_at(&ctx, &key) {
        Err(reply) => return Some(reply),
        Ok(None) => return Some(Frame::NullBulk),
        Ok(Some(list)) => list,
    };
    let reply = {
        let mut inner = list.write().unwrap();
        let mut take = || if from_left { inner.lpop() } else { inner.rpop() };
        if count == 0 {
            match take() {
                Some(item) => Frame::Bulk(item),
                None => Frame::NullBulk,
            }
        } else {
            let mut out = Vec::new();
            for _ in 0..count {
                match take() {
                    Some(item) => out.push(Frame::Bulk(item)),
                    None => break,
                }
            }
            Frame::Array(out)
        }
    };
    drop_if_empty(&ctx, &key, &list);
    Some(reply)
}

async fn lpop(ctx: CmdContext) -> Option<Frame> {
    pop(ctx, "lpop", true).await
}

async fn rpop(ctx: CmdContext) -> Option<Frame> {
    pop(ctx, "rpop", false).await
}

async fn lset(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() != 4 {
        return Some(Frame::wrong_args("lset"));
    }
    let Some(index) = parse_i64(&ctx.argv[2]) else {
        return Some(Frame::not_integer());
    };
    let key = ctx.arg_str(1);
    if !ctx.db.check_ttl(&key) {
        return Some(Frame::error("ERR no such key"));
    }
    let _guard = ctx.db.locks().lock(&key);
    let list = match list_at(&ctx, &key) {
        Err(reply) => return Some(reply),
        Ok(None) => return Some(Frame::error("ERR no such key")),
        Ok(Some(list)) => list,
    };
    if list.write().unwrap().set(index, ctx.argv[3].clone()) {
        Some(Frame::ok())
    } else {
        Some(Frame::error("ERR index out of range"))
    }
}

async fn lrem(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() != 4 {
        return Some(Frame::wrong_args("lrem"));
    }
    let Some(count) = parse_i64(&ctx.argv[2]) else {
        return Some(Frame::not_integer());
    };
    let key = ctx.arg_str(1);
    if !ctx.db.check_ttl(&key) {
        return Some(Frame::Integer(0));
    }
    let _guard = ctx.db.locks().lock(&key);
    let list = match list_at(&ctx, &key) {
        Err(reply) => return Some(reply),
        Ok(None) => return Some(Frame::Integer(0)),
        Ok(Some(list)) => list,
    };
    let removed = list.write().unwrap().remove(&ctx.argv[3], count);
    drop_if_empty(&ctx, &key, &list);
    Some(Frame::Integer(removed as i64))
}

async fn ltrim(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() != 4 {
        return Some(Frame::wrong_args("ltrim"));
    }
    let (Some(start), Some(stop)) = (parse_i64(&ctx.argv[2]), parse_i64(&ctx.argv[3])) else {
        return Some(Frame::not_integer());
    };
    let key = ctx.arg_str(1);
    if !ctx.db.check_ttl(&key) {
        return Some(Frame::ok());
    }
    let _guard = ctx.db.locks().lock(&key);
    let list = match list_at(&ctx, &key) {
        Err(reply) => return Some(reply),
        Ok(None) => return Some(Frame::ok()),
        Ok(Some(list)) => list,
    };
    list.write().unwrap().trim(start, stop);
    drop_if_empty(&ctx, &key, &list);
    Some(Frame::ok())
}

async fn lrange(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() != 4 {
        return Some(Frame::wrong_args("lrange"));
    }
    let (Some(start), Some(stop)) = (parse_i64(&ctx.argv[2]), parse_i64(&ctx.argv[3])) else {
        return Some(Frame::not_integer());
    };
    let key = ctx.arg_str(1);
    if !ctx.db.check_ttl(&key) {
        return Some(Frame::Array(vec![]));
    }
    let _guard = ctx.db.locks().rlock(&key);
    match list_at(&ctx, &key) {
        Err(reply) => Some(reply),
        Ok(None) => Some(Frame::Array(vec![])),
        Ok(Some(list)) => {
            let items = list.read().unwrap().range(start, stop);
            Some(Frame::Array(items.into_iter().map(Frame::Bulk).collect()))
        }
    }
}

async fn lmove(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() != 5 {
        return Some(Frame::wrong_args("lmove"));
    }
    let src = ctx.arg_str(1);
    let dst = ctx.arg_str(2);
    let from = ctx.arg_lower(3);
    let to = ctx.arg_lower(4);
    if !matches!(from.as_str(), "left" | "right") || !matches!(to.as_str(), "left" | "right") {
        return Some(Frame::syntax_error());
    }
    if !ctx.db.check_ttl(&src) {
        return Some(Frame::NullBulk);
    }
    ctx.db.check_ttl(&dst);

    let _guards = ctx.db.locks().lock_multi(&[src.as_str(), dst.as_str()]);
    let src_list = match list_at(&ctx, &src) {
        Err(reply) => return Some(reply),
        Ok(None) => return Some(Frame::NullBulk),
        Ok(Some(list)) => list,
    };
    let dst_list = match list_at(&ctx, &dst) {
        Err(reply) => return Some(reply),
        Ok(Some(list)) => list,
        Ok(None) => {
            let value = Value::new_list();
            ctx.db.data().set(&dst, value.clone());
            match value {
                Value::List(list) => list,
                _ => unreachable!(),
            }
        }
    };

    let item = {
        let mut src_inner = src_list.write().unwrap();
        if from == "left" {
            src_inner.lpop()
        } else {
            src_inner.rpop()
        }
    };
    let Some(item) = item else {
        drop_if_empty(&ctx, &src, &src_list);
        return Some(Frame::NullBulk);
    };
    {
        let mut dst_inner = dst_list.write().unwrap();
        if to == "left" {
            dst_inner.lpush(item.clone());
        } else {
            dst_inner.rpush(item.clone());
        }
    }
    drop_if_empty(&ctx, &src, &src_list);
    Some(Frame::Bulk(item))
}

async fn blpop(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() < 3 {
        return Some(Frame::wrong_args("blpop"));
    }
    bxpop(ctx, true).await
}

async fn brpop(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() < 3 {
        return Some(Frame::wrong_args("brpop"));
    }
    bxpop(ctx, false).await
}

/// Blocking pop over several keys: poll every 100 ms under the stripe locks
/// until a list yields an element, the timeout elapses (nil) or the
/// connection goes away. Timeout 0 waits forever.
async fn bxpop(ctx: CmdContext, from_left: bool) -> Option<Frame> {
    let Some(timeout) = parse_f64(&ctx.argv[ctx.argv.len() - 1]) else {
        return Some(Frame::error("ERR timeout is not a float or out of range"));
    };
    if timeout < 0.0 {
        return Some(Frame::error("ERR timeout is negative"));
    }
    let keys: Vec<String> = (1..ctx.argv.len() - 1).map(|i| ctx.arg_str(i)).collect();
    let deadline = if timeout == 0.0 {
        None
    } else {
        Some(tokio::time::Instant::now() + Duration::from_secs_f64(timeout))
    };
    let mut ticker = tokio::time::interval(Duration::from_millis(100));

    loop {
        for key in &keys {
            ctx.db.check_ttl(key);
            let popped = {
                let _guard = ctx.db.locks().lock(key);
                match ctx.db.data().get(key) {
                    Some(Value::List(list)) => {
                        let item = {
                            let mut inner = list.write().unwrap();
                            if from_left {
                                inner.lpop()
                            } else {
                                inner.rpop()
                            }
                        };
                        if list.read().unwrap().is_empty() {
                            ctx.db.remove_key(key);
                        }
                        item
                    }
                    _ => None,
                }
            };
            if let Some(item) = popped {
                return Some(Frame::Array(vec![
                    Frame::bulk(key.as_bytes().to_vec()),
                    Frame::Bulk(item),
                ]));
            }
        }
        tokio::select! {
            _ = ticker.tick() => {}
            _ = ctx.cancel.cancelled() => return None,
            _ = sleep_until_deadline(deadline) => return Some(Frame::NullBulk),
        }
    }
}

async fn sleep_until_deadline(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
