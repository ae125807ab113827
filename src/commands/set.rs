//! Set Commands

use super::{CmdContext, Registry};
use crate::protocol::Frame;
use crate::storage::Value;

pub(super) fn register(r: &mut Registry) {
    r.register("sadd", |ctx| Box::pin(sadd(ctx)));
    r.register("srem", |ctx| Box::pin(srem(ctx)));
    r.register("sismember", |ctx| Box::pin(sismember(ctx)));
    r.register("smembers", |ctx| Box::pin(smembers(ctx)));
    r.register("scard", |ctx| Box::pin(scard(ctx)));
}

async fn sadd(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() < 3 {
        return Some(Frame::wrong_args("sadd"));
    }
    let key = ctx.arg_str(1);
    ctx.db.check_ttl(&key);
    let _guard = ctx.db.locks().lock(&key);
    let set = match ctx.db.data().get(&key) {
        Some(Value::Set(s)) => s,
        Some(_) => return Some(Frame::wrong_type()),
        None => {
            let value = Value::new_set();
            ctx.db.data().set(&key, value.clone());
            match value {
                Value::Set(s) => s,
                _ => unreachable!(),
            }
        }
    };
    let mut set = set.write().unwrap();
    let mut added = 0i64;
    for i in 2..ctx.argv.len() {
        if set.insert(ctx.arg_str(i)) {
            added += 1;
        }
    }
    Some(Frame::Integer(added))
}

async fn srem(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() < 3 {
        return Some(Frame::wrong_args("srem"));
    }
    let key = ctx.arg_str(1);
    if !ctx.db.check_ttl(&key) {
        return Some(Frame::Integer(0));
    }
    let _guard = ctx.db.locks().lock(&key);
    let set = match ctx.db.data().get(&key) {
        None => return Some(Frame::Integer(0)),
        Some(Value::Set(s)) => s,
        Some(_) => return Some(Frame::wrong_type()),
    };
    let (removed, now_empty) = {
        let mut set = set.write().unwrap();
        let mut removed = 0i64;
        for i in 2..ctx.argv.len() {
            if set.remove(&ctx.arg_str(i)) {
                removed += 1;
            }
        }
        (removed, set.is_empty())
    };
    if now_empty {
        ctx.db.remove_key(&key);
    }
    Some(Frame::Integer(removed))
}

async fn sismember(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() != 3 {
        return Some(Frame::wrong_args("sismember"));
    }
    let key = ctx.arg_str(1);
    if !ctx.db.check_ttl(&key) {
        return Some(Frame::Integer(0));
    }
    let _guard = ctx.db.locks().rlock(&key);
    match ctx.db.data().get(&key) {
        None => Some(Frame::Integer(0)),
        Some(Value::Set(s)) => Some(Frame::Integer(
            s.read().unwrap().contains(&ctx.arg_str(2)) as i64,
        )),
        Some(_) => Some(Frame::wrong_type()),
    }
}

async fn smembers(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() != 2 {
        return Some(Frame::wrong_args("smembers"));
    }
    let key = ctx.arg_str(1);
    if !ctx.db.check_ttl(&key) {
        return Some(Frame::Array(vec![]));
    }
    let _guard = ctx.db.locks().rlock(&key);
    match ctx.db.data().get(&key) {
        None => Some(Frame::Array(vec![])),
        Some(Value::Set(s)) => {
            let mut members: Vec<String> = s.read().unwrap().iter().cloned().collect();
            members.sort();
            Some(Frame::Array(
                members
                    .into_iter()
                    .map(|m| Frame::bulk(m.into_bytes()))
                    .collect(),
            ))
        }
        Some(_) => Some(Frame::wrong_type()),
    }
}

async fn scard(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() != 2 {
        return Some(Frame::wrong_args("scard"));
    }
    let key = ctx.arg_str(1);
    if !ctx.db.check_ttl(&key) {
        return Some(Frame::Integer(0));
    }
    let _guard = ctx.db.locks().rlock(&key);
    match ctx.db.data().get(&key) {
        None => Some(Frame::Integer(0)),
        Some(Value::Set(s)) => Some(Frame::Integer(s.read().unwrap().len() as i64)),
        Some(_) => Some(Frame::wrong_type()),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::*;
    use super::*;
    use crate::storage::Db;

    #[tokio::test]
    async fn test_sadd_smembers() {
        let db = Db::new(100);
        let reply = sadd(ctx(&db, "sadd s a b a")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b":2\r\n");
        let reply = smembers(ctx(&db, "smembers s")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b"*2\r\n$1\r\na\r\n$1\r\nb\r\n");
        let reply = scard(ctx(&db, "scard s")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b":2\r\n");
    }

    #[tokio::test]
    async fn test_srem_deletes_empty_set() {
        let db = Db::new(100);
        sadd(ctx(&db, "sadd s a")).await;
        let reply = sismember(ctx(&db, "sismember s a")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b":1\r\n");
        let reply = srem(ctx(&db, "srem s a")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b":1\r\n");
        assert!(db.data().get("s").is_none());
    }
}
