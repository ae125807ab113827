//! Hash Commands

use super::{CmdContext, Registry};
use crate::protocol::Frame;
use crate::storage::Value;

pub(super) fn register(r: &mut Registry) {
    r.register("hset", |ctx| Box::pin(hset(ctx)));
    r.register("hget", |ctx| Box::pin(hget(ctx)));
    r.register("hdel", |ctx| Box::pin(hdel(ctx)));
    r.register("hexists", |ctx| Box::pin(hexists(ctx)));
    r.register("hlen", |ctx| Box::pin(hlen(ctx)));
}

async fn hset(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() < 4 || ctx.argv.len() % 2 != 0 {
        return Some(Frame::wrong_args("hset"));
    }
    let key = ctx.arg_str(1);
    ctx.db.check_ttl(&key);
    let _guard = ctx.db.locks().lock(&key);
    let hash = match ctx.db.data().get(&key) {
        Some(Value::Hash(h)) => h,
        Some(_) => return Some(Frame::wrong_type()),
        None => {
            let value = Value::new_hash();
            ctx.db.data().set(&key, value.clone());
            match value {
                Value::Hash(h) => h,
                _ => unreachable!(),
            }
        }
    };
    let mut hash = hash.write().unwrap();
    let mut added = 0i64;
    for pair in ctx.argv[2..].chunks(2) {
        let field = String::from_utf8_lossy(&pair[0]).into_owned();
        if hash.insert(field, pair[1].clone()).is_none() {
            added += 1;
        }
    }
    Some(Frame::Integer(added))
}

async fn hget(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() != 3 {
        return Some(Frame::wrong_args("hget"));
    }
    let key = ctx.arg_str(1);
    if !ctx.db.check_ttl(&key) {
        return Some(Frame::NullBulk);
    }
    let _guard = ctx.db.locks().rlock(&key);
    match ctx.db.data().get(&key) {
        None => Some(Frame::NullBulk),
        Some(Value::Hash(h)) => match h.read().unwrap().get(&ctx.arg_str(2)) {
            Some(value) => Some(Frame::Bulk(value.clone())),
            None => Some(Frame::NullBulk),
        },
        Some(_) => Some(Frame::wrong_type()),
    }
}

async fn hdel(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() < 3 {
        return Some(Frame::wrong_args("hdel"));
    }
    let key = ctx.arg_str(1);
    if !ctx.db.check_ttl(&key) {
        return Some(Frame::Integer(0));
    }
    let _guard = ctx.db.locks().lock(&key);
    let hash = match ctx.db.data().get(&key) {
        None => return Some(Frame::Integer(0)),
        Some(Value::Hash(h)) => h,
        Some(_) => return Some(Frame::wrong_type()),
    };
    let (removed, now_empty) = {
        let mut hash = hash.write().unwrap();
        let mut removed = 0i64;
        for i in 2..ctx.argv.len() {
            if hash.remove(&ctx.arg_str(i)).is_some() {
                removed += 1;
            }
        }
        (removed, hash.is_empty())
    };
    if now_empty {
        ctx.db.remove_key(&key);
    }
    Some(Frame::Integer(removed))
}

async fn hexists(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() != 3 {
        return Some(Frame::wrong_args("hexists"));
    }
    let key = ctx.arg_str(1);
    if !ctx.db.check_ttl(&key) {
        return Some(Frame::Integer(0));
    }
    let _guard = ctx.db.locks().rlock(&key);
    match ctx.db.data().get(&key) {
        None => Some(Frame::Integer(0)),
        Some(Value::Hash(h)) => Some(Frame::Integer(
            h.read().unwrap().contains_key(&ctx.arg_str(2)) as i64,
        )),
        Some(_) => Some(Frame::wrong_type()),
    }
}

async fn hlen(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() != 2 {
        return Some(Frame::wrong_args("hlen"));
    }
    let key = ctx.arg_str(1);
    if !ctx.db.check_ttl(&key) {
        return Some(Frame::Integer(0));
    }
    let _guard = ctx.db.locks().rlock(&key);
    match ctx.db.data().get(&key) {
        None => Some(Frame::Integer(0)),
        Some(Value::Hash(h)) => Some(Frame::Integer(h.read().unwrap().len() as i64)),
        Some(_) => Some(Frame::wrong_type()),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::*;
    use super::*;
    use crate::storage::Db;

    #[tokio::test]
    async fn test_hset_hget() {
        let db = Db::new(100);
        let reply = hset(ctx(&db, "hset h f1 v1 f2 v2")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b":2\r\n");
        // Overwriting an existing field adds nothing.
        let reply = hset(ctx(&db, "hset h f1 v9")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b":0\r\n");
        let reply = hget(ctx(&db, "hget h f1")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b"$2\r\nv9\r\n");
        let reply = hget(ctx(&db, "hget h nope")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b"$-1\r\n");
    }

    #[tokio::test]
    async fn test_hdel_deletes_empty_hash() {
        let db = Db::new(100);
        hset(ctx(&db, "hset h f v")).await;
        let reply = hdel(ctx(&db, "hdel h f ghost")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b":1\r\n");
        assert!(db.data().get("h").is_none());
    }

    #[tokio::test]
    async fn test_hexists_hlen() {
        let db = Db::new(100);
        hset(ctx(&db, "hset h a 1 b 2")).await;
        let reply = hexists(ctx(&db, "hexists h a")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b":1\r\n");
        let reply = hexists(ctx(&db, "hexists h z")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b":0\r\n");
        let reply = hlen(ctx(&db, "hlen h")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b":2\r\n");
    }
}
