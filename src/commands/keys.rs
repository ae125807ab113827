//! Keyspace Commands
//!
//! PING, DEL, EXISTS, KEYS, EXPIRE, PERSIST, TTL, TYPE, RENAME.

use super::{parse_i64, CmdContext, Registry};
use crate::protocol::Frame;
use crate::storage::now_secs;

pub(super) fn register(r: &mut Registry) {
    r.register("ping", |ctx| Box::pin(ping(ctx)));
    r.register("del", |ctx| Box::pin(del(ctx)));
    r.register("exists", |ctx| Box::pin(exists(ctx)));
    r.register("keys", |ctx| Box::pin(keys(ctx)));
    r.register("expire", |ctx| Box::pin(expire(ctx)));
    r.register("persist", |ctx| Box::pin(persist(ctx)));
    r.register("ttl", |ctx| Box::pin(ttl(ctx)));
    r.register("type", |ctx| Box::pin(type_of(ctx)));
    r.register("rename", |ctx| Box::pin(rename(ctx)));
}

async fn ping(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() > 2 {
        return Some(Frame::wrong_args("ping"));
    }
    if ctx.argv.len() == 1 {
        Some(Frame::pong())
    } else {
        // Echo reply.
        Some(Frame::Bulk(ctx.argv[1].clone()))
    }
}

async fn del(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() < 2 {
        return Some(Frame::wrong_args("del"));
    }
    let mut deleted = 0i64;
    for i in 1..ctx.argv.len() {
        let key = ctx.arg_str(i);
        ctx.db.check_ttl(&key);
        let _guard = ctx.db.locks().lock(&key);
        if ctx.db.remove_key(&key) {
            deleted += 1;
        }
    }
    Some(Frame::Integer(deleted))
}

async fn exists(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() < 2 {
        return Some(Frame::wrong_args("exists"));
    }
    let mut found = 0i64;
    for i in 1..ctx.argv.len() {
        let key = ctx.arg_str(i);
        if ctx.db.check_ttl(&key) {
            let _guard = ctx.db.locks().rlock(&key);
            if ctx.db.data().get(&key).is_some() {
                found += 1;
            }
        }
    }
    Some(Frame::Integer(found))
}

async fn keys(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() != 2 {
        return Some(Frame::wrong_args("keys"));
    }
    let pattern = ctx.arg_str(1);
    let mut matched = Vec::new();
    for key in ctx.db.data().keys() {
        if ctx.db.check_ttl(&key) && pattern_match(pattern.as_bytes(), key.as_bytes()) {
            matched.push(Frame::bulk(key.into_bytes()));
        }
    }
    Some(Frame::Array(matched))
}

async fn expire(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() < 3 || ctx.argv.len() > 4 {
        return Some(Frame::wrong_args("expire"));
    }
    let Some(seconds) = parse_i64(&ctx.argv[2]) else {
        return Some(Frame::not_integer());
    };
    let at = now_secs() + seconds;
    let opt = if ctx.argv.len() == 4 {
        ctx.arg_lower(3)
    } else {
        String::new()
    };
    let key = ctx.arg_str(1);
    if !ctx.db.check_ttl(&key) {
        return Some(Frame::Integer(0));
    }

    let _guard = ctx.db.locks().lock(&key);
    let current = ctx.db.ttl_of(&key);
    let res = match opt.as_str() {
        "nx" => match current {
            None => ctx.db.set_ttl(&key, at),
            Some(_) => 0,
        },
        "xx" => match current {
            Some(_) => ctx.db.set_ttl(&key, at),
            None => 0,
        },
        "gt" => match current {
            Some(cur) if at > cur => ctx.db.set_ttl(&key, at),
            _ => 0,
        },
        "lt" => match current {
            Some(cur) if at < cur => ctx.db.set_ttl(&key, at),
            _ => 0,
        },
        "" => ctx.db.set_ttl(&key, at),
        other => {
            return Some(Frame::error(format!(
                "ERR Unsupported option {}, expect nx, xx, gt, lt",
                other
            )))
        }
    };
    Some(Frame::Integer(res))
}

async fn persist(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() != 2 {
        return Some(Frame::wrong_args("persist"));
    }
    let key = ctx.arg_str(1);
    if !ctx.db.check_ttl(&key) {
        return Some(Frame::Integer(0));
    }
    let _guard = ctx.db.locks().lock(&key);
    Some(Frame::Integer(ctx.db.del_ttl(&key) as i64))
}

async fn ttl(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() != 2 {
        return Some(Frame::wrong_args("ttl"));
    }
    let key = ctx.arg_str(1);
    if !ctx.db.check_ttl(&key) {
        return Some(Frame::Integer(-2));
    }
    let _guard = ctx.db.locks().rlock(&key);
    if ctx.db.data().get(&key).is_none() {
        return Some(Frame::Integer(-2));
    }
    match ctx.db.ttl_of(&key) {
        None => Some(Frame::Integer(-1)),
        Some(at) => Some(Frame::Integer(at - now_secs())),
    }
}

async fn type_of(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() != 2 {
        return Some(Frame::wrong_args("type"));
    }
    let key = ctx.arg_str(1);
    if !ctx.db.check_ttl(&key) {
        return Some(Frame::simple("none"));
    }
    let _guard = ctx.db.locks().rlock(&key);
    match ctx.db.data().get(&key) {
        None => Some(Frame::simple("none")),
        Some(value) => Some(Frame::simple(value.type_name())),
    }
}

async fn rename(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() != 3 {
        return Some(Frame::wrong_args("rename"));
    }
    let old = ctx.arg_str(1);
    let new = ctx.arg_str(2);
    if !ctx.db.check_ttl(&old) {
        return Some(Frame::error("ERR no such key"));
    }
    let _guards = ctx.db.locks().lock_multi(&[old.as_str(), new.as_str()]);
    let Some(value) = ctx.db.data().get(&old) else {
        return Some(Frame::error("ERR no such key"));
    };
    ctx.db.remove_key(&old);
    ctx.db.remove_key(&new);
    ctx.db.data().set(&new, value);
    Some(Frame::ok())
}

/// Glob match over raw bytes: `*`, `?`, `[set]` and `\` escapes.
pub(crate) fn pattern_match(pattern: &[u8], text: &[u8]) -> bool {
    match (pattern.first(), text.first()) {
        (None, None) => true,
        (None, Some(_)) => false,
        (Some(b'*'), _) => {
            pattern_match(&pattern[1..], text)
                || (!text.is_empty() && pattern_match(pattern, &text[1..]))
        }
        (Some(b'?'), Some(_)) => pattern_match(&pattern[1..], &text[1..]),
        (Some(b'['), Some(&c)) => match pattern.iter().position(|&b| b == b']') {
            Some(close) => {
                pattern[1..close].contains(&c) && pattern_match(&pattern[close + 1..], &text[1..])
            }
            None => false,
        },
        (Some(b'\\'), Some(&c)) if pattern.len() >= 2 => {
            pattern[1] == c && pattern_match(&pattern[2..], &text[1..])
        }
        (Some(&p), Some(&c)) => p == c && pattern_match(&pattern[1..], &text[1..]),
        (Some(_), None) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::*;
    use super::*;
    use crate::storage::{Db, Value};
    use bytes::Bytes;

    #[tokio::test]
    async fn test_del_removes_data_and_ttl() {
        let db = Db::new(100);
        db.data().set("a", Value::Str(Bytes::from_static(b"a")));
        db.data().set("b", Value::Str(Bytes::from_static(b"b")));
        db.set_ttl("b", now_secs() + 10);

        let reply = del(ctx(&db, "del a b")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b":2\r\n");
        assert!(db.data().get("a").is_none());
        assert!(db.data().get("b").is_none());
        assert!(db.ttl_of("b").is_none());
    }

    #[tokio::test]
    async fn test_exists_counts_live_keys() {
        let db = Db::new(100);
        db.data().set("a", Value::Str(Bytes::from_static(b"a")));
        let reply = exists(ctx(&db, "exists a a missing")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b":2\r\n");
    }

    #[tokio::test]
    async fn test_expire_policies() {
        let db = Db::new(100);
        db.data().set("a", Value::Str(Bytes::from_static(b"a")));
        db.data().set("b", Value::Str(Bytes::from_static(b"b")));

        let reply = expire(ctx(&db, "expire a 100 nx")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b":1\r\n");
        // nx again fails, xx succeeds.
        let reply = expire(ctx(&db, "expire a 200 nx")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b":0\r\n");
        let reply = expire(ctx(&db, "expire a 1000 xx")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b":1\r\n");
        let got = db.ttl_of("a").unwrap() - now_secs();
        assert!((999..=1000).contains(&got));

        let reply = expire(ctx(&db, "expire b 100")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b":1\r\n");
        let reply = expire(ctx(&db, "expire b 50 gt")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b":0\r\n");
        let reply = expire(ctx(&db, "expire b 1000 gt")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b":1\r\n");
        let reply = expire(ctx(&db, "expire b 10 lt")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b":1\r\n");
    }

    #[tokio::test]
    async fn test_expire_missing_key() {
        let db = Db::new(100);
        let reply = expire(ctx(&db, "expire nothing 10")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b":0\r\n");
    }

    #[tokio::test]
    async fn test_ttl_and_persist() {
        let db = Db::new(100);
        db.data().set("a", Value::Str(Bytes::from_static(b"a")));
        let reply = ttl(ctx(&db, "ttl a")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b":-1\r\n");
        expire(ctx(&db, "expire a 100")).await;
        let reply = ttl(ctx(&db, "ttl a")).await;
        let text = String::from_utf8(reply_bytes(reply).to_vec()).unwrap();
        let remaining: i64 = text[1..text.len() - 2].parse().unwrap();
        assert!((99..=100).contains(&remaining));
        let reply = persist(ctx(&db, "persist a")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b":1\r\n");
        let reply = ttl(ctx(&db, "ttl a")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b":-1\r\n");
        let reply = ttl(ctx(&db, "ttl missing")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b":-2\r\n");
    }

    #[tokio::test]
    async fn test_type_reports_engine() {
        let db = Db::new(100);
        db.data().set("s", Value::Str(Bytes::from_static(b"v")));
        db.data().set("z", Value::new_zset());
        db.data().set("q", Value::new_stream());
        let reply = type_of(ctx(&db, "type s")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b"+string\r\n");
        let reply = type_of(ctx(&db, "type z")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b"+zset\r\n");
        let reply = type_of(ctx(&db, "type q")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b"+stream\r\n");
        let reply = type_of(ctx(&db, "type nothing")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b"+none\r\n");
    }

    #[tokio::test]
    async fn test_rename_moves_value() {
        let db = Db::new(100);
        db.data().set("k1", Value::Str(Bytes::from_static(b"v1")));
        let reply = rename(ctx(&db, "rename k1 k2")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b"+OK\r\n");
        assert!(db.data().get("k1").is_none());
        match db.data().get("k2") {
            Some(Value::Str(b)) => assert_eq!(b.as_ref(), b"v1"),
            other => panic!("unexpected value {:?}", other),
        }
        let reply = rename(ctx(&db, "rename ghost k3")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b"-ERR no such key\r\n");
    }

    #[test]
    fn test_pattern_match() {
        assert!(pattern_match(b"*", b"anything"));
        assert!(pattern_match(b"k?y", b"key"));
        assert!(pattern_match(b"k[ae]y", b"kay"));
        assert!(!pattern_match(b"k[ae]y", b"kuy"));
        assert!(pattern_match(b"user:*", b"user:42"));
        assert!(!pattern_match(b"user:*", b"session:42"));
        assert!(pattern_match(b"a\\*b", b"a*b"));
        assert!(!pattern_match(b"a\\*b", b"axb"));
    }
}
