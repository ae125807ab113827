//! Entry Log Commands
//!
//! XADD with trimming, XRANGE with `-`/`+` sentinels, XLEN.

use super::{parse_i64, CmdContext, Registry};
use crate::protocol::Frame;
use crate::storage::{StreamId, Value};

pub(super) fn register(r: &mut Registry) {
    r.register("xadd", |ctx| Box::pin(xadd(ctx)));
    r.register("xrange", |ctx| Box::pin(xrange(ctx)));
    r.register("xlen", |ctx| Box::pin(xlen(ctx)));
}

const ERR_BAD_ID: &str = "ERR Invalid stream ID specified as stream command argument";
const ERR_SMALL_ID: &str =
    "ERR The ID specified in XADD is equal or smaller than the target stream top item";

enum TrimPolicy {
    MaxLen(usize),
    MinId(StreamId),
}

async fn xadd(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() < 5 {
        return Some(Frame::wrong_args("xadd"));
    }
    let key = ctx.arg_str(1);
    let mut nomkstream = false;
    let mut trim = None;
    let mut approx = false;
    let mut limit = None;
    let mut idx = 2;
    let id_token = loop {
        if idx >= ctx.argv.len() {
            return Some(Frame::wrong_args("xadd"));
        }
        match ctx.arg_lower(idx).as_str() {
            "nomkstream" => {
                nomkstream = true;
                idx += 1;
            }
            word @ ("maxlen" | "minid") => {
                idx += 1;
                match ctx.argv.get(idx).map(|b| b.as_ref()) {
                    Some(b"~") => {
                        approx = true;
                        idx += 1;
                    }
                    Some(b"=") => {
                        idx += 1;
                    }
                    _ => {}
                }
                let Some(raw) = ctx.argv.get(idx) else {
                    return Some(Frame::syntax_error());
                };
                trim = Some(if word == "maxlen" {
                    match parse_i64(raw) {
                        Some(n) if n >= 0 => TrimPolicy::MaxLen(n as usize),
                        _ => return Some(Frame::not_integer()),
                    }
                } else {
                    match StreamId::parse(&String::from_utf8_lossy(raw), 0) {
                        Some(id) => TrimPolicy::MinId(id),
                        None => return Some(Frame::error(ERR_BAD_ID)),
                    }
                });
                idx += 1;
            }
            "limit" => {
                idx += 1;
                match ctx.argv.get(idx).and_then(|b| parse_i64(b)) {
                    Some(n) if n >= 0 => limit = Some(n as usize),
                    _ => return Some(Frame::not_integer()),
                }
                idx += 1;
            }
            _ => break ctx.arg_str(idx),
        }
    };
    if limit.is_some() && !approx {
        return Some(Frame::error(
            "ERR syntax error, LIMIT cannot be used without the special ~ option",
        ));
    }
    let fields: Vec<bytes::Bytes> = ctx.argv[idx + 1..].to_vec();
    if fields.is_empty() || fields.len() % 2 != 0 {
        return Some(Frame::wrong_args("xadd"));
    }

    ctx.db.check_ttl(&key);
    let _guard = ctx.db.locks().lock(&key);
    let stream = match ctx.db.data().get(&key) {
        Some(Value::Stream(s)) => s,
        Some(_) => return Some(Frame::wrong_type()),
        None => {
            if nomkstream {
                return Some(Frame::NullBulk);
            }
            let value = Value::new_stream();
            ctx.db.data().set(&key, value.clone());
            match value {
                Value::Stream(s) => s,
                _ => unreachable!(),
            }
        }
    };
    let mut stream = stream.write().unwrap();
    let id = if id_token == "*" {
        stream.add_auto(fields)
    } else {
        let Some(id) = StreamId::parse(&id_token, 0) else {
            return Some(Frame::error(ERR_BAD_ID));
        };
        match stream.add(id, fields) {
            Ok(id) => id,
            Err(()) => return Some(Frame::error(ERR_SMALL_ID)),
        }
    };
    match trim {
        Some(TrimPolicy::MaxLen(n)) => {
            stream.trim_max_len(n, limit.unwrap_or(0));
        }
        Some(TrimPolicy::MinId(min)) => {
            stream.trim_min_id(min, limit.unwrap_or(0));
        }
        None => {}
    }
    Some(Frame::bulk(id.format().into_bytes()))
}

async fn xrange(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() != 4 {
        return Some(Frame::wrong_args("xrange"));
    }
    let key = ctx.arg_str(1);
    let start = match ctx.argv[2].as_ref() {
        b"-" => StreamId::MIN,
        raw => match StreamId::parse(&String::from_utf8_lossy(raw), 0) {
            Some(id) => id,
            None => return Some(Frame::error(ERR_BAD_ID)),
        },
    };
    let end = match ctx.argv[3].as_ref() {
        b"+" => StreamId::MAX,
        raw => match StreamId::parse(&String::from_utf8_lossy(raw), i64::MAX) {
            Some(id) => id,
            None => return Some(Frame::error(ERR_BAD_ID)),
        },
    };

    if !ctx.db.check_ttl(&key) {
        return Some(Frame::Array(vec![]));
    }
    let _guard = ctx.db.locks().rlock(&key);
    let stream = match ctx.db.data().get(&key) {
        None => return Some(Frame::Array(vec![])),
        Some(Value::Stream(s)) => s,
        Some(_) => return Some(Frame::wrong_type()),
    };
    let entries = stream.read().unwrap().range(start, end);
    let reply = entries
        .into_iter()
        .map(|(id, fields)| {
            Frame::Array(vec![
                Frame::bulk(id.format().into_bytes()),
                Frame::Array(fields.into_iter().map(Frame::Bulk).collect()),
            ])
        })
        .collect();
    Some(Frame::Array(reply))
}

async fn xlen(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() != 2 {
        return Some(Frame::wrong_args("xlen"));
    }
    let key = ctx.arg_str(1);
    if !ctx.db.check_ttl(&key) {
        return Some(Frame::Integer(0));
    }
    let _guard = ctx.db.locks().rlock(&key);
    match ctx.db.data().get(&key) {
        None => Some(Frame::Integer(0)),
        Some(Value::Stream(s)) => Some(Frame::Integer(s.read().unwrap().len() as i64)),
        Some(_) => Some(Frame::wrong_type()),
    }
}
