//! Ordered Set Commands
//!
//! ZADD with its option matrix, ZRANGE in index/score/lex modes, ZREM.

use super::{parse_f64, parse_i64, CmdContext, Registry};
use crate::protocol::Frame;
use crate::storage::Value;

pub(super) fn register(r: &mut Registry) {
    r.register("zadd", |ctx| Box::pin(zadd(ctx)));
    r.register("zrange", |ctx| Box::pin(zrange(ctx)));
    r.register("zrem", |ctx| Box::pin(zrem(ctx)));
}

/// Reply form of a score: integral values print without a decimal point,
/// infinities as `inf`/`-inf`.
pub(crate) fn format_score(score: f64) -> String {
    if score == f64::INFINITY {
        "inf".to_string()
    } else if score == f64::NEG_INFINITY {
        "-inf".to_string()
    } else if score.fract() == 0.0 && score.abs() < 1e17 {
        format!("{}", score as i64)
    } else {
        format!("{}", score)
    }
}

async fn zadd(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() < 4 {
        return Some(Frame::wrong_args("zadd"));
    }
    let key = ctx.arg_str(1);
    let (mut nx, mut xx, mut gt, mut lt, mut ch, mut incr) =
        (false, false, false, false, false, false);
    let mut idx = 2;
    while idx < ctx.argv.len() {
        match ctx.arg_lower(idx).as_str() {
            "nx" => nx = true,
            "xx" => xx = true,
            "gt" => gt = true,
            "lt" => lt = true,
            "ch" => ch = true,
            "incr" => incr = true,
            _ => break,
        }
        idx += 1;
    }
    if (gt && lt) || (nx && gt) || (nx && lt) {
        return Some(Frame::error(
            "ERR GT, LT, and/or NX options at the same time are not compatible",
        ));
    }
    if nx && xx {
        return Some(Frame::error(
            "ERR XX and NX options at the same time are not compatible",
        ));
    }
    let pairs = &ctx.argv[idx..];
    if pairs.is_empty() || pairs.len() % 2 != 0 {
        return Some(Frame::syntax_error());
    }
    if incr && pairs.len() != 2 {
        return Some(Frame::error(
            "ERR INCR option supports a single increment-element pair",
        ));
    }

    ctx.db.check_ttl(&key);
    let _guard = ctx.db.locks().lock(&key);
    let zset = match ctx.db.data().get(&key) {
        Some(Value::Zset(z)) => z,
        Some(_) => return Some(Frame::wrong_type()),
        None => {
            let value = Value::new_zset();
            ctx.db.data().set(&key, value.clone());
            match value {
                Value::Zset(z) => z,
                _ => unreachable!(),
            }
        }
    };
    let mut zset = zset.write().unwrap();

    let mut counted = 0i64;
    let mut incr_result = None;
    let mut incr_skipped = false;
    for pair in pairs.chunks(2) {
        let Some(score) = parse_f64(&pair[0]) else {
            return Some(Frame::not_float());
        };
        let member = String::from_utf8_lossy(&pair[1]).into_owned();
        let current = zset.score(&member);

        let skip = match current {
            None => xx,
            Some(cur) => {
                nx || (lt && score >= cur) || (gt && score <= cur) || (!incr && score == cur)
            }
        };
        if skip {
            if incr {
                incr_skipped = true;
            }
            continue;
        }

        let new_score = match (incr, current) {
            (true, Some(cur)) => {
                let sum = cur + score;
                if sum.is_nan() {
                    return Some(Frame::error("ERR resulting score is not a number (NaN)"));
                }
                sum
            }
            _ => score,
        };
        let was_new = zset.insert(&member, new_score);
        if was_new {
            counted += 1;
        } else if ch && current != Some(new_score) {
            counted += 1;
        }
        if incr {
            incr_result = Some(new_score);
        }
    }

    if incr {
        return Some(match (incr_skipped, incr_result) {
            (true, _) | (_, None) => Frame::NullBulk,
            (false, Some(score)) => Frame::bulk(format_score(score).into_bytes()),
        });
    }
    Some(Frame::Integer(counted))
}

/// One endpoint of a score interval; `(` prefixes mark it open.
fn parse_score_bound(raw: &[u8]) -> Option<(f64, bool)> {
    if raw.first() == Some(&b'(') {
        parse_f64(&raw[1..]).map(|v| (v, true))
    } else {
        parse_f64(raw).map(|v| (v, false))
    }
}

/// One endpoint of a lexicographic interval.
enum LexBound {
    NegInf,
    PosInf,
    Incl(String),
    Excl(String),
}

impl LexBound {
    fn parse(raw: &[u8]) -> Option<LexBound> {
        match raw.first()? {
            b'-' if raw.len() == 1 => Some(LexBound::NegInf),
            b'+' if raw.len() == 1 => Some(LexBound::PosInf),
            b'[' => Some(LexBound::Incl(
                String::from_utf8_lossy(&raw[1..]).into_owned(),
            )),
            b'(' => Some(LexBound::Excl(
                String::from_utf8_lossy(&raw[1..]).into_owned(),
            )),
            _ => None,
        }
    }

    fn admits_from_below(&self, name: &str) -> bool {
        match self {
            LexBound::NegInf => true,
            LexBound::PosInf => false,
            LexBound::Incl(b) => name >= b.as_str(),
            LexBound::Excl(b) => name > b.as_str(),
        }
    }

    fn admits_from_above(&self, name: &str) -> bool {
        match self {
            LexBound::NegInf => false,
            LexBound::PosInf => true,
            LexBound::Incl(b) => name <= b.as_str(),
            LexBound::Excl(b) => name < b.as_str(),
        }
    }
}

/// LIMIT offset/count over an already selected window: negative or
/// past-the-end offsets empty the result, a non-positive count runs to the
/// end.
fn apply_limit(selected: Vec<(String, f64)>, offset: i64, count: i64) -> Vec<(String, f64)> {
    if offset < 0 || offset as usize >= selected.len() {
        return Vec::new();
    }
    let rest = &selected[offset as usize..];
    let take = if count > 0 {
        (count as usize).min(rest.len())
    } else {
        rest.len()
    };
    rest[..take].to_vec()
}

async fn zrange(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() < 4 {
        return Some(Frame::wrong_args("zrange"));
    }
    let key = ctx.arg_str(1);
    let (mut withscores, mut rev, mut byscore, mut bylex, mut limit) =
        (false, false, false, false, false);
    let (mut offset, mut count) = (0i64, 0i64);
    let mut i = 4;
    while i < ctx.argv.len() {
        match ctx.arg_lower(i).as_str() {
            "withscores" => withscores = true,
            "rev" => rev = true,
            "byscore" => byscore = true,
            "bylex" => bylex = true,
            "limit" => {
                if i + 2 >= ctx.argv.len() {
                    return Some(Frame::syntax_error());
                }
                let (Some(off), Some(cnt)) =
                    (parse_i64(&ctx.argv[i + 1]), parse_i64(&ctx.argv[i + 2]))
                else {
                    return Some(Frame::not_integer());
                };
                offset = off;
                count = cnt;
                limit = true;
                i += 2;
            }
            _ => return Some(Frame::syntax_error()),
        }
        i += 1;
    }
    if byscore && bylex {
        return Some(Frame::syntax_error());
    }
    if limit && !(byscore || bylex) {
        return Some(Frame::error(
            "ERR syntax error, LIMIT is only supported in combination with either BYSCORE or BYLEX",
        ));
    }
    if bylex && withscores {
        return Some(Frame::error(
            "ERR syntax error, WITHSCORES not supported in combination with BYLEX",
        ));
    }

    if !ctx.db.check_ttl(&key) {
        return Some(Frame::Array(vec![]));
    }
    let _guard = ctx.db.locks().rlock(&key);
    let zset = match ctx.db.data().get(&key) {
        None => return Some(Frame::Array(vec![])),
        Some(Value::Zset(z)) => z,
        Some(_) => return Some(Frame::wrong_type()),
    };
    let members = zset.read().unwrap().members_in_order();

    let mut selected = if byscore {
        let (Some((min, min_open)), Some((max, max_open))) = (
            parse_score_bound(&ctx.argv[2]),
            parse_score_bound(&ctx.argv[3]),
        ) else {
            return Some(Frame::error("ERR min or max is not a float"));
        };
        let window: Vec<(String, f64)> = members
            .into_iter()
            .filter(|(_, s)| {
                let above = if min_open { *s > min } else { *s >= min };
                let below = if max_open { *s < max } else { *s <= max };
                above && below
            })
            .collect();
        if limit {
            apply_limit(window, offset, count)
        } else {
            window
        }
    } else if bylex {
        if rev {
            return Some(Frame::Array(vec![]));
        }
        let (Some(min), Some(max)) = (LexBound::parse(&ctx.argv[2]), LexBound::parse(&ctx.argv[3]))
        else {
            return Some(Frame::error("ERR min or max not valid string range item"));
        };
        let window: Vec<(String, f64)> = members
            .into_iter()
            .filter(|(name, _)| min.admits_from_below(name) && max.admits_from_above(name))
            .collect();
        if limit {
            apply_limit(window, offset, count)
        } else {
            window
        }
    } else {
        let (Some(start), Some(stop)) = (parse_i64(&ctx.argv[2]), parse_i64(&ctx.argv[3])) else {
            return Some(Frame::not_integer());
        };
        let len = members.len() as i64;
        let mut start = if start < 0 { start + len } else { start };
        let mut stop = if stop < 0 { stop + len } else { stop };
        if start < 0 {
            start = 0;
        }
        if stop >= len {
            stop = len - 1;
        }
        if start > stop || start >= len {
            Vec::new()
        } else {
            members[start as usize..=stop as usize].to_vec()
        }
    };

    if rev {
        selected.reverse();
    }
    let mut reply = Vec::with_capacity(selected.len() * if withscores { 2 } else { 1 });
    for (member, score) in selected {
        reply.push(Frame::bulk(member.into_bytes()));
        if withscores {
            reply.push(Frame::bulk(format_score(score).into_bytes()));
        }
    }
    Some(Frame::Array(reply))
}

async fn zrem(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() < 3 {
        return Some(Frame::wrong_args("zrem"));
    }
    let key = ctx.arg_str(1);
    if !ctx.db.check_ttl(&key) {
        return Some(Frame::Integer(0));
    }
    let _guard = ctx.db.locks().lock(&key);
    let zset = match ctx.db.data().get(&key) {
        None => return Some(Frame::Integer(0)),
        Some(Value::Zset(z)) => z,
        Some(_) => return Some(Frame::wrong_type()),
    };
    let mut removed = 0i64;
    let now_empty = {
        let mut zset = zset.write().unwrap();
        for i in 2..ctx.argv.len() {
            if zset.remove(&ctx.arg_str(i)) {
                removed += 1;
            }
        }
        zset.is_empty()
    };
    if now_empty {
        ctx.db.remove_key(&key);
    }
    Some(Frame::Integer(removed))
}

#[cfg(test)]
mod tests {
    use super::super::test_util::*;
    use super::*;
    use crate::storage::Db;

    #[tokio::test]
    async fn test_zadd_and_zrange_withscores() {
        let db = Db::new(100);
        zadd(ctx(&db, "zadd S 555 hero")).await;
        zadd(ctx(&db, "zadd S 333 ggbob")).await;
        zadd(ctx(&db, "zadd S 444 jeff")).await;
        zadd(ctx(&db, "zadd S 999 ggbob")).await;
        let reply = zrange(ctx(&db, "zrange S 0 -1 withscores")).await;
        assert_eq!(
            reply_bytes(reply).as_ref(),
            &b"*6\r\n$4\r\nhero\r\n$3\r\n555\r\n$4\r\njeff\r\n$3\r\n444\r\n$5\r\nggbob\r\n$3\r\n999\r\n"[..]
        );
    }

    #[tokio::test]
    async fn test_zadd_returns_added_count() {
        let db = Db::new(100);
        let reply = zadd(ctx(&db, "zadd S 1 a 2 b")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b":2\r\n");
        // Same score again adds nothing.
        let reply = zadd(ctx(&db, "zadd S 1 a")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b":0\r\n");
        // Score change counts only with CH.
        let reply = zadd(ctx(&db, "zadd S 5 a")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b":0\r\n");
        let reply = zadd(ctx(&db, "zadd S ch 6 a")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b":1\r\n");
        let reply = zadd(ctx(&db, "zadd S ch 6 a")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b":0\r\n");
    }

    #[tokio::test]
    async fn test_zadd_nx_xx_gt_lt() {
        let db = Db::new(100);
        zadd(ctx(&db, "zadd S 10 m")).await;
        zadd(ctx(&db, "zadd S nx 20 m")).await;
        assert_eq!(db_score(&db, "m"), 10.0);
        zadd(ctx(&db, "zadd S xx 20 m")).await;
        assert_eq!(db_score(&db, "m"), 20.0);
        zadd(ctx(&db, "zadd S gt 15 m")).await;
        assert_eq!(db_score(&db, "m"), 20.0);
        zadd(ctx(&db, "zadd S gt 30 m")).await;
        assert_eq!(db_score(&db, "m"), 30.0);
        zadd(ctx(&db, "zadd S lt 40 m")).await;
        assert_eq!(db_score(&db, "m"), 30.0);
        zadd(ctx(&db, "zadd S lt 5 m")).await;
        assert_eq!(db_score(&db, "m"), 5.0);
        // xx never creates.
        zadd(ctx(&db, "zadd S xx 1 ghost")).await;
        assert!(score_of(&db, "ghost").is_none());
        let reply = zadd(ctx(&db, "zadd S nx gt 1 q")).await;
        assert_eq!(
            reply_bytes(reply).as_ref(),
            &b"-ERR GT, LT, and/or NX options at the same time are not compatible\r\n"[..]
        );
    }

    #[tokio::test]
    async fn test_zadd_incr() {
        let db = Db::new(100);
        let reply = zadd(ctx(&db, "zadd S incr 5 m")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b"$1\r\n5\r\n");
        let reply = zadd(ctx(&db, "zadd S incr 2.5 m")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b"$3\r\n7.5\r\n");
        // Blocked by NX on an existing member: nil.
        let reply = zadd(ctx(&db, "zadd S nx incr 1 m")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b"$-1\r\n");
        let reply = zadd(ctx(&db, "zadd S incr 1 a 2 b")).await;
        assert_eq!(
            reply_bytes(reply).as_ref(),
            &b"-ERR INCR option supports a single increment-element pair\r\n"[..]
        );
    }

    #[tokio::test]
    async fn test_zrange_index_mode() {
        let db = Db::new(100);
        zadd(ctx(&db, "zadd S 1 a 2 b 3 c 4 d")).await;
        let reply = zrange(ctx(&db, "zrange S 1 2")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b"*2\r\n$1\r\nb\r\n$1\r\nc\r\n");
        let reply = zrange(ctx(&db, "zrange S 0 -1 rev")).await;
        assert_eq!(
            reply_bytes(reply).as_ref(),
            b"*4\r\n$1\r\nd\r\n$1\r\nc\r\n$1\r\nb\r\n$1\r\na\r\n"
        );
        let reply = zrange(ctx(&db, "zrange S 10 20")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b"*0\r\n");
        let reply = zrange(ctx(&db, "zrange missing 0 -1")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b"*0\r\n");
    }

    #[tokio::test]
    async fn test_zrange_byscore() {
        let db = Db::new(100);
        zadd(ctx(&db, "zadd S 1 a 2 b 3 c 4 d")).await;
        let reply = zrange(ctx(&db, "zrange S 2 3 byscore")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b"*2\r\n$1\r\nb\r\n$1\r\nc\r\n");
        // Open endpoint drops the boundary score.
        let reply = zrange(ctx(&db, "zrange S (2 3 byscore")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b"*1\r\n$1\r\nc\r\n");
        let reply = zrange(ctx(&db, "zrange S -inf +inf byscore")).await;
        assert_eq!(
            reply_bytes(reply).as_ref(),
            b"*4\r\n$1\r\na\r\n$1\r\nb\r\n$1\r\nc\r\n$1\r\nd\r\n"
        );
        let reply = zrange(ctx(&db, "zrange S -inf +inf byscore limit 1 2")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b"*2\r\n$1\r\nb\r\n$1\r\nc\r\n");
        // Non-positive count runs to the end.
        let reply = zrange(ctx(&db, "zrange S -inf +inf byscore limit 2 -1")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b"*2\r\n$1\r\nc\r\n$1\r\nd\r\n");
        let reply = zrange(ctx(&db, "zrange S abc 3 byscore")).await;
        assert_eq!(
            reply_bytes(reply).as_ref(),
            b"-ERR min or max is not a float\r\n"
        );
    }

    #[tokio::test]
    async fn test_zrange_bylex() {
        let db = Db::new(100);
        zadd(ctx(&db, "zadd S 0 apple 0 banana 0 cherry")).await;
        let reply = zrange(ctx(&db, "zrange S - + bylex")).await;
        assert_eq!(
            reply_bytes(reply).as_ref(),
            b"*3\r\n$5\r\napple\r\n$6\r\nbanana\r\n$6\r\ncherry\r\n"
        );
        let reply = zrange(ctx(&db, "zrange S (apple [cherry bylex")).await;
        assert_eq!(
            reply_bytes(reply).as_ref(),
            b"*2\r\n$6\r\nbanana\r\n$6\r\ncherry\r\n"
        );
        let reply = zrange(ctx(&db, "zrange S - + bylex withscores")).await;
        assert_eq!(
            reply_bytes(reply).as_ref(),
            &b"-ERR syntax error, WITHSCORES not supported in combination with BYLEX\r\n"[..]
        );
    }

    #[tokio::test]
    async fn test_zrange_limit_requires_mode() {
        let db = Db::new(100);
        zadd(ctx(&db, "zadd S 1 a")).await;
        let reply = zrange(ctx(&db, "zrange S 0 -1 limit 0 1")).await;
        assert_eq!(
            reply_bytes(reply).as_ref(),
            &b"-ERR syntax error, LIMIT is only supported in combination with either BYSCORE or BYLEX\r\n"[..]
        );
    }

    #[tokio::test]
    async fn test_zrem() {
        let db = Db::new(100);
        zadd(ctx(&db, "zadd S 1 a 2 b 3 c")).await;
        let reply = zrem(ctx(&db, "zrem S a b ghost")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b":2\r\n");
        let reply = zrem(ctx(&db, "zrem S c")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b":1\r\n");
        // Last member removed the whole key.
        assert!(db.data().get("S").is_none());
        let reply = zrem(ctx(&db, "zrem S x")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b":0\r\n");
    }

    #[test]
    fn test_format_score() {
        assert_eq!(format_score(555.0), "555");
        assert_eq!(format_score(-2.0), "-2");
        assert_eq!(format_score(7.5), "7.5");
        assert_eq!(format_score(f64::INFINITY), "inf");
        assert_eq!(format_score(f64::NEG_INFINITY), "-inf");
    }

    fn score_of(db: &Db, member: &str) -> Option<f64> {
        match db.data().get("S") {
            Some(Value::Zset(z)) => z.read().unwrap().score(member),
            _ => None,
        }
    }

    fn db_score(db: &Db, member: &str) -> f64 {
        score_of(db, member).expect("member present")
    }
}
