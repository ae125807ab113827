//! Pub/Sub Commands
//!
//! SUBSCRIBE parks the connection and receives pushes written by publishers
//! directly to its socket; PUBLISH fans out synchronously and reports the
//! receiver count. A subscriber unsubscribes itself when its connection
//! context is cancelled.

use tracing::debug;
use uuid::Uuid;

use super::{CmdContext, Registry};
use crate::protocol::Frame;

pub(super) fn register(r: &mut Registry) {
    r.register("subscribe", |ctx| Box::pin(subscribe(ctx)));
    r.register("publish", |ctx| Box::pin(publish(ctx)));
}

async fn subscribe(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() < 2 {
        return Some(Frame::wrong_args("subscribe"));
    }
    let channels: Vec<String> = (1..ctx.argv.len()).map(|i| ctx.arg_str(i)).collect();
    let mut registered: Vec<(String, Uuid)> = Vec::with_capacity(channels.len());
    for channel in &channels {
        let (id, count) = ctx.db.channels().subscribe(channel, ctx.conn.clone());
        registered.push((channel.clone(), id));
        let confirm = Frame::Array(vec![
            Frame::bulk(&b"subscribe"[..]),
            Frame::bulk(channel.as_bytes().to_vec()),
            Frame::Integer(count as i64),
        ]);
        if ctx.conn.write_frame(&confirm).await.is_err() {
            // Client already gone; roll back what was registered.
            for (channel, id) in registered {
                ctx.db.channels().unsubscribe(&channel, id);
            }
            return None;
        }
    }

    // Messages reach the socket straight from publishers. Park here until
    // the connection context cancels, then deregister.
    ctx.cancel.cancelled().await;
    for (channel, id) in registered {
        ctx.db.channels().unsubscribe(&channel, id);
    }
    debug!("subscriber exited");
    None
}

async fn publish(ctx: CmdContext) -> Option<Frame> {
    if ctx.argv.len() != 3 {
        return Some(Frame::wrong_args("publish"));
    }
    let channel = ctx.arg_str(1);
    let receivers = ctx.db.channels().publish(&channel, ctx.argv[2].clone()).await;
    Some(Frame::Integer(receivers as i64))
}

#[cfg(test)]
mod tests {
    use super::super::test_util::*;
    use super::*;
    use crate::server::conn::ConnWriter;
    use crate::storage::Db;
    use bytes::Bytes;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio_util::sync::CancellationToken;

    fn subscriber_ctx(db: &Db, line: &str, conn: ConnWriter) -> CmdContext {
        CmdContext {
            db: db.clone(),
            argv: line
                .split_whitespace()
                .map(|s| Bytes::from(s.to_string()))
                .collect(),
            conn,
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn test_subscribe_publish_roundtrip() {
        let db = Db::new(100);
        let (mut client, server) = tokio::io::duplex(1024);
        let context = subscriber_ctx(&db, "subscribe ch", ConnWriter::new(server));
        let cancel = context.cancel.clone();
        let subscriber = tokio::spawn(async move { subscribe(context).await });

        // Wait for the registration to land.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let reply = publish(ctx(&db, "publish ch hi")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b":1\r\n");

        let mut buf = vec![0u8; 256];
        let read = client.read(&mut buf).await.unwrap();
        let text = String::from_utf8_lossy(&buf[..read]).into_owned();
        assert!(text.contains("subscribe"));
        assert!(text.contains("message"));
        assert!(text.contains("hi"));

        // Disconnect: the subscriber exits and the channel is collected.
        cancel.cancel();
        assert!(subscriber.await.unwrap().is_none());
        assert_eq!(db.channels().channel_count(), 0);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let db = Db::new(100);
        let reply = publish(ctx(&db, "publish nowhere msg")).await;
        assert_eq!(reply_bytes(reply).as_ref(), b":0\r\n");
    }

    #[tokio::test]
    async fn test_subscribe_multiple_channels() {
        let db = Db::new(100);
        let (_client, server) = tokio::io::duplex(1024);
        let context = subscriber_ctx(&db, "subscribe a b c", ConnWriter::new(server));
        let cancel = context.cancel.clone();
        let subscriber = tokio::spawn(async move { subscribe(context).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(db.channels().channel_count(), 3);
        cancel.cancel();
        subscriber.await.unwrap();
        assert_eq!(db.channels().channel_count(), 0);
    }
}
