//! Publish/Subscribe Fabric
//!
//! Per-channel subscriber registries stored in a sharded map so channel
//! names spread over the same shard layout as data keys. Publishing writes
//! straight to each subscriber's connection; a failed write evicts that
//! subscriber and closes it out of the channel. Channels with no subscribers
//! are deleted.

use bytes::Bytes;
use hashbrown::HashMap;
use std::sync::{Arc, RwLock};
use tracing::warn;
use uuid::Uuid;

use super::sharded_map::ShardedMap;
use crate::protocol::Frame;
use crate::server::conn::ConnWriter;

#[derive(Debug, Default)]
pub struct Channel {
    conns: RwLock<HashMap<Uuid, ConnWriter>>,
}

#[derive(Debug)]
pub struct ChannelMap {
    item: ShardedMap<Arc<Channel>>,
}

impl ChannelMap {
    pub fn new(shard_num: usize) -> Self {
        Self {
            item: ShardedMap::new(shard_num),
        }
    }

    /// Register `conn` on `key`, creating the channel when absent. Returns
    /// the subscription id and the channel's new subscriber count.
    pub fn subscribe(&self, key: &str, conn: ConnWriter) -> (Uuid, usize) {
        let channel = match self.item.get(key) {
            Some(channel) => channel,
            None => {
                self.item.set_if_absent(key, Arc::new(Channel::default()));
                self.item.get(key).expect("channel just created")
            }
        };
        let id = Uuid::new_v4();
        let mut conns = channel.conns.write().unwrap();
        conns.insert(id, conn);
        (id, conns.len())
    }

    /// Drop one subscription; the channel record itself is deleted once the
    /// last subscriber leaves.
    pub fn unsubscribe(&self, key: &str, id: Uuid) {
        let Some(channel) = self.item.get(key) else {
            warn!(channel = key, "unsubscribe from missing channel");
            return;
        };
        let remaining = {
            let mut conns = channel.conns.write().unwrap();
            conns.remove(&id);
            conns.len()
        };
        if remaining == 0 {
            self.item.remove(key);
        }
    }

    /// Fan a `["message", key, payload]` push out to every current
    /// subscriber, synchronously. Returns how many received it.
    pub async fn publish(&self, key: &str, payload: Bytes) -> usize {
        let Some(channel) = self.item.get(key) else {
            return 0;
        };
        let msg = Frame::Array(vec![
            Frame::bulk(&b"message"[..]),
            Frame::bulk(key.as_bytes().to_vec()),
            Frame::Bulk(payload),
        ]);
        let subscribers: Vec<(Uuid, ConnWriter)> = {
            let conns = channel.conns.read().unwrap();
            conns.iter().map(|(id, w)| (*id, w.clone())).collect()
        };
        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, writer) in subscribers {
            match writer.write_frame(&msg).await {
                Ok(()) => delivered += 1,
                Err(_) => dead.push(id),
            }
        }
        if !dead.is_empty() {
            let remaining = {
                let mut conns = channel.conns.write().unwrap();
                for id in dead {
                    conns.remove(&id);
                }
                conns.len()
            };
            if remaining == 0 {
                self.item.remove(key);
            }
        }
        delivered
    }

    pub fn channel_count(&self) -> usize {
        self.item.len()
    }

    pub fn subscriber_count(&self, key: &str) -> usize {
        self.item
            .get(key)
            .map(|ch| ch.conns.read().unwrap().len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let channels = ChannelMap::new(4);
        let (mut client, server) = tokio::io::duplex(1024);
        let (_id, count) = channels.subscribe("ch", ConnWriter::new(server));
        assert_eq!(count, 1);

        let n = channels.publish("ch", Bytes::from_static(b"hi")).await;
        assert_eq!(n, 1);

        let mut buf = vec![0u8; 64];
        let read = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..read], b"*3\r\n$7\r\nmessage\r\n$2\r\nch\r\n$2\r\nhi\r\n");
    }

    #[tokio::test]
    async fn test_publish_to_missing_channel() {
        let channels = ChannelMap::new(4);
        assert_eq!(channels.publish("nobody", Bytes::from_static(b"x")).await, 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_garbage_collects_channel() {
        let channels = ChannelMap::new(4);
        let (_client, server) = tokio::io::duplex(64);
        let (id, _) = channels.subscribe("ch", ConnWriter::new(server));
        assert_eq!(channels.channel_count(), 1);
        channels.unsubscribe("ch", id);
        assert_eq!(channels.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_dead_subscriber_evicted_on_publish() {
        let channels = ChannelMap::new(4);
        let (client, server) = tokio::io::duplex(16);
        let (_id, _) = channels.subscribe("ch", ConnWriter::new(server));
        drop(client);
        assert_eq!(channels.publish("ch", Bytes::from_static(b"x")).await, 0);
        assert_eq!(channels.channel_count(), 0);
    }
}
