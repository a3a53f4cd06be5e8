// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Redis implementation of the substrate trait.
//!
//! Commands go through a shared [`ConnectionManager`], which reconnects
//! transparently. Subscriptions use a dedicated pub/sub connection per call
//! since Redis connections in subscribe mode cannot run regular commands.

use crate::adapter::{MessageStream, Substrate};
use crate::error::SubstrateError;
use crate::keys;
use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use std::collections::HashMap;

/// Substrate backed by a Redis server.
#[derive(Clone)]
pub struct RedisSubstrate {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisSubstrate {
    /// Connect to Redis and verify the connection with a PING.
    pub async fn connect(url: &str) -> Result<Self, SubstrateError> {
        let client = redis::Client::open(url)
            .map_err(|e| SubstrateError::Unavailable(format!("invalid redis url: {e}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| SubstrateError::Unavailable(e.to_string()))?;

        let substrate = Self { client, conn };
        substrate.ping().await?;
        tracing::info!(url, "substrate connected");
        Ok(substrate)
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl Substrate for RedisSubstrate {
    async fn ping(&self) -> Result<(), SubstrateError> {
        let mut conn = self.conn();
        redis::cmd("PING")
            .query_async::<()>(&mut conn)
            .await
            .map_err(SubstrateError::from)
    }

    async fn priority_push(
        &self,
        pool: &str,
        job_id: &str,
        score: f64,
    ) -> Result<(), SubstrateError> {
        let mut conn = self.conn();
        redis::cmd("ZADD")
            .arg(keys::queue(pool))
            .arg(score)
            .arg(job_id)
            .query_async::<()>(&mut conn)
            .await
            .map_err(SubstrateError::from)
    }

    async fn priority_pop(&self, pool: &str) -> Result<Option<String>, SubstrateError> {
        let mut conn = self.conn();
        let popped: Vec<(String, f64)> = redis::cmd("ZPOPMIN")
            .arg(keys::queue(pool))
            .arg(1)
            .query_async(&mut conn)
            .await?;
        Ok(popped.into_iter().next().map(|(job_id, _score)| job_id))
    }

    async fn queue_len(&self, pool: &str) -> Result<u64, SubstrateError> {
        let mut conn = self.conn();
        redis::cmd("ZCARD")
            .arg(keys::queue(pool))
            .query_async(&mut conn)
            .await
            .map_err(SubstrateError::from)
    }

    async fn remove_from_queue(&self, pool: &str, job_id: &str) -> Result<bool, SubstrateError> {
        let mut conn = self.conn();
        let removed: u64 = redis::cmd("ZREM")
            .arg(keys::queue(pool))
            .arg(job_id)
            .query_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }

    async fn delete_queue(&self, pool: &str) -> Result<u64, SubstrateError> {
        let mut conn = self.conn();
        let len: u64 = redis::cmd("ZCARD")
            .arg(keys::queue(pool))
            .query_async(&mut conn)
            .await?;
        redis::cmd("DEL")
            .arg(keys::queue(pool))
            .query_async::<()>(&mut conn)
            .await?;
        Ok(len)
    }

    async fn job_put(
        &self,
        job_id: &str,
        fields: HashMap<String, String>,
    ) -> Result<(), SubstrateError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        let mut cmd = redis::cmd("HSET");
        cmd.arg(keys::job(job_id));
        for (field, value) in &fields {
            cmd.arg(field).arg(value);
        }
        cmd.query_async::<()>(&mut conn)
            .await
            .map_err(SubstrateError::from)
    }

    async fn job_get(
        &self,
        job_id: &str,
    ) -> Result<Option<HashMap<String, String>>, SubstrateError> {
        let mut conn = self.conn();
        let fields: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(keys::job(job_id))
            .query_async(&mut conn)
            .await?;
        Ok(if fields.is_empty() { None } else { Some(fields) })
    }

    async fn job_delete(&self, job_id: &str) -> Result<(), SubstrateError> {
        let mut conn = self.conn();
        redis::cmd("DEL")
            .arg(keys::job(job_id))
            .query_async::<()>(&mut conn)
            .await
            .map_err(SubstrateError::from)
    }

    async fn registry_put(
        &self,
        worker_id: &str,
        fields: HashMap<String, String>,
        ttl_secs: u64,
    ) -> Result<(), SubstrateError> {
        let mut conn = self.conn();
        let key = keys::worker(worker_id);
        let mut cmd = redis::cmd("HSET");
        cmd.arg(&key);
        for (field, value) in &fields {
            cmd.arg(field).arg(value);
        }
        cmd.query_async::<()>(&mut conn).await?;
        redis::cmd("EXPIRE")
            .arg(&key)
            .arg(ttl_secs)
            .query_async::<()>(&mut conn)
            .await
            .map_err(SubstrateError::from)
    }

    async fn registry_scan(&self) -> Result<Vec<String>, SubstrateError> {
        let mut conn = self.conn();
        let mut worker_ids = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(keys::WORKER_SCAN_PATTERN)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            worker_ids.extend(
                batch
                    .iter()
                    .filter_map(|key| key.strip_prefix(keys::WORKER_KEY_PREFIX))
                    .map(String::from),
            );
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(worker_ids)
    }

    async fn registry_get(
        &self,
        worker_id: &str,
    ) -> Result<Option<HashMap<String, String>>, SubstrateError> {
        let mut conn = self.conn();
        let fields: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(keys::worker(worker_id))
            .query_async(&mut conn)
            .await?;
        Ok(if fields.is_empty() { None } else { Some(fields) })
    }

    async fn registry_delete(&self, worker_id: &str) -> Result<(), SubstrateError> {
        let mut conn = self.conn();
        redis::cmd("DEL")
            .arg(keys::worker(worker_id))
            .query_async::<()>(&mut conn)
            .await
            .map_err(SubstrateError::from)
    }

    async fn pool_member_add(&self, pool: &str, worker_id: &str) -> Result<(), SubstrateError> {
        let mut conn = self.conn();
        redis::cmd("SADD")
            .arg(keys::pool_workers(pool))
            .arg(worker_id)
            .query_async::<()>(&mut conn)
            .await
            .map_err(SubstrateError::from)
    }

    async fn pool_member_remove(&self, pool: &str, worker_id: &str) -> Result<(), SubstrateError> {
        let mut conn = self.conn();
        redis::cmd("SREM")
            .arg(keys::pool_workers(pool))
            .arg(worker_id)
            .query_async::<()>(&mut conn)
            .await
            .map_err(SubstrateError::from)
    }

    async fn dead_letter_push(&self, pool: &str, job_id: &str) -> Result<(), SubstrateError> {
        let mut conn = self.conn();
        redis::cmd("LPUSH")
            .arg(keys::dead_letter(pool))
            .arg(job_id)
            .query_async::<()>(&mut conn)
            .await
            .map_err(SubstrateError::from)
    }

    async fn dead_letter_all(&self, pool: &str) -> Result<Vec<String>, SubstrateError> {
        let mut conn = self.conn();
        redis::cmd("LRANGE")
            .arg(keys::dead_letter(pool))
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await
            .map_err(SubstrateError::from)
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), SubstrateError> {
        let mut conn = self.conn();
        redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async::<()>(&mut conn)
            .await
            .map_err(SubstrateError::from)
    }

    async fn subscribe(&self, channel: &str) -> Result<MessageStream, SubstrateError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| SubstrateError::Unavailable(e.to_string()))?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(SubstrateError::from)?;

        let stream = pubsub
            .into_on_message()
            .filter_map(|msg| async move { msg.get_payload::<String>().ok() });
        Ok(Box::pin(stream))
    }
}
