use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use storyloom_core::{ContextEvent, Error, Result, SessionContext};

use crate::ContextBus;

const CHANNEL_CAPACITY: usize = 256;

struct LocalChannel {
    sender: broadcast::Sender<ContextEvent>,
    forwarder: JoinHandle<()>,
}

/// Redis-backed Context Bus, usable across multiple running instances.
///
/// Session state lives under `storyloom:session:<id>` with a SETEX TTL, so
/// expiry needs no sweeper. Events go over `storyloom:events:<id>` pubsub;
/// each subscribed session gets one local forwarder task bridging pubsub
/// into a broadcast channel.
///
/// Store or serialization failures are logged and degrade to empty/default
/// values; they are never surfaced to callers.
pub struct RedisContextBus {
    client: redis::Client,
    key_prefix: String,
    channel_prefix: String,
    ttl_seconds: u64,
    local: Mutex<HashMap<String, LocalChannel>>,
}

impl RedisContextBus {
    pub fn new(redis_url: &str) -> Result<Self> {
        Self::with_options(redis_url, "storyloom", 24 * 3600)
    }

    pub fn with_options(redis_url: &str, prefix: &str, ttl_seconds: u64) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(|e| Error::Bus(e.to_string()))?;
        Ok(Self {
            client,
            key_prefix: format!("{prefix}:session:"),
            channel_prefix: format!("{prefix}:events:"),
            ttl_seconds,
            local: Mutex::new(HashMap::new()),
        })
    }

    fn build_key(&self, session_id: &str) -> String {
        format!("{}{}", self.key_prefix, session_id)
    }

    fn build_channel(&self, session_id: &str) -> String {
        format!("{}{}", self.channel_prefix, session_id)
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| Error::Bus(format!("Redis connection failed: {e}")))
    }

    /// Write the context back with a refreshed TTL.
    async fn save(&self, ctx: &SessionContext) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let key = self.build_key(&ctx.session_id);
        let json = serde_json::to_string(ctx)
            .map_err(|e| Error::Bus(format!("Failed to serialize session: {e}")))?;
        redis::cmd("SETEX")
            .arg(&key)
            .arg(self.ttl_seconds)
            .arg(&json)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| Error::Bus(format!("Redis SETEX failed: {e}")))?;
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionContext>> {
        let mut conn = self.get_connection().await?;
        let key = self.build_key(session_id);
        let data: Option<String> = redis::cmd("GET")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Bus(format!("Redis GET failed: {e}")))?;
        match data {
            Some(json) => match serde_json::from_str(&json) {
                Ok(ctx) => Ok(Some(ctx)),
                Err(e) => {
                    // Corrupt entry: treat as no data rather than failing the caller
                    warn!(session_id, error = %e, "Failed to deserialize session, treating as absent");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    fn spawn_forwarder(
        &self,
        session_id: &str,
        sender: broadcast::Sender<ContextEvent>,
    ) -> JoinHandle<()> {
        let client = self.client.clone();
        let channel = self.build_channel(session_id);
        let session = session_id.to_string();
        tokio::spawn(async move {
            let mut pubsub = match client.get_async_pubsub().await {
                Ok(ps) => ps,
                Err(e) => {
                    warn!(session_id = %session, error = %e, "Redis pubsub connection failed");
                    return;
                }
            };
            if let Err(e) = pubsub.subscribe(&channel).await {
                warn!(session_id = %session, error = %e, "Redis SUBSCRIBE failed");
                return;
            }
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(session_id = %session, error = %e, "Unreadable pubsub payload");
                        continue;
                    }
                };
                match serde_json::from_str::<ContextEvent>(&payload) {
                    Ok(event) => {
                        // Err here just means no local receivers right now
                        let _ = sender.send(event);
                    }
                    Err(e) => {
                        warn!(session_id = %session, error = %e, "Dropping undecodable context event");
                    }
                }
            }
        })
    }
}

impl Drop for RedisContextBus {
    fn drop(&mut self) {
        if let Ok(local) = self.local.try_lock() {
            for channel in local.values() {
                channel.forwarder.abort();
            }
        }
    }
}

#[async_trait]
impl ContextBus for RedisContextBus {
    async fn publish(&self, session_id: &str, event: ContextEvent) {
        // Guarantee the session entry exists before the event goes out
        if !self.has_session(session_id).await {
            if let Err(e) = self.save(&SessionContext::new(session_id)).await {
                warn!(session_id, error = %e, "Failed to create session entry on publish");
            }
        }

        let json = match serde_json::to_string(&event) {
            Ok(j) => j,
            Err(e) => {
                warn!(session_id, error = %e, "Failed to serialize context event, dropping");
                return;
            }
        };
        let channel = self.build_channel(session_id);
        match self.get_connection().await {
            Ok(mut conn) => {
                let published: std::result::Result<i64, _> = redis::cmd("PUBLISH")
                    .arg(&channel)
                    .arg(&json)
                    .query_async(&mut conn)
                    .await;
                match published {
                    Ok(receivers) => debug!(session_id, receivers, "Published context event"),
                    Err(e) => warn!(session_id, error = %e, "Redis PUBLISH failed"),
                }
            }
            Err(e) => warn!(session_id, error = %e, "Dropping event, no Redis connection"),
        }
    }

    async fn context(&self, session_id: &str) -> SessionContext {
        let ctx = match self.load(session_id).await {
            Ok(Some(ctx)) => ctx.touched(),
            Ok(None) => SessionContext::new(session_id),
            Err(e) => {
                warn!(session_id, error = %e, "Falling back to empty session context");
                return SessionContext::new(session_id);
            }
        };
        if let Err(e) = self.save(&ctx).await {
            warn!(session_id, error = %e, "Failed to refresh session TTL");
        }
        ctx
    }

    async fn update_context(&self, session_id: &str, ctx: SessionContext) {
        if let Err(e) = self.save(&ctx).await {
            warn!(session_id, error = %e, "Failed to store session context");
        }
    }

    async fn clear_context(&self, session_id: &str) {
        if let Some(channel) = self.local.lock().await.remove(session_id) {
            channel.forwarder.abort();
        }
        match self.get_connection().await {
            Ok(mut conn) => {
                let key = self.build_key(session_id);
                if let Err(e) = redis::cmd("DEL")
                    .arg(&key)
                    .query_async::<i64>(&mut conn)
                    .await
                {
                    warn!(session_id, error = %e, "Redis DEL failed");
                }
            }
            Err(e) => warn!(session_id, error = %e, "Cannot clear session, no Redis connection"),
        }
    }

    async fn has_session(&self, session_id: &str) -> bool {
        match self.get_connection().await {
            Ok(mut conn) => {
                let key = self.build_key(session_id);
                match redis::cmd("EXISTS")
                    .arg(&key)
                    .query_async::<i64>(&mut conn)
                    .await
                {
                    Ok(exists) => exists > 0,
                    Err(e) => {
                        warn!(session_id, error = %e, "Redis EXISTS failed");
                        false
                    }
                }
            }
            Err(e) => {
                warn!(session_id, error = %e, "Cannot check session, no Redis connection");
                false
            }
        }
    }

    async fn subscribe(&self, session_id: &str) -> broadcast::Receiver<ContextEvent> {
        let mut local = self.local.lock().await;
        if let Some(channel) = local.get(session_id) {
            if !channel.forwarder.is_finished() {
                return channel.sender.subscribe();
            }
            // Forwarder died (connection loss); rebuild below
            local.remove(session_id);
        }
        let (sender, receiver) = broadcast::channel(CHANNEL_CAPACITY);
        let forwarder = self.spawn_forwarder(session_id, sender.clone());
        local.insert(
            session_id.to_string(),
            LocalChannel { sender, forwarder },
        );
        receiver
    }
}
