use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

use storyloom_core::{ContextEvent, SessionContext};

use crate::ContextBus;

/// Buffer depth of each session's multicast channel. Slow subscribers
/// lag and miss events rather than blocking publishers.
const CHANNEL_CAPACITY: usize = 256;

struct SessionSlot {
    context: SessionContext,
    sender: broadcast::Sender<ContextEvent>,
}

impl SessionSlot {
    fn new(session_id: &str) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            context: SessionContext::new(session_id),
            sender,
        }
    }
}

/// Single-instance Context Bus. State lives in process memory and is lost
/// on restart; an idle sweeper drops sessions untouched for `session_ttl`.
pub struct MemoryContextBus {
    sessions: RwLock<HashMap<String, SessionSlot>>,
    session_ttl: ChronoDuration,
}

impl MemoryContextBus {
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(24 * 3600))
    }

    pub fn with_ttl(session_ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            session_ttl: ChronoDuration::from_std(session_ttl)
                .unwrap_or_else(|_| ChronoDuration::hours(24)),
        }
    }

    /// Drop every session idle longer than the TTL. Returns how many were
    /// removed.
    pub async fn sweep_once(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        let ttl = self.session_ttl;
        sessions.retain(|_, slot| !slot.context.is_expired(ttl));
        let removed = before - sessions.len();
        if removed > 0 {
            info!(removed, "Swept expired sessions");
        }
        removed
    }

    /// Periodic sweep loop. Spawn with `tokio::spawn(bus.clone().run_sweeper(..))`.
    pub async fn run_sweeper(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.sweep_once().await;
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for MemoryContextBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContextBus for MemoryContextBus {
    async fn publish(&self, session_id: &str, event: ContextEvent) {
        let mut sessions = self.sessions.write().await;
        let slot = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionSlot::new(session_id));
        // send() errors only when nobody is listening, which is fine
        let delivered = slot.sender.send(event).unwrap_or(0);
        debug!(session_id, delivered, "Published context event");
    }

    async fn context(&self, session_id: &str) -> SessionContext {
        let mut sessions = self.sessions.write().await;
        let slot = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionSlot::new(session_id));
        slot.context = slot.context.clone().touched();
        slot.context.clone()
    }

    async fn update_context(&self, session_id: &str, ctx: SessionContext) {
        let mut sessions = self.sessions.write().await;
        let slot = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionSlot::new(session_id));
        slot.context = ctx;
    }

    async fn clear_context(&self, session_id: &str) {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        debug!(session_id, removed, "Cleared session context");
    }

    async fn has_session(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    async fn subscribe(&self, session_id: &str) -> broadcast::Receiver<ContextEvent> {
        let mut sessions = self.sessions.write().await;
        let slot = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionSlot::new(session_id));
        slot.sender.subscribe()
    }
}
