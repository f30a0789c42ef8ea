pub mod memory;
pub mod redis;

use async_trait::async_trait;
use tokio::sync::broadcast;

use storyloom_core::{ContextEvent, SessionContext};

pub use memory::MemoryContextBus;
pub use redis::RedisContextBus;

/// Shared session state plus per-session event multicast.
///
/// The bus is the single sanctioned event channel; components never reach
/// for a separate ambient event system. Delivery is best effort: an event
/// published before a subscriber connects is not replayed.
#[async_trait]
pub trait ContextBus: Send + Sync {
    /// Deliver `event` to every live subscriber of the session.
    /// Fire and forget; afterwards the session entry is guaranteed to
    /// exist (created empty if it was absent).
    async fn publish(&self, session_id: &str, event: ContextEvent);

    /// Fetch the session context, refreshing its access time. Creates a
    /// fresh empty context for an unknown session; never fails.
    async fn context(&self, session_id: &str) -> SessionContext;

    /// Atomically replace the session context.
    ///
    /// `context()` + `update_context()` is a non-atomic read-modify-write:
    /// concurrent writers to the same session are last-writer-wins.
    async fn update_context(&self, session_id: &str, ctx: SessionContext);

    /// Remove the session entirely.
    async fn clear_context(&self, session_id: &str);

    async fn has_session(&self, session_id: &str) -> bool;

    /// Multicast stream of future events for the session.
    async fn subscribe(&self, session_id: &str) -> broadcast::Receiver<ContextEvent>;
}
