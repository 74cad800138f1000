use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use concourse_types::models::{ContainerRef, TypingIndicator};

/// How long a typing indicator stays live without a restart.
pub const TYPING_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct TypingState {
    container: ContainerRef,
    started_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Short-lived typing presence, keyed by user. A user has at most one live
/// indicator anywhere; starting to type supersedes the previous one even in
/// a different container.
///
/// Expiry is lazy: reads filter on `expires_at`, and writes purge dead
/// entries first. There is no background sweeper, so an indicator can
/// linger slightly past its TTL in the map, but it is never *returned*
/// after expiry. Acceptable staleness for a soft UX signal.
#[derive(Clone)]
pub struct TypingTracker {
    inner: Arc<RwLock<HashMap<Uuid, TypingState>>>,
    ttl: chrono::Duration,
}

impl TypingTracker {
    pub fn new() -> Self {
        Self::with_ttl(TYPING_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(5)),
        }
    }

    /// Start (or restart) typing for `user_id` in `container`. Any previous
    /// indicator for this user is dropped first, wherever it was.
    pub async fn start(&self, user_id: Uuid, container: ContainerRef) -> TypingIndicator {
        let now = Utc::now();
        let state = TypingState {
            container,
            started_at: now,
            expires_at: now + self.ttl,
        };

        let mut map = self.inner.write().await;
        map.retain(|_, s| s.expires_at > now);
        map.insert(user_id, state.clone());

        TypingIndicator {
            user_id,
            container,
            started_at: state.started_at,
            expires_at: state.expires_at,
        }
    }

    /// Remove the user's indicator unconditionally. Returns the container
    /// it was live in, so the caller can publish a stop event there;
    /// already-expired indicators are removed silently.
    pub async fn stop(&self, user_id: Uuid) -> Option<ContainerRef> {
        let now = Utc::now();
        let mut map = self.inner.write().await;
        map.remove(&user_id)
            .filter(|s| s.expires_at > now)
            .map(|s| s.container)
    }

    /// Live indicators for one container. Expired entries are never
    /// returned, even if never explicitly stopped.
    pub async fn typing_in(&self, container: ContainerRef) -> Vec<TypingIndicator> {
        let now = Utc::now();
        let map = self.inner.read().await;
        map.iter()
            .filter(|(_, s)| s.container == container && s.expires_at > now)
            .map(|(user_id, s)| TypingIndicator {
                user_id: *user_id,
                container: s.container,
                started_at: s.started_at,
                expires_at: s.expires_at,
            })
            .collect()
    }
}

impl Default for TypingTracker {
    fn default() -> Self {
        Self::new()
    }
}
