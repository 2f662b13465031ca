use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

const SESSION_TTL: Duration = Duration::from_secs(8 * 60 * 60);
const PENDING_LOGOUT_TTL: Duration = Duration::from_secs(15 * 60);
const CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// An SP-initiated LogoutRequest awaiting its LogoutResponse.
#[derive(Debug, Clone)]
pub struct PendingLogout {
    pub transaction_id: String,
    pub issued_at: DateTime<Utc>,
}

/// Per-browser-session SAML state. At most one pending logout transaction
/// exists per session; a new SP-initiated logout supersedes the previous one.
#[derive(Debug, Default)]
pub struct SamlSession {
    pub principal_id: Option<String>,
    pub pending_logout: Option<PendingLogout>,
    touched_at: DateTime<Utc>,
}

#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<DashMap<String, SamlSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.inner.insert(
            id.clone(),
            SamlSession {
                touched_at: Utc::now(),
                ..SamlSession::default()
            },
        );
        id
    }

    /// Last-validated principal of the session, if any.
    pub fn principal_id(&self, id: &str) -> Option<String> {
        self.live(id)?.principal_id.clone()
    }

    /// Records the validated principal. Called only after full response
    /// validation succeeds.
    pub fn set_principal(&self, id: &str, principal_id: &str) {
        let mut entry = self.entry(id);
        entry.principal_id = Some(principal_id.to_string());
        entry.touched_at = Utc::now();
    }

    /// Outstanding SP-initiated logout transaction id. Expired transactions
    /// are treated as absent and dropped.
    pub fn pending_logout_id(&self, id: &str) -> Option<String> {
        let mut entry = self.inner.get_mut(id)?;
        let pending = entry.pending_logout.as_ref()?;
        let elapsed = Utc::now()
            .signed_duration_since(pending.issued_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        if elapsed > PENDING_LOGOUT_TTL {
            entry.pending_logout = None;
            return None;
        }
        Some(pending.transaction_id.clone())
    }

    /// Stores the transaction id of a freshly issued LogoutRequest,
    /// superseding any prior outstanding id.
    pub fn set_pending_logout(&self, id: &str, transaction_id: &str) {
        let mut entry = self.entry(id);
        entry.pending_logout = Some(PendingLogout {
            transaction_id: transaction_id.to_string(),
            issued_at: Utc::now(),
        });
        entry.touched_at = Utc::now();
    }

    /// Completes an SP-initiated logout round-trip: clears the principal and
    /// the pending transaction id, keeping the session itself alive.
    pub fn clear_logout_state(&self, id: &str) {
        if let Some(mut entry) = self.inner.get_mut(id) {
            entry.principal_id = None;
            entry.pending_logout = None;
        }
    }

    /// Wipes the entire session (IdP-initiated logout).
    pub fn clear(&self, id: &str) {
        self.inner.remove(id);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.live(id).is_some()
    }

    fn entry(&self, id: &str) -> dashmap::mapref::one::RefMut<'_, String, SamlSession> {
        self.inner
            .entry(id.to_string())
            .or_insert_with(|| SamlSession {
                touched_at: Utc::now(),
                ..SamlSession::default()
            })
    }

    fn live(&self, id: &str) -> Option<dashmap::mapref::one::Ref<'_, String, SamlSession>> {
        let entry = self.inner.get(id)?;
        let elapsed = Utc::now()
            .signed_duration_since(entry.touched_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        if elapsed > SESSION_TTL {
            drop(entry);
            self.inner.remove(id);
            return None;
        }
        Some(entry)
    }

    fn cleanup_expired(&self) {
        let now = Utc::now();
        self.inner.retain(|_, session| {
            let elapsed = now
                .signed_duration_since(session.touched_at)
                .to_std()
                .unwrap_or(Duration::ZERO);
            elapsed <= SESSION_TTL
        });
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.len()
    }
}

pub async fn session_cleanup_task(store: SessionStore) {
    let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
    loop {
        interval.tick().await;
        let before = store.inner.len();
        store.cleanup_expired();
        let removed = before - store.inner.len();
        if removed > 0 {
            tracing::info!(removed, "cleaned up expired sessions");
        }
    }
}
