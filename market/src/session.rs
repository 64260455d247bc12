use market_core::model::{Session, UserProfile};
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use std::sync::Arc;
use tokio::sync::watch;

/// Explicit session context, constructed once and passed down to every
/// consumer (pool, services, runner). Token and cached profile live and
/// die together; teardown from any call site is observable through the
/// `ended` watch channel.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<Option<Session>>>,
    epoch_tx: Arc<watch::Sender<u64>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (epoch_tx, _) = watch::channel(0);
        Self {
            inner: Arc::new(RwLock::new(None)),
            epoch_tx: Arc::new(epoch_tx),
        }
    }

    pub fn install(&self, session: Session) {
        *self.inner.write() = Some(session);
    }

    pub fn session(&self) -> Option<Session> {
        self.inner.read().clone()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.inner.read().as_ref().map(|s| s.user.clone())
    }

    pub fn token(&self) -> Option<String> {
        self.inner.read().as_ref().map(|s| s.token.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.read().is_some()
    }

    /// `Authorization: Bearer <token>` when a session is present, empty
    /// otherwise; unauthenticated requests simply go out bare.
    pub fn bearer_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(token) = self.token() {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
                headers.insert(AUTHORIZATION, value);
            }
        }
        headers
    }

    /// User-initiated teardown. Clears token and profile together and
    /// notifies watchers; pollers owned by the runner drop with it, so
    /// notify baselines never survive into the next login.
    pub fn logout(&self) {
        self.teardown("logout");
    }

    /// Central 401 handling: any call site observing an unauthorized
    /// response triggers the same global teardown. Callers treat requests
    /// failing due to session loss as normal, recoverable conditions.
    pub fn on_unauthorized(&self) {
        self.teardown("unauthorized");
    }

    fn teardown(&self, reason: &str) {
        let had_session = self.inner.write().take().is_some();
        if had_session {
            tracing::warn!(target: "session", reason = %reason, "session cleared");
            self.epoch_tx.send_modify(|epoch| *epoch += 1);
        }
    }

    /// Receiver that resolves whenever the session is torn down.
    pub fn ended(&self) -> watch::Receiver<u64> {
        self.epoch_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_core::model::UserRole;

    fn session() -> Session {
        Session {
            token: "tok-1".to_string(),
            user: UserProfile {
                id: "u1".to_string(),
                username: "alice".to_string(),
                role: UserRole::User,
                is_active: true,
            },
        }
    }

    #[test]
    fn bearer_headers_follow_token() {
        let store = SessionStore::new();
        assert!(store.bearer_headers().is_empty());

        store.install(session());
        let headers = store.bearer_headers();
        assert_eq!(
            headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()),
            Some("Bearer tok-1")
        );
    }

    #[test]
    fn unauthorized_clears_token_and_profile_together() {
        let store = SessionStore::new();
        store.install(session());
        let mut ended = store.ended();
        let before = *ended.borrow_and_update();

        store.on_unauthorized();
        assert!(store.token().is_none());
        assert!(store.user().is_none());
        assert!(ended.has_changed().unwrap());
        assert_eq!(*ended.borrow_and_update(), before + 1);
    }

    #[test]
    fn teardown_without_session_is_silent() {
        let store = SessionStore::new();
        let mut ended = store.ended();
        ended.borrow_and_update();
        store.on_unauthorized();
        assert!(!ended.has_changed().unwrap());
    }
}
