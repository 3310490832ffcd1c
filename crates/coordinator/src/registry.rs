use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use quiz_types::{Role, ServerMessage};
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::Error;

/// One connected client. The write mutex the spec describes is realized as
/// an unbounded channel paired with a dedicated writer task that owns the
/// socket's write half (see `ws::handle_socket`); `sender` is the only
/// handle the registry itself needs to hold.
pub struct ConnectionContext {
    pub session_id: String,
    pub user_id: String,
    pub user_name: String,
    pub role: Role,
    sender: mpsc::UnboundedSender<ServerMessage>,
}

impl ConnectionContext {
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        user_name: impl Into<String>,
        role: Role,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            user_name: user_name.into(),
            role,
            sender,
        }
    }
}

type SessionMap = HashMap<String, HashMap<String, Arc<ConnectionContext>>>;

/// Registry of every live duplex connection, keyed sessionId -> userId. A
/// single R/W lock guards the outer map; it is never held across a send —
/// callers take a snapshot with [`get_connections`](Self::get_connections)
/// and iterate it lock-free.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<SessionMap>>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Idempotent creation of the inner mapping. Returns `true` only if this
    /// call created it — the caller uses that to decide whether it won a
    /// race against a concurrent duplicate `session.start`.
    pub fn register_session(&self, session_id: &str) -> bool {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if inner.contains_key(session_id) {
            false
        } else {
            inner.insert(session_id.to_string(), HashMap::new());
            true
        }
    }

    pub fn unregister_session(&self, session_id: &str) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.remove(session_id);
    }

    pub fn session_exists(&self, session_id: &str) -> bool {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.contains_key(session_id)
    }

    /// Inserts `ctx`, replacing (without closing) any prior entry for the
    /// same `(sessionId, userId)`. Per the spec's open question, the
    /// displaced connection is not closed here; callers that care about
    /// reconnection semantics must close it themselves.
    pub fn register_connection(&self, ctx: Arc<ConnectionContext>) -> Result<(), Error> {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        let session = inner
            .get_mut(&ctx.session_id)
            .ok_or_else(|| Error::State(ctx.session_id.clone()))?;
        if session.insert(ctx.user_id.clone(), ctx.clone()).is_some() {
            warn!(
                session_id = %ctx.session_id,
                user_id = %ctx.user_id,
                "displaced existing connection for this user without closing it"
            );
        }
        Ok(())
    }

    pub fn unregister_connection(&self, session_id: &str, user_id: &str) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if let Some(session) = inner.get_mut(session_id) {
            session.remove(user_id);
        }
    }

    /// Snapshot of every connection in a session; safe to iterate without
    /// holding the registry lock.
    pub fn get_connections(&self, session_id: &str) -> Vec<Arc<ConnectionContext>> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner
            .get(session_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn broadcast_to_session(&self, session_id: &str, payload: &ServerMessage, include_admin: bool) {
        let ctxs: Vec<_> = self
            .get_connections(session_id)
            .into_iter()
            .filter(|c| include_admin || c.role != Role::Admin)
            .collect();
        self.send_message(payload, &ctxs);
    }

    pub fn send_to_admin(&self, session_id: &str, payload: &ServerMessage) {
        let ctxs: Vec<_> = self
            .get_connections(session_id)
            .into_iter()
            .filter(|c| c.role == Role::Admin)
            .collect();
        self.send_message(payload, &ctxs);
    }

    /// Sends `payload` to each of `ctxs`. A send failure unregisters that
    /// connection asynchronously and does not stop delivery to the rest.
    pub fn send_message(&self, payload: &ServerMessage, ctxs: &[Arc<ConnectionContext>]) {
        for ctx in ctxs {
            if ctx.sender.send(payload.clone()).is_err() {
                warn!(
                    session_id = %ctx.session_id,
                    user_id = %ctx.user_id,
                    "send failed, unregistering connection"
                );
                let registry = self.clone();
                let session_id = ctx.session_id.clone();
                let user_id = ctx.user_id.clone();
                tokio::spawn(async move {
                    registry.unregister_connection(&session_id, &user_id);
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(sid: &str, uid: &str, role: Role) -> (Arc<ConnectionContext>, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(ConnectionContext::new(sid, uid, uid, role, tx)), rx)
    }

    #[test]
    fn register_session_is_idempotent() {
        let registry = ConnectionRegistry::new();
        assert!(registry.register_session("s1"));
        assert!(!registry.register_session("s1"));
    }

    #[test]
    fn register_connection_fails_for_unknown_session() {
        let registry = ConnectionRegistry::new();
        let (ctx, _rx) = ctx("missing", "u1", Role::Participant);
        assert!(matches!(registry.register_connection(ctx), Err(Error::State(_))));
    }

    #[test]
    fn get_connections_empty_after_unregister_session() {
        let registry = ConnectionRegistry::new();
        registry.register_session("s1");
        let (c1, _rx1) = ctx("s1", "u1", Role::Admin);
        registry.register_connection(c1).unwrap();
        assert_eq!(registry.get_connections("s1").len(), 1);

        registry.unregister_session("s1");
        assert!(registry.get_connections("s1").is_empty());
    }

    #[test]
    fn broadcast_excludes_admin_when_requested() {
        let registry = ConnectionRegistry::new();
        registry.register_session("s1");
        let (admin, mut admin_rx) = ctx("s1", "admin", Role::Admin);
        let (user, mut user_rx) = ctx("s1", "u1", Role::Participant);
        registry.register_connection(admin).unwrap();
        registry.register_connection(user).unwrap();

        registry.broadcast_to_session("s1", &ServerMessage::End, false);

        assert!(admin_rx.try_recv().is_err());
        assert_eq!(user_rx.try_recv().unwrap(), ServerMessage::End);
    }

    #[test]
    fn displaced_connection_is_not_closed() {
        let registry = ConnectionRegistry::new();
        registry.register_session("s1");
        let (first, mut first_rx) = ctx("s1", "u1", Role::Participant);
        let (second, _second_rx) = ctx("s1", "u1", Role::Participant);
        registry.register_connection(first).unwrap();
        registry.register_connection(second).unwrap();

        // the first sender is still open (not explicitly closed by the
        // registry); sending on it doesn't error even though it's no longer
        // reachable via get_connections.
        assert_eq!(registry.get_connections("s1").len(), 1);
        drop(first_rx.try_recv());
    }
}
