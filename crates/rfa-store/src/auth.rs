//! Auth session manager: sessions, credentials and the auth-state channel
//!
//! The session is observable through [`SessionChannel`], a behaviour subject:
//! every new subscriber immediately receives the current value as an
//! `InitialSession` event, then one event per transition.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tracing::{debug, instrument};

use crate::backend::Backend;
use crate::listeners::{ListenerSet, Subscription};
use crate::obs;
use crate::record::Row;
use crate::response::{guarded, Response};

/// The authenticated identity. `None` everywhere means anonymous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub email: String,
    pub created_at: String,
}

/// Known sign-up, kept by whichever side owns credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub password_digest: String,
    pub created_at: String,
}

impl Account {
    pub fn session(&self) -> Session {
        Session {
            id: self.id.clone(),
            email: self.email.clone(),
            created_at: self.created_at.clone(),
        }
    }
}

/// SHA-256 hex digest binding a password to its email.
pub fn credential_digest(email: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignUp {
    pub email: String,
    pub password: String,
    /// Extra fields for a `profiles` record keyed by the new user id.
    pub profile_seed: Option<Row>,
}

impl SignUp {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            profile_seed: None,
        }
    }

    /// Seed a profile. Non-object values are ignored.
    pub fn with_profile(mut self, seed: Value) -> Self {
        if let Value::Object(map) = seed {
            self.profile_seed = Some(map);
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionData {
    pub session: Option<Session>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserData {
    pub user: Session,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthChangeEvent {
    InitialSession,
    SignedIn,
    SignedOut,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthEvent {
    pub kind: AuthChangeEvent,
    pub session: Option<Session>,
}

/// Behaviour subject over the current session.
pub struct SessionChannel {
    current: watch::Sender<Option<Session>>,
    listeners: ListenerSet<AuthEvent>,
}

impl SessionChannel {
    pub fn new(initial: Option<Session>) -> Self {
        let (current, _) = watch::channel(initial);
        Self {
            current,
            listeners: ListenerSet::new(),
        }
    }

    pub fn current(&self) -> Option<Session> {
        self.current.borrow().clone()
    }

    /// Register a listener and replay the current session to it right away.
    pub fn subscribe(
        &self,
        listener: impl Fn(&AuthEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let listener: Arc<dyn Fn(&AuthEvent) + Send + Sync> = Arc::new(listener);
        let subscription = self.listeners.add(listener.clone());
        listener(&AuthEvent {
            kind: AuthChangeEvent::InitialSession,
            session: self.current(),
        });
        subscription
    }

    /// Receiver for async consumers; always holds the latest session.
    pub fn watch(&self) -> watch::Receiver<Option<Session>> {
        self.current.subscribe()
    }

    /// Record a new session value and notify listeners if it changed.
    pub fn publish(&self, session: Option<Session>) {
        let previous = self.current.send_replace(session.clone());
        if previous == session {
            return;
        }
        let kind = match &session {
            Some(_) => AuthChangeEvent::SignedIn,
            None => AuthChangeEvent::SignedOut,
        };
        debug!(?kind, "auth state changed");
        obs::emit_auth_transition(kind, session.as_ref().map(|s| s.id.as_str()));
        self.listeners.emit(&AuthEvent { kind, session });
    }
}

impl Default for SessionChannel {
    fn default() -> Self {
        Self::new(None)
    }
}

/// `client.auth()`
#[derive(Clone)]
pub struct Auth {
    backend: Arc<dyn Backend>,
}

impl Auth {
    pub(crate) fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub async fn get_session(&self) -> Response<SessionData> {
        guarded("auth.get_session", self.backend.get_session())
            .await
            .map(|session| SessionData { session })
            .into()
    }

    /// Current user, or an empty response when anonymous.
    pub async fn get_user(&self) -> Response<UserData> {
        match guarded("auth.get_user", self.backend.get_session()).await {
            Ok(Some(user)) => Response::ok(UserData { user }),
            Ok(None) => Response::empty(),
            Err(err) => Response::err(err),
        }
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn sign_up(&self, request: SignUp) -> Response<UserData> {
        guarded("auth.sign_up", self.backend.sign_up(request))
            .await
            .map(|user| UserData { user })
            .into()
    }

    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn sign_in_with_password(&self, credentials: Credentials) -> Response<UserData> {
        guarded(
            "auth.sign_in_with_password",
            self.backend.sign_in_with_password(credentials),
        )
        .await
        .map(|user| UserData { user })
        .into()
    }

    pub async fn sign_out(&self) -> Response<()> {
        Response::unit(guarded("auth.sign_out", self.backend.sign_out()).await)
    }

    /// Subscribe to auth transitions. The callback runs once immediately with
    /// `InitialSession`.
    pub fn on_auth_state_change(
        &self,
        callback: impl Fn(AuthChangeEvent, Option<&Session>) + Send + Sync + 'static,
    ) -> Subscription {
        self.backend
            .session_channel()
            .subscribe(move |event| callback(event.kind, event.session.as_ref()))
    }

    pub fn watch(&self) -> watch::Receiver<Option<Session>> {
        self.backend.session_channel().watch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listeners::lock;
    use std::sync::Mutex;

    fn session(id: &str) -> Session {
        Session {
            id: id.into(),
            email: format!("{id}@rfa.com"),
            created_at: "2024-01-01T00:00:00.000Z".into(),
        }
    }

    #[test]
    fn subscribe_replays_current_value() {
        let channel = SessionChannel::new(Some(session("coach")));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = channel.subscribe(move |event| lock(&sink).push(event.clone()));

        let seen = lock(&seen);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, AuthChangeEvent::InitialSession);
        assert_eq!(seen[0].session.as_ref().map(|s| s.id.as_str()), Some("coach"));
    }

    #[test]
    fn publish_skips_unchanged_sessions() {
        let channel = SessionChannel::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = channel.subscribe(move |event| lock(&sink).push(event.kind));

        channel.publish(Some(session("a")));
        channel.publish(Some(session("a")));
        channel.publish(None);

        assert_eq!(
            *lock(&seen),
            vec![
                AuthChangeEvent::InitialSession,
                AuthChangeEvent::SignedIn,
                AuthChangeEvent::SignedOut
            ]
        );
    }

    #[test]
    fn watch_tracks_latest_session() {
        let channel = SessionChannel::default();
        let rx = channel.watch();
        channel.publish(Some(session("admin")));
        assert_eq!(rx.borrow().as_ref().map(|s| s.id.clone()), Some("admin".into()));
    }

    #[test]
    fn digest_depends_on_email() {
        assert_ne!(
            credential_digest("a@rfa.com", "pw"),
            credential_digest("b@rfa.com", "pw")
        );
        assert_eq!(credential_digest("a@rfa.com", "pw").len(), 64);
    }

    #[test]
    fn event_names_match_wire_format() {
        let json = serde_json::to_value(AuthChangeEvent::InitialSession).unwrap();
        assert_eq!(json, "INITIAL_SESSION");
    }
}
