use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::models::{RegistrationRequest, UserProfile};

use super::session::{ErrorInfo, Session, SessionEvent, SessionObserver, SessionState};
use super::token_store::{TokenStore, TOKEN_KEY, USER_KEY};

/// Buffer size for session event subscribers
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Single source of truth for "am I logged in, and as whom".
///
/// Transitions are serialized by `transition`: the in-memory session, the
/// persisted records and the synchronous observers are all updated before
/// it is released, so concurrent transitions never interleave. The
/// `session` lock itself is only held for reads and the state change, never
/// while observers run, so an observer may read the store from its callback.
pub struct SessionStore {
    client: ApiClient,
    storage: Arc<dyn TokenStore>,
    transition: Mutex<()>,
    session: Mutex<Session>,
    observers: RwLock<Vec<Arc<dyn SessionObserver>>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionStore {
    /// Create an empty store. Login requests go through `client`; call
    /// `ApiClient::attach` (or `add_observer`) to have its headers follow
    /// the session.
    pub fn new(client: ApiClient, storage: Arc<dyn TokenStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            client,
            storage,
            transition: Mutex::new(()),
            session: Mutex::new(Session::default()),
            observers: RwLock::new(Vec::new()),
            events,
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Register an observer. It is immediately told the current state.
    pub fn add_observer(&self, observer: Arc<dyn SessionObserver>) {
        let _transition = self.lock_transition();
        let event = Self::event_for(&self.lock_session());
        observer.session_changed(&event);
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Receive every session transition from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    // ===== State =====

    pub fn is_authenticated(&self) -> bool {
        self.lock_session().is_authenticated()
    }

    pub fn state(&self) -> SessionState {
        self.lock_session().state()
    }

    pub fn snapshot(&self) -> Session {
        self.lock_session().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.lock_session().token().map(str::to_string)
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.lock_session().user().cloned()
    }

    pub fn last_error(&self) -> Option<ErrorInfo> {
        self.lock_session().error().cloned()
    }

    // ===== Transitions =====

    /// Rehydrate from storage. A stored token makes the session
    /// authenticated; the stored profile is restored alongside it when it
    /// parses. Storage failures are logged and treated as "nothing stored".
    pub fn initialize(&self) -> SessionState {
        let token = self.read_record(TOKEN_KEY);
        let user = match token {
            Some(_) => self.read_record(USER_KEY).and_then(|raw| {
                serde_json::from_str::<UserProfile>(&raw)
                    .map_err(|e| warn!(error = %e, "Discarding unreadable stored profile"))
                    .ok()
            }),
            None => None,
        };

        let _transition = self.lock_transition();
        let event = {
            let mut session = self.lock_session();
            match token {
                Some(token) => {
                    debug!(has_user = user.is_some(), "Restored session token");
                    session.restore(token, user);
                }
                None => session.clear(),
            }
            Self::event_for(&session)
        };
        if event == SessionEvent::Unauthenticated {
            // A profile without a token would break the session invariant
            self.remove_record(USER_KEY);
            debug!("No stored session token");
        }
        let state = event.state();
        self.notify(event);
        state
    }

    /// Exchange credentials for a token. On success the session holds the
    /// new token and profile, both are persisted, and observers are told.
    /// On failure the error is recorded, token and user are left as they
    /// were, and the error is returned.
    pub async fn login(&self, username: &str, password: &str) -> Result<UserProfile> {
        debug!(username, "Logging in");

        match self.client.login(username, password).await {
            Ok(response) => {
                let _transition = self.lock_transition();
                let session = {
                    let mut session = self.lock_session();
                    session.authenticate(response.key, Some(response.user.clone()));
                    session.clone()
                };
                self.persist(&session);
                self.notify(Self::event_for(&session));
                info!(username, "Login successful");
                Ok(response.user)
            }
            Err(e) => {
                warn!(username, error = %e, "Login failed");
                self.lock_session().record_error(ErrorInfo::from_error(&e));
                Err(e)
            }
        }
    }

    /// Clear the session and stored records. Never fails.
    pub fn logout(&self) {
        let _transition = self.lock_transition();
        self.lock_session().clear();
        self.remove_record(TOKEN_KEY);
        self.remove_record(USER_KEY);
        self.notify(SessionEvent::Unauthenticated);
        info!("Logged out");
    }

    /// Create a student account. The session is not touched; log in
    /// afterwards to obtain a token.
    pub async fn register(&self, request: &RegistrationRequest) -> Result<UserProfile> {
        let user = self.client.register(request).await?;
        info!(username = %user.username, "Registration successful");
        Ok(user)
    }

    // ===== Internals =====

    fn lock_transition(&self) -> MutexGuard<'_, ()> {
        self.transition.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn event_for(session: &Session) -> SessionEvent {
        match session.token() {
            Some(token) => SessionEvent::Authenticated {
                token: token.to_string(),
                username: session.user().map(|u| u.username.clone()),
            },
            None => SessionEvent::Unauthenticated,
        }
    }

    /// Called with the transition lock held and the session lock released
    fn notify(&self, event: SessionEvent) {
        for observer in self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            observer.session_changed(&event);
        }
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Write token and profile records. A failure here does not undo the
    /// login; the session simply won't survive a restart.
    fn persist(&self, session: &Session) {
        let Some(token) = session.token() else {
            return;
        };
        if let Err(e) = self.storage.set(TOKEN_KEY, token) {
            warn!(error = %e, "Failed to persist session token");
            return;
        }
        match session.user().map(serde_json::to_string) {
            Some(Ok(raw)) => {
                if let Err(e) = self.storage.set(USER_KEY, &raw) {
                    warn!(error = %e, "Failed to persist user profile");
                    // An older profile must not be restored next to the new token
                    self.remove_record(USER_KEY);
                }
            }
            Some(Err(e)) => {
                warn!(error = %e, "Failed to serialize user profile");
                self.remove_record(USER_KEY);
            }
            None => self.remove_record(USER_KEY),
        }
    }

    fn read_record(&self, key: &str) -> Option<String> {
        match self.storage.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Failed to read session record");
                None
            }
        }
    }

    fn remove_record(&self, key: &str) {
        if let Err(e) = self.storage.remove(key) {
            warn!(key, error = %e, "Failed to remove session record");
        }
    }
}
