//! Per-session cache of authenticated upstream clients.
//!
//! Each live session owns at most one client. The client is created lazily by a login future
//! that is memoized in the cache, so concurrent lookups for one session share a single login
//! instead of racing their own. Failed logins are evicted so the next lookup re-authenticates.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use rand::RngCore;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::upstream::{Connector, LoginError};

pub const DEFAULT_SESSION_TTL_HOURS: i64 = 12;
pub const SESSION_MISSING_MESSAGE: &str = "Session not found.";
const SESSION_ID_BYTES: usize = 24;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: String,
    pub email: String,
    pub password: String,
    pub expires_at: DateTime<Utc>,
}

type ClientFuture<T> = Shared<BoxFuture<'static, Result<Arc<T>, LoginError>>>;

pub struct SessionClientCache<C: Connector> {
    connector: Arc<C>,
    ttl: Duration,
    sessions: Mutex<HashMap<String, SessionRecord>>,
    clients: Mutex<HashMap<String, ClientFuture<C::Client>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn create_identifier() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Enough of a session id to correlate log lines without leaking the token.
pub fn short_id(session_id: &str) -> &str {
    session_id.get(..8).unwrap_or(session_id)
}

impl<C: Connector> SessionClientCache<C> {
    pub fn new(connector: C, ttl: Duration) -> Self {
        Self {
            connector: Arc::new(connector),
            ttl,
            sessions: Mutex::new(HashMap::new()),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a session and authenticates it; the session is discarded if login fails.
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionRecord, AppError> {
        let record = SessionRecord {
            id: create_identifier(),
            email: email.to_string(),
            password: password.to_string(),
            expires_at: Utc::now() + self.ttl,
        };
        lock(&self.sessions).insert(record.id.clone(), record.clone());

        let future = self.start_login(email, password);
        lock(&self.clients).insert(record.id.clone(), future.clone());

        match future.clone().await {
            Ok(_) => {
                info!(session = short_id(&record.id), "session created");
                Ok(record)
            }
            Err(err) => {
                warn!(session = short_id(&record.id), error = %err, "login failed");
                self.evict_client(&record.id, &future);
                lock(&self.sessions).remove(&record.id);
                Err(err.into())
            }
        }
    }

    /// Returns the session's client, joining an in-flight login when one exists.
    pub async fn get(&self, session_id: &str) -> Result<Arc<C::Client>, AppError> {
        let session = self
            .find_session(session_id)
            .ok_or_else(|| AppError::Auth(SESSION_MISSING_MESSAGE.to_string()))?;

        let future = {
            let mut clients = lock(&self.clients);
            clients
                .entry(session.id.clone())
                .or_insert_with(|| {
                    debug!(session = short_id(&session.id), "starting upstream login");
                    self.start_login(&session.email, &session.password)
                })
                .clone()
        };

        match future.clone().await {
            Ok(client) => Ok(client),
            Err(err) => {
                warn!(session = short_id(session_id), error = %err, "cached login failed; evicting");
                self.evict_client(session_id, &future);
                Err(err.into())
            }
        }
    }

    /// Drops the cached client and the session record. Unknown ids are ignored.
    pub fn logout(&self, session_id: &str) {
        lock(&self.clients).remove(session_id);
        if lock(&self.sessions).remove(session_id).is_some() {
            info!(session = short_id(session_id), "session closed");
        }
    }

    /// Registers a previously persisted session without logging in.
    pub fn restore(&self, record: SessionRecord) -> bool {
        if record.expires_at <= Utc::now() {
            return false;
        }
        lock(&self.sessions).insert(record.id.clone(), record);
        true
    }

    /// Current session record, refreshing its sliding expiry.
    pub fn session(&self, session_id: &str) -> Option<SessionRecord> {
        self.find_session(session_id)
    }

    fn find_session(&self, session_id: &str) -> Option<SessionRecord> {
        let mut sessions = lock(&self.sessions);
        let now = Utc::now();
        let expired = sessions.get(session_id)?.expires_at <= now;
        if expired {
            sessions.remove(session_id);
            lock(&self.clients).remove(session_id);
            debug!(session = short_id(session_id), "session expired");
            return None;
        }
        let record = sessions.get_mut(session_id)?;
        record.expires_at = now + self.ttl;
        Some(record.clone())
    }

    fn start_login(&self, email: &str, password: &str) -> ClientFuture<C::Client> {
        let connector = Arc::clone(&self.connector);
        let email = email.to_string();
        let password = password.to_string();
        async move { connector.login(&email, &password).await.map(Arc::new) }
            .boxed()
            .shared()
    }

    fn evict_client(&self, session_id: &str, future: &ClientFuture<C::Client>) {
        let mut clients = lock(&self.clients);
        if clients
            .get(session_id)
            .is_some_and(|current| current.ptr_eq(future))
        {
            clients.remove(session_id);
        }
    }
}
