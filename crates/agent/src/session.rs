use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

use ordermate_core::config::SessionConfig;

use crate::llm::ChatMessage;

/// Ordered conversation history for one session. The first entry is always
/// the system prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionLog {
    messages: Vec<ChatMessage>,
}

impl SessionLog {
    pub fn new(system_prompt: &str) -> Self {
        Self { messages: vec![ChatMessage::system(system_prompt)] }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}

pub type SharedSession = Arc<Mutex<SessionLog>>;

struct SessionEntry {
    log: SharedSession,
    last_seen: Instant,
}

impl SessionEntry {
    /// A handle outside the map means a turn holds or awaits this session.
    fn is_busy(&self) -> bool {
        Arc::strong_count(&self.log) > 1
    }

    fn is_idle(&self, now: Instant, idle_ttl: Duration) -> bool {
        !self.is_busy() && now.duration_since(self.last_seen) > idle_ttl
    }
}

/// Session id to history map with idle expiry and a size cap.
///
/// A caller holds the returned mutex for a whole turn, so turns on one session
/// never interleave. Sessions with a turn in flight are never expired or
/// evicted; if every session is busy the cap is exceeded until one finishes.
#[derive(Clone)]
pub struct SessionStore {
    entries: Arc<StdMutex<HashMap<String, SessionEntry>>>,
    system_prompt: Arc<str>,
    idle_ttl: Duration,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(system_prompt: &str, config: &SessionConfig) -> Self {
        Self::with_limits(
            system_prompt,
            Duration::from_secs(config.idle_ttl_secs),
            config.max_sessions,
        )
    }

    pub fn with_limits(system_prompt: &str, idle_ttl: Duration, max_sessions: usize) -> Self {
        Self {
            entries: Arc::new(StdMutex::new(HashMap::new())),
            system_prompt: Arc::from(system_prompt),
            idle_ttl,
            max_sessions: max_sessions.max(1),
        }
    }

    /// Returns the session's history, creating it from the system prompt when
    /// it is new or has expired.
    pub fn session(&self, session_id: &str) -> SharedSession {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(entry) = entries.get_mut(session_id) {
            if !entry.is_idle(now, self.idle_ttl) {
                entry.last_seen = now;
                return entry.log.clone();
            }
            entries.remove(session_id);
            debug!(event_name = "agent.session.expired", session_id, "dropped idle session");
        }

        if entries.len() >= self.max_sessions {
            let idle_ttl = self.idle_ttl;
            entries.retain(|_, entry| !entry.is_idle(now, idle_ttl));
        }
        if entries.len() >= self.max_sessions {
            let oldest = entries
                .iter()
                .filter(|(_, entry)| !entry.is_busy())
                .min_by_key(|(_, entry)| entry.last_seen)
                .map(|(id, _)| id.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
                debug!(
                    event_name = "agent.session.evicted",
                    session_id = %oldest,
                    "evicted least recently used session"
                );
            }
        }

        let log = Arc::new(Mutex::new(SessionLog::new(&self.system_prompt)));
        entries.insert(session_id.to_string(), SessionEntry { log: log.clone(), last_seen: now });
        debug!(event_name = "agent.session.created", session_id, "started session");
        log
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).contains_key(session_id)
    }
}
