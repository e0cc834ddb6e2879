//! In-memory model history per chat session. The cache is an optimization:
//! on a miss the history is rebuilt from persisted messages. Entries expire
//! after an idle hour and are removed eagerly when a session is deleted.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use uuid::Uuid;

use super::gemini::ModelTurn;

const CONVERSATION_TTL: Duration = Duration::from_secs(60 * 60);

struct CachedConversation {
    turns: Vec<ModelTurn>,
    last_used: Instant,
}

/// Session-keyed cache of model conversation history.
pub struct ConversationCache {
    entries: Mutex<HashMap<Uuid, CachedConversation>>,
}

impl ConversationCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Current history for a session, refreshing its idle timer. `None`
    /// when absent or expired.
    pub fn get(&self, session_id: Uuid) -> Option<Vec<ModelTurn>> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries.get_mut(&session_id)?;
        if entry.last_used.elapsed() > CONVERSATION_TTL {
            entries.remove(&session_id);
            return None;
        }
        entry.last_used = Instant::now();
        Some(entry.turns.clone())
    }

    /// Replace the history for a session.
    pub fn put(&self, session_id: Uuid, turns: Vec<ModelTurn>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            session_id,
            CachedConversation {
                turns,
                last_used: Instant::now(),
            },
        );
    }

    /// Drop a session's history. Called on session deletion so a later
    /// session with a recycled id cannot see stale turns.
    pub fn remove(&self, session_id: Uuid) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(&session_id);
    }

    /// Evict idle entries. Driven by a periodic background task.
    pub fn sweep_expired(&self) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| entry.last_used.elapsed() <= CONVERSATION_TTL);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ConversationCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_returns_turns() {
        let cache = ConversationCache::new();
        let sid = Uuid::new_v4();
        cache.put(sid, vec![ModelTurn::user_text("hi")]);

        let turns = cache.get(sid).unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, "user");
    }

    #[test]
    fn get_misses_for_unknown_session() {
        let cache = ConversationCache::new();
        assert!(cache.get(Uuid::new_v4()).is_none());
    }

    #[test]
    fn remove_evicts_entry() {
        let cache = ConversationCache::new();
        let sid = Uuid::new_v4();
        cache.put(sid, vec![ModelTurn::user_text("hi")]);
        cache.remove(sid);
        assert!(cache.get(sid).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn put_replaces_existing_history() {
        let cache = ConversationCache::new();
        let sid = Uuid::new_v4();
        cache.put(sid, vec![ModelTurn::user_text("a")]);
        cache.put(
            sid,
            vec![ModelTurn::user_text("a"), ModelTurn::model_text("b")],
        );
        assert_eq!(cache.get(sid).unwrap().len(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn sweep_keeps_fresh_entries() {
        let cache = ConversationCache::new();
        cache.put(Uuid::new_v4(), vec![]);
        assert_eq!(cache.sweep_expired(), 0);
        assert_eq!(cache.len(), 1);
    }
}
