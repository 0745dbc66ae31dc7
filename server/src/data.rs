use std::{
    collections::HashMap,
    io,
    sync::{
        atomic::{AtomicU64, Ordering},
        LazyLock, Mutex,
    },
};

use crate::{
    config::ServerConfig,
    db::{GroupStore, UserStore},
    fsops::FileEngine,
    types::Session,
};

/// Capacity ceiling of the session table.
pub const MAX_SESSIONS: usize = 100;

/**
 * Shared mutable state: the process-wide session registry.
 *
 * The lock protects table structure only and is never held across I/O;
 * per-session fields are mutated exclusively by the owning connection's
 * worker through `update_session`.
 */
static SESSIONS: LazyLock<Mutex<HashMap<u64, Session>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates a fresh connection id. Never reused within a process.
pub fn next_conn_id() -> u64 {
    NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed)
}

/// Registers a new connection. Returns `false` when the table is full;
/// the caller must refuse the connection rather than drop it silently.
pub fn add_session(conn_id: u64, client_ip: String) -> bool {
    let mut sessions = SESSIONS.lock().unwrap();
    if sessions.len() >= MAX_SESSIONS {
        return false;
    }
    sessions.insert(conn_id, Session::new(conn_id, client_ip));
    true
}

/// Removes a session when its connection closes.
pub fn remove_session(conn_id: u64) {
    let mut sessions = SESSIONS.lock().unwrap();
    sessions.remove(&conn_id);
}

/// Returns a snapshot of the session, if registered.
pub fn get_session(conn_id: u64) -> Option<Session> {
    let sessions = SESSIONS.lock().unwrap();
    sessions.get(&conn_id).cloned()
}

/// Mutates the session under the table lock. Returns `false` if the
/// session is gone.
pub fn update_session<F>(conn_id: u64, f: F) -> bool
where
    F: FnOnce(&mut Session),
{
    let mut sessions = SESSIONS.lock().unwrap();
    match sessions.get_mut(&conn_id) {
        Some(session) => {
            f(session);
            true
        }
        None => false,
    }
}

/// Everything a connection worker needs besides its own session: the
/// immutable config, the flat-file stores, and the file engine rooted at
/// the storage directory.
pub struct ServerCtx {
    pub config: ServerConfig,
    pub users: UserStore,
    pub groups: GroupStore,
    pub engine: FileEngine,
}

impl ServerCtx {
    pub fn new(config: ServerConfig) -> io::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let users = UserStore::new(config.data_dir.join("users.txt"));
        let groups = GroupStore::new(
            config.data_dir.join("groups.txt"),
            config.data_dir.join("group_members.txt"),
        );
        let engine = FileEngine::new(&config.storage_root)?;

        Ok(Self {
            config,
            users,
            groups,
            engine,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single test to avoid concurrent interference on the global table.
    #[test]
    fn session_lifecycle_and_capacity() {
        let id = next_conn_id();
        assert!(add_session(id, "127.0.0.1".into()));

        let s = get_session(id).unwrap();
        assert_eq!(s.user_id, -1);
        assert_eq!(s.username, "Guest");
        assert!(!s.is_logged_in);

        assert!(update_session(id, |s| {
            s.user_id = 7;
            s.username = "alice".into();
            s.is_logged_in = true;
        }));
        let s = get_session(id).unwrap();
        assert!(s.is_logged_in);
        assert_eq!(s.user_id, 7);

        // Fill the table to the ceiling; the next add must be refused.
        let mut extra = Vec::new();
        loop {
            let next = next_conn_id();
            if !add_session(next, "127.0.0.1".into()) {
                break;
            }
            extra.push(next);
            assert!(extra.len() <= MAX_SESSIONS);
        }
        for conn in extra {
            remove_session(conn);
        }

        remove_session(id);
        assert!(get_session(id).is_none());
        assert!(!update_session(id, |_| {}));
    }
}
