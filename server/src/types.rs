use std::fmt;

/// Per-connection mutable record of authentication state.
///
/// Invariant: `is_logged_in == true` implies `user_id >= 0` and a real
/// username. Only the worker owning the connection mutates its session.
#[derive(Debug, Clone)]
pub struct Session {
    pub conn_id: u64,
    pub user_id: i64,
    pub username: String,
    pub client_ip: String,
    pub is_logged_in: bool,
}

impl Session {
    pub fn new(conn_id: u64, client_ip: String) -> Self {
        Self {
            conn_id,
            user_id: -1,
            username: "Guest".to_string(),
            client_ip,
            is_logged_in: false,
        }
    }
}

/// One row of the user store.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password: String,
}

/// One row of the group store. The owner is implicitly an accepted member.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupInfo {
    pub group_id: i64,
    pub name: String,
    pub owner_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    Pending,
    Accepted,
}

impl MemberStatus {
    /// Store encoding: 0 = pending, 1 = accepted.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Pending),
            1 => Some(Self::Accepted),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Pending => 0,
            Self::Accepted => 1,
        }
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Accepted => write!(f, "Member"),
        }
    }
}

/// One row of the membership store, keyed by `(group_id, user_id)`.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupMemberInfo {
    pub group_id: i64,
    pub user_id: i64,
    pub status: MemberStatus,
}
