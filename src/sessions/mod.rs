pub mod repo;

use serde::{Deserialize, Serialize};

/// At most this many live sessions per identity; logging in on a third
/// device evicts the oldest session.
pub const SESSION_CAP: usize = 2;

/// Which credential space a session belongs to. Users and admins live in
/// separate tables, so the session store carries the role alongside the
/// subject email.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

/// Informational client metadata recorded on the session.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// How many existing sessions must be evicted so that one more fits under
/// the cap. The count it is applied to is only trustworthy while the
/// caller holds the per-identity advisory lock (`repo::create_session`);
/// two logins counting concurrently would each see too few sessions.
pub fn evict_count(existing: usize, cap: usize) -> usize {
    (existing + 1).saturating_sub(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cap_math_keeps_exactly_two_after_insert() {
        assert_eq!(evict_count(0, SESSION_CAP), 0);
        assert_eq!(evict_count(1, SESSION_CAP), 0);
        assert_eq!(evict_count(2, SESSION_CAP), 1);
        // Pathological backlog still drains to cap - 1 before the insert.
        assert_eq!(evict_count(5, SESSION_CAP), 4);
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        assert_eq!(Role::Admin.as_str(), "admin");
    }
}
