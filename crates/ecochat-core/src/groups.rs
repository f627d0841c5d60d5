//! Deterministic broadcast group naming.
//!
//! Every operation that targets a session's audience derives the group name
//! through [`session_group`] so membership checks and broadcasts always
//! agree on the identifier.

/// Well-known group every connected admin belongs to.
pub const ADMINS_GROUP: &str = "admins";

/// Group name for a session's audience: the owning customer's connections
/// plus any admin viewing the conversation.
pub fn session_group(session_id: &str) -> String {
    format!("session_{session_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_group_is_prefixed() {
        assert_eq!(session_group("chat_abc"), "session_chat_abc");
    }

    #[test]
    fn session_group_is_deterministic() {
        assert_eq!(session_group("s1"), session_group("s1"));
        assert_ne!(session_group("s1"), session_group("s2"));
    }

    #[test]
    fn admins_group_constant() {
        assert_eq!(ADMINS_GROUP, "admins");
    }
}
