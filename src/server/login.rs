use std::collections::HashMap;
use std::collections::hash_map::Entry;

/// Pairs `UUID of player` lines with the plain login line that follows.
///
/// The server announces a player's profile id on one line and confirms the
/// login on another. The id is parked here until the confirmation arrives.
/// A correlator lives for exactly one server session.
#[derive(Debug, Default)]
pub struct LoginCorrelator {
    pending: HashMap<String, String>,
}

impl LoginCorrelator {
    /// Create an empty correlator
    pub fn new() -> Self {
        Self::default()
    }

    /// Park the profile id of a player whose login is not confirmed yet.
    ///
    /// Returns `false` if the player already had a pending id; the first id
    /// is kept.
    pub fn on_uuid_line(&mut self, user: &str, uuid: &str) -> bool {
        match self.pending.entry(user.to_string()) {
            Entry::Occupied(_) => {
                tracing::debug!(user, uuid, "Discarding duplicate UUID line for pending login");
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(uuid.to_string());
                true
            }
        }
    }

    /// Complete a login, returning the parked profile id if there was one.
    pub fn on_plain_login_line(&mut self, user: &str) -> Option<String> {
        self.pending.remove(user)
    }

    /// Forget every pending login
    pub fn reset(&mut self) {
        self.pending.clear();
    }

    /// Number of logins waiting for confirmation
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_then_login() {
        let mut correlator = LoginCorrelator::new();
        assert!(correlator.on_uuid_line("Bob", "u1"));
        assert_eq!(correlator.on_plain_login_line("Bob"), Some("u1".to_string()));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[test]
    fn test_login_without_uuid() {
        let mut correlator = LoginCorrelator::new();
        assert_eq!(correlator.on_plain_login_line("Carol"), None);
    }

    #[test]
    fn test_id_is_consumed_once() {
        let mut correlator = LoginCorrelator::new();
        correlator.on_uuid_line("Bob", "u1");
        assert_eq!(correlator.on_plain_login_line("Bob"), Some("u1".to_string()));
        assert_eq!(correlator.on_plain_login_line("Bob"), None);
    }

    #[test]
    fn test_first_uuid_wins() {
        let mut correlator = LoginCorrelator::new();
        assert!(correlator.on_uuid_line("Bob", "u1"));
        assert!(!correlator.on_uuid_line("Bob", "u2"));
        assert_eq!(correlator.pending_count(), 1);
        assert_eq!(correlator.on_plain_login_line("Bob"), Some("u1".to_string()));
    }

    #[test]
    fn test_reset_drops_pending() {
        let mut correlator = LoginCorrelator::new();
        correlator.on_uuid_line("Bob", "u1");
        correlator.reset();
        assert_eq!(correlator.on_plain_login_line("Bob"), None);
    }
}
