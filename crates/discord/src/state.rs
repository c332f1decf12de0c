use std::{
    collections::BTreeSet,
    sync::{Arc, RwLock},
};

/// Users who have opened a direct conversation with the bot.
///
/// Shared between the event handler, which records inbound DMs, and the
/// client, which lists them as broadcast recipients. Nothing is persisted:
/// the set starts empty for every connection.
#[derive(Debug, Clone, Default)]
pub struct DirectContacts {
    users: Arc<RwLock<BTreeSet<u64>>>,
}

impl DirectContacts {
    /// Returns `true` when the user was not known yet.
    pub fn record(&self, user_id: u64) -> bool {
        self.users
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user_id)
    }

    #[must_use]
    pub fn user_ids(&self) -> Vec<u64> {
        self.users
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .copied()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.users.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
