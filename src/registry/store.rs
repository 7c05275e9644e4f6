//! Subscription registry implementation

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use super::entry::{LocalId, NotifyFn, RemoteId, Subscription};
use super::error::RegistryError;

/// Arena of live subscriptions with a remote-id index
///
/// Every mutation keeps `by_remote` consistent with the `remote_id` fields in
/// `entries`: a remote id maps to exactly one live local id.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    /// Subscriptions keyed by local id (ordered, so replay is deterministic)
    entries: BTreeMap<LocalId, Subscription>,

    /// Upstream subscription id to local id
    by_remote: HashMap<RemoteId, LocalId>,
}

impl SubscriptionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscription
    ///
    /// Returns an error if `local_id` is already live.
    pub fn register(
        &mut self,
        local_id: LocalId,
        method: impl Into<String>,
        params: Vec<Value>,
        on_notify: NotifyFn,
    ) -> Result<(), RegistryError> {
        if self.entries.contains_key(&local_id) {
            return Err(RegistryError::DuplicateId(local_id));
        }

        let sub = Subscription::new(local_id, method.into(), params, on_notify);
        tracing::debug!(
            local_id = local_id,
            method = %sub.method,
            "Subscription registered"
        );
        self.entries.insert(local_id, sub);

        Ok(())
    }

    /// Record the upstream id for a subscription
    ///
    /// Returns false if `local_id` is not live. If another live subscription
    /// still claims `remote_id`, its claim is cleared.
    pub fn set_remote_id(&mut self, local_id: LocalId, remote_id: RemoteId) -> bool {
        let previous = match self.entries.get(&local_id) {
            Some(sub) => sub.remote_id,
            None => return false,
        };

        if let Some(old) = previous {
            self.by_remote.remove(&old);
        }

        if let Some(other) = self.by_remote.insert(remote_id, local_id) {
            if other != local_id {
                tracing::warn!(
                    remote_id = remote_id,
                    previous_owner = other,
                    new_owner = local_id,
                    "Remote subscription id reassigned"
                );
                if let Some(stale) = self.entries.get_mut(&other) {
                    stale.remote_id = None;
                }
            }
        }

        if let Some(sub) = self.entries.get_mut(&local_id) {
            sub.remote_id = Some(remote_id);
        }

        true
    }

    /// Get a subscription by local id
    pub fn get(&self, local_id: LocalId) -> Option<&Subscription> {
        self.entries.get(&local_id)
    }

    /// Check whether a local id is live
    pub fn contains(&self, local_id: LocalId) -> bool {
        self.entries.contains_key(&local_id)
    }

    /// Find the subscription the upstream knows as `remote_id`
    pub fn find_by_remote_id(&self, remote_id: RemoteId) -> Option<&Subscription> {
        self.by_remote
            .get(&remote_id)
            .and_then(|local_id| self.entries.get(local_id))
    }

    /// Remove a subscription, returning it if it was live
    pub fn remove(&mut self, local_id: LocalId) -> Option<Subscription> {
        let sub = self.entries.remove(&local_id)?;

        if let Some(remote_id) = sub.remote_id {
            self.by_remote.remove(&remote_id);
        }

        tracing::debug!(
            local_id = local_id,
            remote_id = ?sub.remote_id,
            "Subscription removed"
        );

        Some(sub)
    }

    /// Forget every upstream id
    ///
    /// Used when the upstream connection is replaced: ids from the old
    /// connection are meaningless on the new one.
    pub fn reset_remote_ids(&mut self) {
        self.by_remote.clear();
        for sub in self.entries.values_mut() {
            sub.remote_id = None;
        }
    }

    /// Iterate over all live subscriptions in local-id order
    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.entries.values()
    }

    /// Snapshot of all live local ids, in order
    pub fn local_ids(&self) -> Vec<LocalId> {
        self.entries.keys().copied().collect()
    }

    /// Number of live subscriptions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no live subscriptions
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of subscriptions the upstream has acknowledged
    pub fn acknowledged_count(&self) -> usize {
        self.by_remote.len()
    }
}
