//! Change fan-out for highlight listings
//!
//! One broadcast channel per (book, scope filter) pair. Subscribers asking
//! for a pair that already has a live channel share it, so a listing is
//! never observed twice.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, RwLock};

use super::types::{HighlightRegion, ScopeFilter};

/// A change visible to one listing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HighlightChange {
    /// Created or modified; carries the full current record
    Upserted { highlight: HighlightRegion },
    /// No longer part of the listing (deleted or made private)
    Hidden { id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ListenerKey {
    book_id: String,
    filter: ScopeFilter,
}

/// Registry of live listing channels
#[derive(Clone)]
pub struct ListenerRegistry {
    channels: Arc<RwLock<HashMap<ListenerKey, broadcast::Sender<HighlightChange>>>>,
    capacity: usize,
}

impl ListenerRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to a listing, joining its channel if one is already live
    pub async fn subscribe(
        &self,
        book_id: &str,
        filter: ScopeFilter,
    ) -> broadcast::Receiver<HighlightChange> {
        let key = ListenerKey {
            book_id: book_id.to_string(),
            filter,
        };

        let mut channels = self.channels.write().await;
        if let Some(sender) = channels.get(&key) {
            if sender.receiver_count() > 0 {
                return sender.subscribe();
            }
        }

        tracing::debug!(book_id, filter = ?key.filter, "Opening highlight listener");
        let (sender, receiver) = broadcast::channel(self.capacity);
        channels.insert(key, sender);
        receiver
    }

    /// Number of live channels
    pub async fn active(&self) -> usize {
        let channels = self.channels.read().await;
        channels.values().filter(|s| s.receiver_count() > 0).count()
    }

    /// Announce that `current` replaced `previous`.
    ///
    /// Listings that admit `current` get the new record. Listings that
    /// showed `previous` but no longer admit the record are told to hide it.
    pub async fn publish(&self, previous: Option<&HighlightRegion>, current: &HighlightRegion) {
        self.dispatch(&current.book_id, |filter| {
            if filter.admits(current) {
                Some(HighlightChange::Upserted {
                    highlight: current.clone(),
                })
            } else if previous.is_some_and(|p| filter.admits(p)) {
                Some(HighlightChange::Hidden {
                    id: current.id.clone(),
                })
            } else {
                None
            }
        })
        .await;
    }

    /// Announce that `removed` was deleted
    pub async fn publish_removed(&self, removed: &HighlightRegion) {
        self.dispatch(&removed.book_id, |filter| {
            filter.admits(removed).then(|| HighlightChange::Hidden {
                id: removed.id.clone(),
            })
        })
        .await;
    }

    async fn dispatch<F>(&self, book_id: &str, change_for: F)
    where
        F: Fn(&ScopeFilter) -> Option<HighlightChange>,
    {
        let mut channels = self.channels.write().await;
        channels.retain(|_, sender| sender.receiver_count() > 0);

        for (key, sender) in channels.iter() {
            if key.book_id != book_id {
                continue;
            }
            if let Some(change) = change_for(&key.filter) {
                // Send only fails when every receiver dropped in between
                if sender.send(change).is_err() {
                    tracing::debug!(book_id, "Listener closed during publish");
                }
            }
        }
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::highlights::{Bounds, HighlightScope};

    fn region(owner: &str, is_public: bool) -> HighlightRegion {
        HighlightRegion::new("book", "quote", 0, Bounds::default(), Some(owner), is_public)
    }

    fn all_for(user: &str) -> ScopeFilter {
        HighlightScope::AllPublic.filter_for(Some(user)).unwrap()
    }

    #[tokio::test]
    async fn test_one_channel_per_listing() {
        let registry = ListenerRegistry::new(8);

        let _a = registry.subscribe("book", all_for("bob")).await;
        let _b = registry.subscribe("book", all_for("bob")).await;
        assert_eq!(registry.active().await, 1);

        let _c = registry.subscribe("book", ScopeFilter::Owner("bob".into())).await;
        let _d = registry.subscribe("other", all_for("bob")).await;
        assert_eq!(registry.active().await, 3);
    }

    #[tokio::test]
    async fn test_shared_channel_reaches_all_subscribers() {
        let registry = ListenerRegistry::new(8);
        let mut a = registry.subscribe("book", all_for("bob")).await;
        let mut b = registry.subscribe("book", all_for("bob")).await;

        let r = region("alice", true);
        registry.publish(None, &r).await;

        let expected = HighlightChange::Upserted { highlight: r };
        assert_eq!(a.recv().await.unwrap(), expected);
        assert_eq!(b.recv().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_hidden_when_made_private() {
        let registry = ListenerRegistry::new(8);
        let mut bob = registry.subscribe("book", all_for("bob")).await;
        let mut alice = registry
            .subscribe("book", ScopeFilter::Owner("alice".into()))
            .await;

        let before = region("alice", true);
        let mut after = before.clone();
        after.is_public = false;
        registry.publish(Some(&before), &after).await;

        assert_eq!(
            bob.recv().await.unwrap(),
            HighlightChange::Hidden { id: after.id.clone() }
        );
        assert_eq!(
            alice.recv().await.unwrap(),
            HighlightChange::Upserted { highlight: after }
        );
    }

    #[tokio::test]
    async fn test_private_change_not_leaked() {
        let registry = ListenerRegistry::new(8);
        let mut bob = registry.subscribe("book", all_for("bob")).await;

        registry.publish(None, &region("alice", false)).await;
        assert!(matches!(
            bob.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_publish_removed() {
        let registry = ListenerRegistry::new(8);
        let mut bob = registry.subscribe("book", all_for("bob")).await;

        let r = region("alice", true);
        registry.publish_removed(&r).await;
        assert_eq!(bob.recv().await.unwrap(), HighlightChange::Hidden { id: r.id });
    }

    #[tokio::test]
    async fn test_dropped_listeners_are_pruned() {
        let registry = ListenerRegistry::new(8);
        let rx = registry.subscribe("book", all_for("bob")).await;
        drop(rx);

        registry.publish(None, &region("alice", true)).await;
        assert_eq!(registry.active().await, 0);
        assert!(registry.channels.read().await.is_empty());
    }

    #[test]
    fn test_change_serialization() {
        let json = serde_json::to_value(HighlightChange::Hidden { id: "abc".into() }).unwrap();
        assert_eq!(json["type"], "hidden");
        assert_eq!(json["id"], "abc");
    }
}
