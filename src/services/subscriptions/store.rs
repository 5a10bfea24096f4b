//! Subscription arena
//!
//! Subscriptions live in registration order. Each one sits behind its own
//! async mutex so concurrent scan workers serialize their updates per
//! subscription without blocking each other on unrelated ones.

use std::sync::Arc;

use anyhow::{Context, Result, ensure};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::Subscription;
use crate::services::parser::MediaKind;
use crate::services::resolver::EpisodeSet;

struct Slot {
    id: String,
    kind: MediaKind,
    subscription: Mutex<Subscription>,
}

#[derive(Default)]
pub struct SubscriptionStore {
    slots: RwLock<Vec<Arc<Slot>>>,
}

impl SubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription. Ids must be unique and filters must compile.
    pub fn add(&self, subscription: Subscription) -> Result<()> {
        ensure!(!subscription.id.is_empty(), "subscription id must not be empty");
        subscription
            .filters
            .compile()
            .with_context(|| format!("invalid filters on subscription {}", subscription.id))?;

        let mut slots = self.slots.write();
        ensure!(
            !slots.iter().any(|s| s.id == subscription.id),
            "duplicate subscription id {}",
            subscription.id
        );
        debug!(id = %subscription.id, title = %subscription.title, "Subscription added");
        slots.push(Arc::new(Slot {
            id: subscription.id.clone(),
            kind: subscription.kind,
            subscription: Mutex::new(subscription),
        }));
        Ok(())
    }

    fn slot(&self, id: &str) -> Option<Arc<Slot>> {
        self.slots.read().iter().find(|s| s.id == id).cloned()
    }

    pub async fn get(&self, id: &str) -> Option<Subscription> {
        let slot = self.slot(id)?;
        let subscription = slot.subscription.lock().await;
        Some(subscription.clone())
    }

    /// Finish a subscription
    pub fn remove(&self, id: &str) -> bool {
        let mut slots = self.slots.write();
        let before = slots.len();
        slots.retain(|s| s.id != id);
        let removed = slots.len() != before;
        if removed {
            info!(id = %id, "Subscription finished");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    async fn snapshot(&self, kind: MediaKind) -> Vec<Subscription> {
        let slots: Vec<Arc<Slot>> = self
            .slots
            .read()
            .iter()
            .filter(|s| s.kind == kind)
            .cloned()
            .collect();
        let mut subscriptions = Vec::with_capacity(slots.len());
        for slot in slots {
            subscriptions.push(slot.subscription.lock().await.clone());
        }
        subscriptions
    }

    /// Movie subscriptions in registration order
    pub async fn movies(&self) -> Vec<Subscription> {
        self.snapshot(MediaKind::Movie).await
    }

    /// TV subscriptions in registration order
    pub async fn tvs(&self) -> Vec<Subscription> {
        self.snapshot(MediaKind::Tv).await
    }

    /// Fold an accepted release's remaining gap into the recorded missing set.
    ///
    /// Two workers accepting different episodes both land: the stored set is
    /// the intersection of what each left behind. Returns the merged set.
    pub async fn record_episodes(&self, id: &str, remaining: &EpisodeSet) -> Option<EpisodeSet> {
        let slot = self.slot(id)?;
        let mut subscription = slot.subscription.lock().await;
        let current = match &subscription.recorded_missing {
            Some(recorded) => EpisodeSet::Only(recorded.clone()),
            None => EpisodeSet::All,
        };
        let merged = current.intersect(remaining);
        subscription.recorded_missing = match &merged {
            EpisodeSet::Only(set) => Some(set.clone()),
            EpisodeSet::All => None,
        };
        debug!(id = %id, missing = ?merged, "Recorded missing episodes");
        Some(merged)
    }

    /// Remember an accepted upgrade. Returns false when `score` is not an improvement.
    pub async fn record_upgrade(&self, id: &str, score: i32) -> bool {
        let Some(slot) = self.slot(id) else {
            return false;
        };
        let mut subscription = slot.subscription.lock().await;
        if subscription.best_accepted_score.is_some_and(|best| score <= best) {
            return false;
        }
        subscription.best_accepted_score = Some(score);
        debug!(id = %id, score, "Recorded upgrade score");
        true
    }

    /// Mark that holdings were unknown; the subscription must not auto-finish
    pub async fn record_indeterminate(&self, id: &str) -> bool {
        let Some(slot) = self.slot(id) else {
            return false;
        };
        slot.subscription.lock().await.indeterminate = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::rules::FilterArgs;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    fn sub(id: &str, kind: MediaKind) -> Subscription {
        Subscription {
            id: id.to_string(),
            kind,
            title: id.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_registration_order_and_removal() {
        let store = SubscriptionStore::new();
        store.add(sub("b", MediaKind::Movie)).unwrap();
        store.add(sub("t", MediaKind::Tv)).unwrap();
        store.add(sub("a", MediaKind::Movie)).unwrap();
        assert!(store.add(sub("a", MediaKind::Movie)).is_err());

        let ids: Vec<String> = store.movies().await.into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["b".to_string(), "a".to_string()]);
        assert_eq!(store.tvs().await.len(), 1);

        assert!(store.remove("b"));
        assert!(!store.remove("b"));
        assert!(store.get("b").await.is_none());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_filters_are_rejected() {
        let store = SubscriptionStore::new();
        let mut bad = sub("x", MediaKind::Movie);
        bad.filters = FilterArgs {
            exclude: Some("[".to_string()),
            ..Default::default()
        };
        assert!(store.add(bad).is_err());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_episode_updates_both_land() {
        let store = Arc::new(SubscriptionStore::new());
        let mut tv = sub("t", MediaKind::Tv);
        tv.recorded_missing = Some(BTreeSet::from([5, 6]));
        store.add(tv).unwrap();

        let first = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .record_episodes("t", &EpisodeSet::Only(BTreeSet::from([6])))
                    .await
            })
        };
        let second = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .record_episodes("t", &EpisodeSet::Only(BTreeSet::from([5])))
                    .await
            })
        };
        first.await.unwrap();
        second.await.unwrap();

        let tv = store.get("t").await.unwrap();
        assert_eq!(tv.recorded_missing, Some(BTreeSet::new()));
    }

    #[tokio::test]
    async fn test_record_upgrade_only_improves() {
        let store = SubscriptionStore::new();
        store.add(sub("u", MediaKind::Movie)).unwrap();
        assert!(store.record_upgrade("u", 90).await);
        assert!(!store.record_upgrade("u", 90).await);
        assert!(store.record_upgrade("u", 95).await);
        assert_eq!(store.get("u").await.unwrap().best_accepted_score, Some(95));
        assert!(store.record_indeterminate("u").await);
        assert!(!store.record_indeterminate("missing").await);
    }
}
