//! Scan plan file
//!
//! A JSON document declaring the sites to poll, the rule groups, the
//! subscriptions and a holdings snapshot. It stands in for persisted state.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::indexer::SiteProfile;
use crate::services::library::HoldingsSnapshot;
use crate::services::rules::{RuleBook, RuleGroup};
use crate::services::subscriptions::{Subscription, SubscriptionStore};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanPlan {
    pub sites: Vec<SiteProfile>,
    pub rule_groups: Vec<RuleGroup>,
    pub default_rule_group: Option<String>,
    pub subscriptions: Vec<Subscription>,
    pub holdings: HoldingsSnapshot,
}

impl ScanPlan {
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read scan plan {}", path.display()))?;
        let plan: ScanPlan = serde_json::from_str(&content)
            .with_context(|| format!("Invalid scan plan {}", path.display()))?;
        info!(
            path = %path.display(),
            sites = plan.sites.len(),
            rule_groups = plan.rule_groups.len(),
            subscriptions = plan.subscriptions.len(),
            "Scan plan loaded"
        );
        Ok(plan)
    }

    pub fn rule_book(&self) -> Result<RuleBook> {
        RuleBook::new(&self.rule_groups, self.default_rule_group.as_deref())
            .context("Invalid rule groups in scan plan")
    }

    pub fn subscription_store(&self) -> Result<SubscriptionStore> {
        let store = SubscriptionStore::new();
        for subscription in &self.subscriptions {
            store.add(subscription.clone())?;
        }
        Ok(store)
    }
}
