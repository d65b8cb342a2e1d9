//! Which versions serve traffic behind each alias.
//!
//! Each alias is a `watch` channel. Routers subscribe and see every weight
//! change the owning rollout publishes; only the rollout loop and
//! [`AliasRegistry::create`] write.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, watch};
use tracing::{debug, info};

use deployline_core::VersionId;

use crate::error::{RolloutError, RolloutResult};

/// The version receiving shifted traffic during a rollout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanaryTarget {
    pub version: VersionId,
    /// Percentage of requests routed to `version` (0..=100).
    pub weight: u8,
}

/// Current routing for one alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasState {
    pub name: String,
    /// The version that takes all traffic not routed to the canary.
    pub live: VersionId,
    pub canary: Option<CanaryTarget>,
}

impl AliasState {
    fn new(name: &str, live: VersionId) -> Self {
        Self {
            name: name.to_string(),
            live,
            canary: None,
        }
    }

    /// Percentage of traffic `version` receives.
    pub fn weight_of(&self, version: &VersionId) -> u8 {
        let canary = self.canary.as_ref().map(|c| c.weight).unwrap_or(0);
        match &self.canary {
            Some(c) if &c.version == version => c.weight,
            _ if &self.live == version => 100 - canary,
            _ => 0,
        }
    }

    /// Pick the version for a request, given a uniform draw in `0..100`.
    pub fn route(&self, draw: u8) -> &VersionId {
        match &self.canary {
            Some(c) if draw < c.weight => &c.version,
            _ => &self.live,
        }
    }
}

/// Named aliases, each with its own watch channel.
#[derive(Clone, Default)]
pub struct AliasRegistry {
    aliases: Arc<RwLock<HashMap<String, watch::Sender<AliasState>>>>,
}

impl AliasRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an alias serving `live` with no canary.
    pub async fn create(&self, name: &str, live: VersionId) -> RolloutResult<AliasState> {
        let mut aliases = self.aliases.write().await;
        if aliases.contains_key(name) {
            return Err(RolloutError::AliasExists(name.to_string()));
        }
        let state = AliasState::new(name, live);
        let (tx, _rx) = watch::channel(state.clone());
        aliases.insert(name.to_string(), tx);
        info!(alias = %name, live = %state.live, "alias created");
        Ok(state)
    }

    pub async fn get(&self, name: &str) -> Option<AliasState> {
        let aliases = self.aliases.read().await;
        aliases.get(name).map(|tx| tx.borrow().clone())
    }

    /// All aliases, sorted by name.
    pub async fn list(&self) -> Vec<AliasState> {
        let aliases = self.aliases.read().await;
        let mut states: Vec<AliasState> = aliases.values().map(|tx| tx.borrow().clone()).collect();
        states.sort_by(|a, b| a.name.cmp(&b.name));
        states
    }

    /// Follow routing changes on `name`.
    pub async fn subscribe(&self, name: &str) -> RolloutResult<watch::Receiver<AliasState>> {
        let aliases = self.aliases.read().await;
        aliases
            .get(name)
            .map(watch::Sender::subscribe)
            .ok_or_else(|| RolloutError::UnknownAlias(name.to_string()))
    }

    /// Route `weight`% of `name` to `version`.
    pub(crate) async fn shift(&self, name: &str, version: &VersionId, weight: u8) -> RolloutResult<()> {
        self.update(name, |state| {
            state.canary = Some(CanaryTarget {
                version: version.clone(),
                weight: weight.min(100),
            });
        })
        .await?;
        debug!(alias = %name, %version, weight, "alias weight shifted");
        Ok(())
    }

    /// Make `version` the sole live version.
    pub(crate) async fn promote(&self, name: &str, version: &VersionId) -> RolloutResult<()> {
        self.update(name, |state| {
            state.live = version.clone();
            state.canary = None;
        })
        .await?;
        info!(alias = %name, live = %version, "alias promoted");
        Ok(())
    }

    /// Drop the canary; all traffic returns to the live version.
    pub(crate) async fn revert(&self, name: &str) -> RolloutResult<()> {
        self.update(name, |state| state.canary = None).await?;
        info!(alias = %name, "alias reverted");
        Ok(())
    }

    async fn update(&self, name: &str, f: impl FnOnce(&mut AliasState)) -> RolloutResult<()> {
        let aliases = self.aliases.read().await;
        let tx = aliases
            .get(name)
            .ok_or_else(|| RolloutError::UnknownAlias(name.to_string()))?;
        tx.send_modify(f);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_get() {
        let registry = AliasRegistry::new();
        registry.create("Current", VersionId::new("v1")).await.unwrap();

        let state = registry.get("Current").await.unwrap();
        assert_eq!(state.live, VersionId::new("v1"));
        assert!(state.canary.is_none());
        assert!(registry.get("Missing").await.is_none());
    }

    #[tokio::test]
    async fn duplicate_alias_rejected() {
        let registry = AliasRegistry::new();
        registry.create("Current", VersionId::new("v1")).await.unwrap();
        assert!(matches!(
            registry.create("Current", VersionId::new("v2")).await,
            Err(RolloutError::AliasExists(_))
        ));
    }

    #[tokio::test]
    async fn subscribers_see_shifts() {
        let registry = AliasRegistry::new();
        registry.create("Current", VersionId::new("v1")).await.unwrap();
        let mut rx = registry.subscribe("Current").await.unwrap();

        let v2 = VersionId::new("v2");
        registry.shift("Current", &v2, 10).await.unwrap();
        rx.changed().await.unwrap();
        let state = rx.borrow_and_update().clone();
        assert_eq!(state.weight_of(&v2), 10);
        assert_eq!(state.weight_of(&VersionId::new("v1")), 90);

        registry.promote("Current", &v2).await.unwrap();
        rx.changed().await.unwrap();
        let state = rx.borrow_and_update().clone();
        assert_eq!(state.live, v2);
        assert_eq!(state.weight_of(&v2), 100);
    }

    #[tokio::test]
    async fn revert_clears_canary() {
        let registry = AliasRegistry::new();
        registry.create("Current", VersionId::new("v1")).await.unwrap();
        registry.shift("Current", &VersionId::new("v2"), 50).await.unwrap();
        registry.revert("Current").await.unwrap();

        let state = registry.get("Current").await.unwrap();
        assert_eq!(state.live, VersionId::new("v1"));
        assert!(state.canary.is_none());
    }

    #[tokio::test]
    async fn subscribe_unknown_alias_fails() {
        let registry = AliasRegistry::new();
        assert!(matches!(
            registry.subscribe("nope").await,
            Err(RolloutError::UnknownAlias(_))
        ));
    }

    #[test]
    fn route_splits_by_weight() {
        let state = AliasState {
            name: "Current".to_string(),
            live: VersionId::new("v1"),
            canary: Some(CanaryTarget {
                version: VersionId::new("v2"),
                weight: 10,
            }),
        };
        assert_eq!(state.route(0), &VersionId::new("v2"));
        assert_eq!(state.route(9), &VersionId::new("v2"));
        assert_eq!(state.route(10), &VersionId::new("v1"));
        assert_eq!(state.route(99), &VersionId::new("v1"));
    }
}
