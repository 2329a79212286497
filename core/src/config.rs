use crate::{reconcile::ReconcileMode, snapshot::SLOT_FORMAT_VERSION};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Engine and session singletons. The reconciler never destroys or
/// respawns these; they are only restored through explicit keys.
pub const DEFAULT_RESPAWN_EXCLUDED: &[&str] = &[
    "GameMode",
    "GameState",
    "PlayerState",
    "PlayerController",
    "GameSession",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SaveConfig {
    /// Max transform difference for a soft match, in world units.
    pub soft_match_epsilon:     f64,
    pub respawn_excluded_types: BTreeSet<String>,
    /// Mode used by load_world() and by callers that do not choose one.
    pub default_mode:           ReconcileMode,
    /// Seed for runtime key generation. None draws from the platform RNG.
    pub key_seed:               Option<u64>,
    /// Newest slot format this build will read.
    pub max_format_version:     u32,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            soft_match_epsilon:     0.001,
            respawn_excluded_types: DEFAULT_RESPAWN_EXCLUDED.iter().map(|s| s.to_string()).collect(),
            default_mode:           ReconcileMode::Incremental,
            key_seed:               None,
            max_format_version:     SLOT_FORMAT_VERSION,
        }
    }
}

impl SaveConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    /// In tests, use SaveConfig::default_test().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        Self::from_json(&content).map_err(|e| anyhow::anyhow!("Invalid save config {path}: {e}"))
    }

    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        let config: SaveConfig = serde_json::from_str(content)?;
        if !(config.soft_match_epsilon >= 0.0) {
            anyhow::bail!("soft_match_epsilon must be a non-negative number");
        }
        Ok(config)
    }

    /// Defaults with a fixed key seed, so generated keys are reproducible.
    pub fn default_test() -> Self {
        Self { key_seed: Some(0x5EED_CAFE), ..Self::default() }
    }

    pub fn is_respawn_excluded(&self, type_name: &str) -> bool {
        self.respawn_excluded_types.contains(type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = SaveConfig::from_json(r#"{ "soft_match_epsilon": 0.5 }"#).expect("parse");
        assert_eq!(config.soft_match_epsilon, 0.5);
        assert!(config.is_respawn_excluded("GameMode"));
        assert_eq!(config.default_mode, ReconcileMode::Incremental);
    }

    #[test]
    fn full_rebuild_mode_and_custom_exclusions() {
        let config = SaveConfig::from_json(
            r#"{ "default_mode": "full_rebuild", "respawn_excluded_types": ["Weather"] }"#,
        )
        .expect("parse");
        assert_eq!(config.default_mode, ReconcileMode::FullRebuild);
        assert!(config.is_respawn_excluded("Weather"));
        assert!(!config.is_respawn_excluded("GameMode"));
    }

    #[test]
    fn negative_epsilon_is_rejected() {
        assert!(SaveConfig::from_json(r#"{ "soft_match_epsilon": -1.0 }"#).is_err());
    }
}
