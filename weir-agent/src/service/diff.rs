//! Diff engine
//!
//! Compares the running pipelines against the desired set and yields one
//! action per id of their union, ordered by id. Pure: no I/O, no failure
//! mode.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use weir_core::{PipelineConfig, PipelineId, fingerprint};

use super::registry::RunningPipeline;
use crate::repository::DesiredSet;

/// What one cycle does to one pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Desired but not running
    Create { config: PipelineConfig },
    /// Running with a different fingerprint than desired
    Reload {
        old: RunningPipeline,
        config: PipelineConfig,
    },
    /// Running but no longer desired
    Delete { old: RunningPipeline },
    /// Running exactly as desired
    NoOp { id: PipelineId },
}

impl Action {
    pub fn id(&self) -> &PipelineId {
        match self {
            Action::Create { config } | Action::Reload { config, .. } => &config.id,
            Action::Delete { old } => &old.id,
            Action::NoOp { id } => id,
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Create { .. } => ActionKind::Create,
            Action::Reload { .. } => ActionKind::Reload,
            Action::Delete { .. } => ActionKind::Delete,
            Action::NoOp { .. } => ActionKind::NoOp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Create,
    Reload,
    Delete,
    NoOp,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Create => "create",
            ActionKind::Reload => "reload",
            ActionKind::Delete => "delete",
            ActionKind::NoOp => "noop",
        };
        f.write_str(name)
    }
}

/// Computes the actions turning `running` into `desired`
pub fn diff(running: &BTreeMap<PipelineId, RunningPipeline>, desired: &DesiredSet) -> Vec<Action> {
    let ids: BTreeSet<&PipelineId> = running.keys().chain(desired.ids()).collect();

    ids.into_iter()
        .filter_map(|id| match (running.get(id), desired.get(id)) {
            (None, Some(config)) => Some(Action::Create {
                config: config.clone(),
            }),
            (Some(old), None) => Some(Action::Delete { old: old.clone() }),
            (Some(old), Some(config)) if old.fingerprint == fingerprint(config) => {
                Some(Action::NoOp { id: id.clone() })
            }
            (Some(old), Some(config)) => Some(Action::Reload {
                old: old.clone(),
                config: config.clone(),
            }),
            (None, None) => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn running(configs: &[PipelineConfig]) -> BTreeMap<PipelineId, RunningPipeline> {
        configs
            .iter()
            .map(|config| {
                (
                    config.id.clone(),
                    RunningPipeline {
                        id: config.id.clone(),
                        config: config.clone(),
                        fingerprint: fingerprint(config),
                        started_at: Utc::now(),
                        reloaded_at: None,
                    },
                )
            })
            .collect()
    }

    fn desired(configs: &[PipelineConfig]) -> DesiredSet {
        DesiredSet::from_configs(configs.to_vec()).unwrap()
    }

    #[test]
    fn test_diff_covers_every_rule() {
        let current = running(&[
            PipelineConfig::new("changed", "old"),
            PipelineConfig::new("gone", "src"),
            PipelineConfig::new("same", "src"),
        ]);
        let wanted = desired(&[
            PipelineConfig::new("same", "src"),
            PipelineConfig::new("new", "src"),
            PipelineConfig::new("changed", "new"),
        ]);

        let actions = diff(&current, &wanted);
        let summary: Vec<(&str, ActionKind)> =
            actions.iter().map(|a| (a.id().as_str(), a.kind())).collect();

        assert_eq!(
            summary,
            vec![
                ("changed", ActionKind::Reload),
                ("gone", ActionKind::Delete),
                ("new", ActionKind::Create),
                ("same", ActionKind::NoOp),
            ]
        );
    }

    #[test]
    fn test_reload_carries_old_and_new() {
        let current = running(&[PipelineConfig::new("main", "old")]);
        let wanted = desired(&[PipelineConfig::new("main", "new")]);

        match &diff(&current, &wanted)[0] {
            Action::Reload { old, config } => {
                assert_eq!(old.config.source_text, "old");
                assert_eq!(config.source_text, "new");
            }
            other => panic!("expected reload, got {:?}", other),
        }
    }

    #[test]
    fn test_whitespace_only_change_is_noop() {
        let current = running(&[PipelineConfig::new("main", "return {}")]);
        let wanted = desired(&[PipelineConfig::new("main", "return {}  \n")]);

        assert_eq!(diff(&current, &wanted)[0].kind(), ActionKind::NoOp);
    }

    #[test]
    fn test_settings_change_is_reload() {
        let current = running(&[PipelineConfig::new("main", "return {}")]);
        let wanted = desired(&[PipelineConfig::new("main", "return {}")
            .with_setting("pipeline.batch.size", serde_json::json!(10))]);

        assert_eq!(diff(&current, &wanted)[0].kind(), ActionKind::Reload);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(diff(&BTreeMap::new(), &DesiredSet::default()).is_empty());
    }
}
