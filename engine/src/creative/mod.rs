//! Creative asset selection.
//!
//! A [`CreativeLinker`] is built once from selection rules and an asset
//! catalogue and then answers [`CreativeLinker::link`] for any number of
//! rows. It holds no mutable state; concurrent callers can share it.
//!
//! Rules are tried by ascending `priority` (ties keep declaration order).
//! Disabled rules are skipped, all conditions of a rule must hold, and a
//! rule without conditions always matches. A matching rule whose assets are
//! all unknown is skipped with an `ASSET_NOT_FOUND` warning.

pub mod constraints;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::models::{EntityType, ErrorCode, Row, ValidationIssue};
use crate::transform::Condition;

pub use constraints::{validate_creative_fields, FieldConstraint, FieldFormat};

/// Creative rule conditions share the COUNT_IF operator set.
pub type CreativeCondition = Condition;

/// Kind of creative asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    #[default]
    Image,
    Video,
    Text,
    Html,
}

/// An entry of the asset catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreativeAsset {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub kind: AssetKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl CreativeAsset {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: AssetKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            url: None,
            tags: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

fn default_enabled() -> bool {
    true
}

/// Conditions that select a set of assets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreativeSelectionRule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub conditions: Vec<CreativeCondition>,
    pub asset_ids: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl CreativeSelectionRule {
    pub fn new(id: impl Into<String>, name: impl Into<String>, priority: i32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            priority,
            conditions: Vec::new(),
            asset_ids: Vec::new(),
            enabled: true,
        }
    }

    pub fn when(mut self, condition: CreativeCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn assets<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.asset_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// All conditions hold for `row`.
    pub fn matches(&self, row: &Row) -> bool {
        self.conditions.iter().all(|c| c.evaluate(row))
    }
}

/// The rule that produced a mapping.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedRule {
    pub id: String,
    pub name: String,
    pub priority: i32,
}

/// Result of linking one row. `rule == None` is the "no match" outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreativeMapping {
    pub rule: Option<MatchedRule>,
    pub assets: Vec<CreativeAsset>,
    pub warnings: Vec<ValidationIssue>,
}

impl CreativeMapping {
    pub fn is_match(&self) -> bool {
        self.rule.is_some()
    }
}

/// Caller-owned rule evaluator.
#[derive(Debug, Clone)]
pub struct CreativeLinker {
    rules: Vec<CreativeSelectionRule>,
    assets: HashMap<String, CreativeAsset>,
}

impl CreativeLinker {
    /// Validate and order `rules`. Duplicate rule ids and conditions that
    /// can never be evaluated are rejected.
    pub fn new(rules: Vec<CreativeSelectionRule>, assets: Vec<CreativeAsset>) -> ConfigResult<Self> {
        let mut ids = HashSet::new();
        for rule in &rules {
            if !ids.insert(rule.id.as_str()) {
                return Err(ConfigError::DuplicateRuleId(rule.id.clone()));
            }
            for condition in &rule.conditions {
                condition.check().map_err(|message| ConfigError::InvalidCondition {
                    owner: rule.id.clone(),
                    message,
                })?;
            }
        }

        let mut rules = rules;
        rules.sort_by_key(|r| r.priority);
        let assets = assets.into_iter().map(|a| (a.id.clone(), a)).collect();
        Ok(Self { rules, assets })
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[CreativeSelectionRule] {
        &self.rules
    }

    pub fn asset(&self, id: &str) -> Option<&CreativeAsset> {
        self.assets.get(id)
    }

    /// Pick the assets for `row`.
    pub fn link(&self, row: &Row) -> CreativeMapping {
        let mut mapping = CreativeMapping::default();

        for rule in self.rules.iter().filter(|r| r.enabled) {
            if !rule.matches(row) {
                continue;
            }

            let mut found = Vec::new();
            for id in &rule.asset_ids {
                match self.assets.get(id) {
                    Some(asset) => found.push(asset.clone()),
                    None => mapping.warnings.push(
                        ValidationIssue::new(
                            EntityType::Creative,
                            &rule.id,
                            &rule.name,
                            "assetIds",
                            ErrorCode::AssetNotFound,
                            format!("Rule '{}' references unknown asset '{}'", rule.name, id),
                        )
                        .with_value(id),
                    ),
                }
            }
            if found.is_empty() {
                debug!(rule = %rule.id, "matched rule has no usable assets, trying next");
                continue;
            }

            mapping.rule = Some(MatchedRule {
                id: rule.id.clone(),
                name: rule.name.clone(),
                priority: rule.priority,
            });
            mapping.assets = found;
            return mapping;
        }
        mapping
    }
}
