//! Policy management for `formtamer-core`.
//!
//! The policy is the whole user configuration: a namespaced record of feature
//! switches stored under [`STATE_KEY`]. This module defines the record, its
//! defaults, partial updates, the legacy key aliases written by older settings
//! pages, and the snapshot the engine works from during one application cycle.
//!
//! License: MIT OR Apache-2.0

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use formtamer_postcode::country_key;

/// Storage key of the policy record.
pub const STATE_KEY: &str = "formtamer_state";

/// Storage area (scope tag) the policy record lives in.
pub const SYNC_SCOPE: &str = "sync";

/// The user's feature switches.
///
/// Records are written with the current key names only. Reading goes through
/// [`Policy::from_record`], which also understands the legacy names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    /// Master switch. When off, nothing touches the document.
    pub enabled: bool,
    pub normalize_patterns: bool,
    pub suppress_validation: bool,
    pub override_submit: bool,
    pub show_postcode_hints: bool,
}

/// A stored record as found, one slot per key name it may use. Legacy and
/// current names are separate slots so a record carrying both still parses.
#[derive(Debug, Default, Deserialize)]
struct StoredRecord {
    #[serde(default)]
    enabled: Option<Value>,
    #[serde(default, rename = "normalizePatterns")]
    normalize_patterns: Option<Value>,
    #[serde(default, rename = "fixPatterns")]
    fix_patterns: Option<Value>,
    #[serde(default, rename = "suppressValidation")]
    suppress_validation: Option<Value>,
    #[serde(default, rename = "killValidation")]
    kill_validation: Option<Value>,
    #[serde(default, rename = "overrideSubmit")]
    override_submit: Option<Value>,
    #[serde(default, rename = "killAggressive")]
    kill_aggressive: Option<Value>,
    #[serde(default, rename = "showPostcodeHints")]
    show_postcode_hints: Option<Value>,
}

/// First usable boolean among `candidates`, else `default`. Values that are
/// present but not booleans are reported and skipped.
fn pick_switch(candidates: &[(&str, &Option<Value>)], default: bool) -> bool {
    for (key, slot) in candidates {
        match slot {
            Some(Value::Bool(value)) => return *value,
            Some(other) => warn!("Ignoring malformed policy key '{}': {}", key, other),
            None => {}
        }
    }
    default
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            enabled: true,
            normalize_patterns: true,
            suppress_validation: false,
            override_submit: false,
            show_postcode_hints: true,
        }
    }
}

/// A pipeline stage's policy switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    NormalizePatterns,
    SuppressValidation,
    OverrideSubmit,
    PostcodeHints,
}

impl Feature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::NormalizePatterns => "normalizePatterns",
            Feature::SuppressValidation => "suppressValidation",
            Feature::OverrideSubmit => "overrideSubmit",
            Feature::PostcodeHints => "showPostcodeHints",
        }
    }
}

/// A partial policy update. `None` fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalize_patterns: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suppress_validation: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_submit: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_postcode_hints: Option<bool>,
}

impl PolicyPatch {
    pub fn enabled(value: bool) -> Self {
        Self { enabled: Some(value), ..Default::default() }
    }

    /// A patch that flips exactly one feature switch.
    pub fn feature(feature: Feature, value: bool) -> Self {
        let mut patch = Self::default();
        match feature {
            Feature::NormalizePatterns => patch.normalize_patterns = Some(value),
            Feature::SuppressValidation => patch.suppress_validation = Some(value),
            Feature::OverrideSubmit => patch.override_submit = Some(value),
            Feature::PostcodeHints => patch.show_postcode_hints = Some(value),
        }
        patch
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl Policy {
    /// Whether a stage gated by `feature` should run. Ignores the master switch.
    pub fn allows(&self, feature: Feature) -> bool {
        match feature {
            Feature::NormalizePatterns => self.normalize_patterns,
            Feature::SuppressValidation => self.suppress_validation,
            Feature::OverrideSubmit => self.override_submit,
            Feature::PostcodeHints => self.show_postcode_hints,
        }
    }

    /// Applies `patch` on top of `self`.
    pub fn merged(self, patch: &PolicyPatch) -> Policy {
        Policy {
            enabled: patch.enabled.unwrap_or(self.enabled),
            normalize_patterns: patch.normalize_patterns.unwrap_or(self.normalize_patterns),
            suppress_validation: patch.suppress_validation.unwrap_or(self.suppress_validation),
            override_submit: patch.override_submit.unwrap_or(self.override_submit),
            show_postcode_hints: patch.show_postcode_hints.unwrap_or(self.show_postcode_hints),
        }
    }

    /// Reads a stored record key by key on top of the defaults.
    ///
    /// The current key name wins over its legacy alias (`fixPatterns`,
    /// `killValidation`, `killAggressive`). A key holding something other than
    /// a boolean is reported and falls back on its own; the other keys are
    /// kept. A missing record, or one that is not an object, yields the
    /// defaults.
    pub fn from_record(record: Option<&Value>) -> Policy {
        let Some(record) = record else {
            debug!("No stored policy record; using defaults.");
            return Policy::default();
        };
        let stored = match serde_json::from_value::<StoredRecord>(record.clone()) {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Stored policy record is malformed ({}); using defaults.", e);
                return Policy::default();
            }
        };
        let defaults = Policy::default();
        Policy {
            enabled: pick_switch(&[("enabled", &stored.enabled)], defaults.enabled),
            normalize_patterns: pick_switch(
                &[
                    ("normalizePatterns", &stored.normalize_patterns),
                    ("fixPatterns", &stored.fix_patterns),
                ],
                defaults.normalize_patterns,
            ),
            suppress_validation: pick_switch(
                &[
                    ("suppressValidation", &stored.suppress_validation),
                    ("killValidation", &stored.kill_validation),
                ],
                defaults.suppress_validation,
            ),
            override_submit: pick_switch(
                &[
                    ("overrideSubmit", &stored.override_submit),
                    ("killAggressive", &stored.kill_aggressive),
                ],
                defaults.override_submit,
            ),
            show_postcode_hints: pick_switch(
                &[("showPostcodeHints", &stored.show_postcode_hints)],
                defaults.show_postcode_hints,
            ),
        }
    }

    /// The record as it is persisted under [`STATE_KEY`].
    pub fn to_record(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A change notification from a policy store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyChange {
    /// Storage area the change happened in.
    pub scope: String,
    /// Top-level storage keys that changed.
    pub changed_keys: Vec<String>,
}

impl PolicyChange {
    pub fn new(scope: &str, keys: &[&str]) -> Self {
        Self {
            scope: scope.to_string(),
            changed_keys: keys.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Whether the change touched the policy record.
    pub fn concerns_policy(&self) -> bool {
        self.scope == SYNC_SCOPE && self.changed_keys.iter().any(|k| k == STATE_KEY)
    }
}

/// The immutable view one application cycle works from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicySnapshot {
    pub policy: Policy,
    /// Postcode table key derived from the page host, if any.
    pub country: Option<String>,
}

impl PolicySnapshot {
    pub fn capture(policy: Policy, host: &str) -> Self {
        Self {
            policy,
            country: country_key(host),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_match_first_install() {
        let p = Policy::from_record(None);
        assert!(p.enabled);
        assert!(p.normalize_patterns);
        assert!(!p.suppress_validation);
        assert!(!p.override_submit);
        assert!(p.show_postcode_hints);
    }

    #[test]
    fn test_legacy_keys_and_unknown_keys() {
        let record = json!({
            "enabled": true,
            "fixPatterns": false,
            "killValidation": true,
            "killAggressive": true,
            "__ping": 1712345678
        });
        let p = Policy::from_record(Some(&record));
        assert!(!p.normalize_patterns);
        assert!(p.suppress_validation);
        assert!(p.override_submit);
        assert!(p.show_postcode_hints);
    }

    #[test]
    fn test_partial_record_keeps_defaults() {
        let p = Policy::from_record(Some(&json!({ "enabled": false })));
        assert_eq!(p, Policy { enabled: false, ..Policy::default() });
    }

    #[test]
    fn test_malformed_key_falls_back_alone() {
        let p = Policy::from_record(Some(&json!({ "enabled": "yes", "overrideSubmit": true })));
        assert_eq!(p, Policy { override_submit: true, ..Policy::default() });
    }

    #[test]
    fn test_non_object_record_falls_back() {
        assert_eq!(Policy::from_record(Some(&json!([true, false]))), Policy::default());
        assert_eq!(Policy::from_record(Some(&json!("on"))), Policy::default());
    }

    #[test]
    fn test_current_keys_win_over_legacy_ones() {
        let record = json!({
            "enabled": false,
            "fixPatterns": true,
            "normalizePatterns": false,
            "killValidation": false,
            "suppressValidation": true,
            "killAggressive": true,
            "overrideSubmit": false
        });
        let p = Policy::from_record(Some(&record));
        assert!(!p.enabled);
        assert!(!p.normalize_patterns);
        assert!(p.suppress_validation);
        assert!(!p.override_submit);
        assert!(p.show_postcode_hints);
    }

    #[test]
    fn test_malformed_current_key_uses_the_legacy_one() {
        let record = json!({
            "normalizePatterns": "yes",
            "fixPatterns": false,
            "overrideSubmit": "on",
            "killAggressive": true
        });
        let p = Policy::from_record(Some(&record));
        assert!(!p.normalize_patterns);
        assert!(p.override_submit);
    }

    #[test]
    fn test_merge_and_record_keys() {
        let merged = Policy::default().merged(&PolicyPatch::feature(Feature::OverrideSubmit, true));
        assert!(merged.override_submit);
        assert!(merged.allows(Feature::OverrideSubmit));
        let record = merged.to_record();
        assert_eq!(record["overrideSubmit"], json!(true));
        assert_eq!(record["showPostcodeHints"], json!(true));
        assert!(record.get("killAggressive").is_none());
    }

    #[test]
    fn test_change_scope_filter() {
        assert!(PolicyChange::new(SYNC_SCOPE, &[STATE_KEY]).concerns_policy());
        assert!(!PolicyChange::new("local", &[STATE_KEY]).concerns_policy());
        assert!(!PolicyChange::new(SYNC_SCOPE, &["other"]).concerns_policy());
    }

    #[test]
    fn test_snapshot_country() {
        let snap = PolicySnapshot::capture(Policy::default(), "www.example.co.uk");
        assert_eq!(snap.country.as_deref(), Some("gb"));
    }
}
