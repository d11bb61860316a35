//! Rewrites regex-literal pattern attributes into the bare form browsers expect.
//!
//! Pages sometimes copy a source-language literal such as `/^[0-9]{4}$/` into
//! `pattern`. Browsers treat the slashes as literal characters, so the field can
//! never validate. Stripping the delimiters fixes it; an already bare value is
//! left alone, which makes the rewrite idempotent.

use log::debug;

use crate::engine::{ScanContext, Stage, StageReport};
use crate::host::{select, Document, NodeId};
use crate::policy::Feature;

/// An attribute together with the pure rewrite applied to its value.
#[derive(Debug, Clone, Copy)]
pub struct FieldAttributeRule {
    pub attribute: &'static str,
    pub rewrite: fn(&str) -> String,
}

/// `pattern` and its `data-pattern` shadow used by client-side validators.
pub const PATTERN_RULES: &[FieldAttributeRule] = &[
    FieldAttributeRule { attribute: "pattern", rewrite: strip_regex_delimiters },
    FieldAttributeRule { attribute: "data-pattern", rewrite: strip_regex_delimiters },
];

const PATTERN_FIELD_TAGS: &[&str] = &["input", "textarea"];

/// Removes a surrounding `/.../` pair. Anything else comes back unchanged.
pub fn strip_regex_delimiters(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('/') && value.ends_with('/') {
        value[1..value.len() - 1].to_string()
    } else {
        value.to_string()
    }
}

/// Applies [`PATTERN_RULES`] to every input and textarea under `root`.
/// Returns the number of attributes rewritten.
pub fn normalize_patterns(doc: &dyn Document, root: NodeId) -> usize {
    let mut rewritten = 0;
    for field in select(doc, root, PATTERN_FIELD_TAGS) {
        for rule in PATTERN_RULES {
            let Some(current) = doc.get_attribute(field, rule.attribute) else { continue };
            if current.is_empty() {
                continue;
            }
            let fixed = (rule.rewrite)(&current);
            if fixed != current {
                debug!("Rewrote {} on {}: {:?} -> {:?}", rule.attribute, field, current, fixed);
                doc.set_attribute(field, rule.attribute, &fixed);
                rewritten += 1;
            }
        }
    }
    rewritten
}

#[derive(Debug, Default)]
pub struct PatternNormalizer;

impl Stage for PatternNormalizer {
    fn name(&self) -> &'static str {
        "pattern_normalizer"
    }

    fn feature(&self) -> Feature {
        Feature::NormalizePatterns
    }

    fn apply(&self, ctx: &ScanContext<'_>) -> StageReport {
        StageReport {
            stage: self.name(),
            touched: normalize_patterns(ctx.doc.as_ref(), ctx.root),
        }
    }
}
