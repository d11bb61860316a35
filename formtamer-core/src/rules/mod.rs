//! The postcode rule engine.
//!
//! Couples the static country table with compiled matchers and the keyword
//! detector, and answers the two questions the hint stage asks: which rule
//! applies to this page, and is this field a postal-code field.

use std::sync::Arc;

use formtamer_postcode::PostcodeKeywords;

use crate::errors::FormTamerError;
use crate::host::{Document, NodeId};

pub mod compiler;

pub use compiler::{get_or_compile_rules, CompiledPostcodeRule, CompiledPostcodeRules};

/// Input types that carry free text.
pub const TEXT_INPUT_TYPES: &[&str] = &["text", "search", "tel"];

/// Attributes whose values describe what a field is for.
pub const DESCRIPTIVE_ATTRIBUTES: &[&str] = &["name", "id", "placeholder", "aria-label", "autocomplete"];

#[derive(Debug)]
pub struct PostcodeRuleEngine {
    rules: Arc<CompiledPostcodeRules>,
    keywords: PostcodeKeywords,
}

impl PostcodeRuleEngine {
    pub fn new() -> Result<Self, FormTamerError> {
        Ok(Self {
            rules: get_or_compile_rules()?,
            keywords: PostcodeKeywords::new(),
        })
    }

    /// The rule for a country key as derived by `formtamer_postcode::country_key`.
    pub fn rule(&self, country: &str) -> Option<Arc<CompiledPostcodeRule>> {
        let rule = formtamer_postcode::lookup(country)?;
        self.rules.get(rule).cloned()
    }

    /// Whether `node` is a text-like input whose attributes mention postal codes.
    pub fn is_postcode_field(&self, doc: &dyn Document, node: NodeId) -> bool {
        if doc.tag_name(node).as_deref() != Some("input") {
            return false;
        }
        let text_like = match doc.get_attribute(node, "type") {
            None => true,
            Some(t) => {
                let t = t.trim().to_ascii_lowercase();
                t.is_empty() || TEXT_INPUT_TYPES.contains(&t.as_str())
            }
        };
        if !text_like {
            return false;
        }
        let values: Vec<String> = DESCRIPTIVE_ATTRIBUTES
            .iter()
            .filter_map(|attr| doc.get_attribute(node, attr))
            .collect();
        self.keywords.matches_any(values.iter().map(String::as_str))
    }
}
