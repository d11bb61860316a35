//! compiler.rs - Compiles and caches the postcode matchers.
//!
//! The postcode table stores its canonical-format matchers as pattern strings.
//! This module turns them into `Regex`es once per process and shares the result.
//!
//! License: MIT OR APACHE 2.0

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use once_cell::sync::OnceCell;
use regex::{Regex, RegexBuilder};

use formtamer_postcode::PostcodeRule;

use crate::errors::FormTamerError;

/// One table entry with its matcher compiled.
#[derive(Debug)]
pub struct CompiledPostcodeRule {
    pub rule: &'static PostcodeRule,
    pub matcher: Regex,
}

impl CompiledPostcodeRule {
    /// Normalizes `raw`; unrecognized input is returned unchanged.
    pub fn normalize(&self, raw: &str) -> String {
        self.rule.apply(raw)
    }

    /// Whether `value` is in the canonical national format.
    pub fn recognizes(&self, value: &str) -> bool {
        self.matcher.is_match(value)
    }
}

/// Compiled matchers keyed by table key. Which keys exist is decided by
/// `formtamer_postcode::lookup`; this only caches the compiled form.
#[derive(Debug)]
pub struct CompiledPostcodeRules {
    by_key: HashMap<&'static str, Arc<CompiledPostcodeRule>>,
}

impl CompiledPostcodeRules {
    /// The compiled form of a rule obtained from the table.
    pub fn get(&self, rule: &PostcodeRule) -> Option<&Arc<CompiledPostcodeRule>> {
        self.by_key.get(rule.key)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<CompiledPostcodeRule>> {
        self.by_key.values()
    }
}

static COMPILED_RULES: OnceCell<Arc<CompiledPostcodeRules>> = OnceCell::new();

/// Compiles every matcher of `rules`. Fails with the first matcher that does not compile.
pub fn compile_rules(rules: &'static [PostcodeRule]) -> Result<CompiledPostcodeRules, FormTamerError> {
    debug!("Compiling {} postcode matchers.", rules.len());
    let mut by_key = HashMap::with_capacity(rules.len());
    let mut errors = Vec::new();

    for rule in rules {
        match RegexBuilder::new(rule.matcher).size_limit(1 << 20).build() {
            Ok(matcher) => {
                by_key.insert(rule.key, Arc::new(CompiledPostcodeRule { rule, matcher }));
            }
            Err(e) => errors.push(FormTamerError::MatcherCompilationError(rule.key.to_string(), e)),
        }
    }

    if let Some(first) = errors.into_iter().next() {
        return Err(first);
    }
    Ok(CompiledPostcodeRules { by_key })
}

/// Returns the process-wide compiled table, compiling it on first use.
pub fn get_or_compile_rules() -> Result<Arc<CompiledPostcodeRules>, FormTamerError> {
    COMPILED_RULES
        .get_or_try_init(|| compile_rules(formtamer_postcode::RULES).map(Arc::new))
        .map(Arc::clone)
}
