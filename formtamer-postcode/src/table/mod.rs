// formtamer-postcode/src/table/mod.rs
//! The static postcode rule table.
//!
//! Entries are sorted by key so lookups can binary search. The `matcher` is a
//! regular expression describing the canonical format; it documents and
//! recognizes values but is never used to reject input.

use crate::normalize::*;
use crate::Normalizer;

/// Formatting knowledge for one country.
#[derive(Debug, Clone, Copy)]
pub struct PostcodeRule {
    /// Lowercase country key (ccTLD style, `gb` for the United Kingdom).
    pub key: &'static str,
    pub display_name: &'static str,
    /// Regular expression for the canonical format.
    pub matcher: &'static str,
    pub example: &'static str,
    pub normalize: Normalizer,
}

impl PostcodeRule {
    /// Applies the normalizer. Unrecognized input comes back unchanged.
    pub fn apply(&self, raw: &str) -> alloc::string::String {
        (self.normalize)(raw)
    }
}

/// All known rules, sorted by `key`.
pub static RULES: &[PostcodeRule] = &[
    PostcodeRule { key: "at", display_name: "Austria", matcher: r"^[0-9]{4}$", example: "1010", normalize: normalize_four_digit },
    PostcodeRule { key: "be", display_name: "Belgium", matcher: r"^[0-9]{4}$", example: "1000", normalize: normalize_four_digit },
    PostcodeRule { key: "br", display_name: "Brazil", matcher: r"^[0-9]{5}-[0-9]{3}$", example: "01310-100", normalize: normalize_br },
    PostcodeRule { key: "ca", display_name: "Canada", matcher: r"^[A-Z][0-9][A-Z] [0-9][A-Z][0-9]$", example: "K1A 0B1", normalize: normalize_ca },
    PostcodeRule { key: "ch", display_name: "Switzerland", matcher: r"^[0-9]{4}$", example: "8001", normalize: normalize_four_digit },
    PostcodeRule { key: "cz", display_name: "Czechia", matcher: r"^[0-9]{3} [0-9]{2}$", example: "110 00", normalize: normalize_three_two },
    PostcodeRule { key: "de", display_name: "Germany", matcher: r"^[0-9]{5}$", example: "10115", normalize: normalize_de },
    PostcodeRule { key: "dk", display_name: "Denmark", matcher: r"^[0-9]{4}$", example: "1050", normalize: normalize_four_digit },
    PostcodeRule { key: "es", display_name: "Spain", matcher: r"^[0-9]{5}$", example: "28001", normalize: normalize_es },
    PostcodeRule { key: "fr", display_name: "France", matcher: r"^[0-9]{5}$", example: "75001", normalize: normalize_fr },
    PostcodeRule { key: "gb", display_name: "United Kingdom", matcher: r"^[A-Z][A-Z0-9]{1,3} [0-9][A-Z]{2}$", example: "SW1A 1AA", normalize: normalize_gb },
    PostcodeRule { key: "ie", display_name: "Ireland", matcher: r"^[A-Z][0-9][0-9W] [A-Z0-9]{4}$", example: "D02 X285", normalize: normalize_ie },
    PostcodeRule { key: "it", display_name: "Italy", matcher: r"^[0-9]{5}$", example: "00118", normalize: normalize_it },
    PostcodeRule { key: "jp", display_name: "Japan", matcher: r"^[0-9]{3}-[0-9]{4}$", example: "100-0001", normalize: normalize_jp },
    PostcodeRule { key: "nl", display_name: "Netherlands", matcher: r"^[1-9][0-9]{3} [A-Z]{2}$", example: "1234 AB", normalize: normalize_nl },
    PostcodeRule { key: "no", display_name: "Norway", matcher: r"^[0-9]{4}$", example: "0150", normalize: normalize_four_digit },
    PostcodeRule { key: "pl", display_name: "Poland", matcher: r"^[0-9]{2}-[0-9]{3}$", example: "00-001", normalize: normalize_pl },
    PostcodeRule { key: "pt", display_name: "Portugal", matcher: r"^[0-9]{4}-[0-9]{3}$", example: "1000-001", normalize: normalize_pt },
    PostcodeRule { key: "se", display_name: "Sweden", matcher: r"^[0-9]{3} [0-9]{2}$", example: "111 22", normalize: normalize_three_two },
    PostcodeRule { key: "sk", display_name: "Slovakia", matcher: r"^[0-9]{3} [0-9]{2}$", example: "811 01", normalize: normalize_three_two },
    PostcodeRule { key: "us", display_name: "United States", matcher: r"^[0-9]{5}(-[0-9]{4})?$", example: "94105-1234", normalize: normalize_us },
];

/// Looks up a rule by its lowercase country key.
pub fn lookup(key: &str) -> Option<&'static PostcodeRule> {
    RULES
        .binary_search_by(|rule| rule.key.cmp(key))
        .ok()
        .map(|idx| &RULES[idx])
}
