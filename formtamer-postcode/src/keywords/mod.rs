// formtamer-postcode/src/keywords/mod.rs
use daachorse::DoubleArrayAhoCorasick;
extern crate alloc;
use alloc::string::String;
use core::fmt;

/// Postal-code terminology across the languages of the rule table.
const KEYWORDS: &[&str] = &[
    "postcode", "post code", "post_code", "post-code", "postal", "zip", "plz",
    "postleitzahl", "code postal", "codepostal", "code_postal", "codigo postal",
    "código postal", "codigopostal", "codice postale", "kod pocztowy", "kodpocztowy",
    "postnummer", "postnr", "postinumero", "eircode", "cep", "cp", "cap", "psc", "psč",
];

/// Keywords short enough to appear inside unrelated words; they only count
/// when surrounded by non-alphanumeric bytes.
const BOUNDARY_ONLY: &[&str] = &["cep", "cp", "cap", "psc"];

/// Detects postal-code fields from their descriptive attributes.
pub struct PostcodeKeywords {
    automaton: DoubleArrayAhoCorasick<usize>,
}

impl fmt::Debug for PostcodeKeywords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostcodeKeywords")
         .field("automaton", &"<DoubleArrayAhoCorasick>")
         .finish()
    }
}

impl Default for PostcodeKeywords {
    fn default() -> Self {
        Self::new()
    }
}

impl PostcodeKeywords {
    pub fn new() -> Self {
        let automaton = DoubleArrayAhoCorasick::new(KEYWORDS.iter().copied())
            .expect("Failed to build Aho-Corasick automaton for postcode keywords");
        Self { automaton }
    }

    /// Returns true when `text` mentions postal-code terminology.
    pub fn matches(&self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        let lowered: String = text.to_lowercase();
        let bytes = lowered.as_bytes();

        for m in self.automaton.find_overlapping_iter(&lowered) {
            let keyword = KEYWORDS[m.value()];
            if !BOUNDARY_ONLY.contains(&keyword) {
                return true;
            }
            let prefix_ok = m.start() == 0 || !bytes[m.start() - 1].is_ascii_alphanumeric();
            let suffix_ok = m.end() == bytes.len() || !bytes[m.end()].is_ascii_alphanumeric();
            if prefix_ok && suffix_ok {
                return true;
            }
        }
        false
    }

    /// Returns true when any of the given attribute values matches.
    pub fn matches_any<'a, I>(&self, values: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        values.into_iter().any(|v| self.matches(v))
    }
}
