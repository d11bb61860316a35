// formtamer-postcode/src/country/mod.rs
extern crate alloc;
use alloc::string::String;

/// Derives the postcode table key from a page host name.
///
/// The key is the last label of the host, lowercased, with `uk` mapped to `gb`.
/// A trailing root dot is ignored. Returns `None` for an empty host.
pub fn country_key(host: &str) -> Option<String> {
    let host = host.trim().trim_end_matches('.');
    let label = host.rsplit('.').next()?;
    if label.is_empty() {
        return None;
    }
    let key = label.to_ascii_lowercase();
    if key == "uk" {
        return Some(String::from("gb"));
    }
    Some(key)
}
