// formtamer-postcode/src/normalize/mod.rs
//! Per-country normalizers.
//!
//! Every normalizer accepts the raw shape a user tends to type (any letter case,
//! optional spaces or hyphens) and emits the canonical national format. Input
//! that does not have a recognizable raw shape is returned unchanged; nothing is
//! padded, truncated or otherwise forced into a valid-looking value.

extern crate alloc;
use alloc::format;
use alloc::string::{String, ToString};

/// Strips spaces and hyphens and uppercases the remainder.
/// Returns `None` for non-ASCII input so callers can slice by byte offset.
fn compact(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if !trimmed.is_ascii() {
        return None;
    }
    Some(
        trimmed
            .chars()
            .filter(|c| *c != ' ' && *c != '-')
            .map(|c| c.to_ascii_uppercase())
            .collect(),
    )
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn all_letters(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphabetic())
}

/// Shared shape for the purely numeric formats: `len` digits, split at `split`
/// with `sep` (or kept whole when `split` is `None`).
fn digits_with_separator(raw: &str, len: usize, split: Option<(usize, char)>) -> String {
    let Some(c) = compact(raw) else { return raw.to_string() };
    if c.len() != len || !all_digits(&c) {
        return raw.to_string();
    }
    match split {
        Some((at, sep)) => format!("{}{}{}", &c[..at], sep, &c[at..]),
        None => c,
    }
}

/// Netherlands: `1234AB` -> `1234 AB`.
pub fn normalize_nl(raw: &str) -> String {
    let Some(c) = compact(raw) else { return raw.to_string() };
    if c.len() == 6 && all_digits(&c[..4]) && all_letters(&c[4..]) && !c.starts_with('0') {
        format!("{} {}", &c[..4], &c[4..])
    } else {
        raw.to_string()
    }
}

/// United States: ZIP or ZIP+4, `941051234` -> `94105-1234`.
pub fn normalize_us(raw: &str) -> String {
    let Some(c) = compact(raw) else { return raw.to_string() };
    if !all_digits(&c) {
        return raw.to_string();
    }
    match c.len() {
        5 => c,
        9 => format!("{}-{}", &c[..5], &c[5..]),
        _ => raw.to_string(),
    }
}

/// Poland: `00001` -> `00-001`.
pub fn normalize_pl(raw: &str) -> String {
    digits_with_separator(raw, 5, Some((2, '-')))
}

/// United Kingdom: `sw1a1aa` -> `SW1A 1AA`.
///
/// The inward code is always digit-letter-letter; the outward code is two to
/// four characters and starts with a letter.
pub fn normalize_gb(raw: &str) -> String {
    let Some(c) = compact(raw) else { return raw.to_string() };
    if !(5..=7).contains(&c.len()) || !c.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return raw.to_string();
    }
    let (outward, inward) = c.split_at(c.len() - 3);
    let inward_ok = inward.as_bytes()[0].is_ascii_digit() && all_letters(&inward[1..]);
    let outward_ok = outward.as_bytes()[0].is_ascii_alphabetic()
        && outward.bytes().any(|b| b.is_ascii_digit());
    if inward_ok && outward_ok {
        format!("{} {}", outward, inward)
    } else {
        raw.to_string()
    }
}

/// Germany: five digits.
pub fn normalize_de(raw: &str) -> String {
    digits_with_separator(raw, 5, None)
}

/// France: five digits.
pub fn normalize_fr(raw: &str) -> String {
    digits_with_separator(raw, 5, None)
}

/// Spain: five digits.
pub fn normalize_es(raw: &str) -> String {
    digits_with_separator(raw, 5, None)
}

/// Italy: five digits (CAP).
pub fn normalize_it(raw: &str) -> String {
    digits_with_separator(raw, 5, None)
}

/// Four-digit formats (AT, BE, CH, DK, NO).
pub fn normalize_four_digit(raw: &str) -> String {
    digits_with_separator(raw, 4, None)
}

/// Sweden, Czechia and Slovakia: `12345` -> `123 45`.
pub fn normalize_three_two(raw: &str) -> String {
    digits_with_separator(raw, 5, Some((3, ' ')))
}

/// Portugal: `1234567` -> `1234-567`.
pub fn normalize_pt(raw: &str) -> String {
    digits_with_separator(raw, 7, Some((4, '-')))
}

/// Brazil (CEP): `12345678` -> `12345-678`.
pub fn normalize_br(raw: &str) -> String {
    digits_with_separator(raw, 8, Some((5, '-')))
}

/// Japan: `1234567` -> `123-4567`.
pub fn normalize_jp(raw: &str) -> String {
    digits_with_separator(raw, 7, Some((3, '-')))
}

/// Canada: `k1a0b1` -> `K1A 0B1`.
pub fn normalize_ca(raw: &str) -> String {
    let Some(c) = compact(raw) else { return raw.to_string() };
    let shape_ok = c.len() == 6
        && c.bytes().enumerate().all(|(i, b)| {
            if i % 2 == 0 {
                b.is_ascii_alphabetic()
            } else {
                b.is_ascii_digit()
            }
        });
    if shape_ok {
        format!("{} {}", &c[..3], &c[3..])
    } else {
        raw.to_string()
    }
}

/// Ireland (Eircode): `d02x285` -> `D02 X285`.
pub fn normalize_ie(raw: &str) -> String {
    let Some(c) = compact(raw) else { return raw.to_string() };
    if c.len() != 7 || !c.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return raw.to_string();
    }
    let b = c.as_bytes();
    let routing_ok = b[0].is_ascii_alphabetic()
        && b[1].is_ascii_digit()
        && (b[2].is_ascii_digit() || b[2] == b'W');
    if routing_ok {
        format!("{} {}", &c[..3], &c[3..])
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nl_inserts_space_and_uppercases() {
        assert_eq!(normalize_nl("1234ab"), "1234 AB");
        assert_eq!(normalize_nl(" 1234 ab "), "1234 AB");
        assert_eq!(normalize_nl("0234ab"), "0234ab");
        assert_eq!(normalize_nl("12345"), "12345");
    }

    #[test]
    fn test_us_zip_plus_four() {
        assert_eq!(normalize_us("941051234"), "94105-1234");
        assert_eq!(normalize_us("94105"), "94105");
        assert_eq!(normalize_us("94105 1234"), "94105-1234");
        assert_eq!(normalize_us("9410"), "9410");
    }

    #[test]
    fn test_pl_hyphenates() {
        assert_eq!(normalize_pl("00001"), "00-001");
        assert_eq!(normalize_pl("00-001"), "00-001");
        assert_eq!(normalize_pl("0001"), "0001");
    }

    #[test]
    fn test_gb_splits_inward_code() {
        let out = normalize_gb("sw1a1aa");
        assert_eq!(out, "SW1A 1AA");
        assert_eq!(out.as_bytes()[out.len() - 4], b' ');
        assert_eq!(normalize_gb("m11ae"), "M1 1AE");
        assert_eq!(normalize_gb("hello"), "hello");
    }

    #[test]
    fn test_ca_and_ie_shapes() {
        assert_eq!(normalize_ca("k1a0b1"), "K1A 0B1");
        assert_eq!(normalize_ca("k1a0b"), "k1a0b");
        assert_eq!(normalize_ie("d02x285"), "D02 X285");
        assert_eq!(normalize_ie("d6wfa12"), "D6W FA12");
    }

    #[test]
    fn test_non_ascii_is_left_alone() {
        assert_eq!(normalize_de("12ä45"), "12ä45");
        assert_eq!(normalize_gb("ß1a1aa"), "ß1a1aa");
    }

    #[test]
    fn test_canonical_output_is_stable() {
        let samples = ["1234ab", "941051234", "00001", "sw1a1aa", "12345", "1234567"];
        let normalizers: [fn(&str) -> String; 6] = [
            normalize_nl,
            normalize_us,
            normalize_pl,
            normalize_gb,
            normalize_three_two,
            normalize_pt,
        ];
        for raw in samples {
            for f in normalizers {
                let once = f(raw);
                assert_eq!(f(&once), once, "normalizer not stable on {}", raw);
            }
        }
    }
}
