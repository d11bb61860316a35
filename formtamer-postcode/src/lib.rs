#![no_std]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod country;
pub mod keywords;
pub mod normalize;
pub mod table;

pub use country::country_key;
pub use keywords::PostcodeKeywords;
pub use table::{lookup, PostcodeRule, RULES};

/// A pure rewrite from a raw field value to its canonical national format.
pub type Normalizer = fn(&str) -> alloc::string::String;
