//! Random display names for anonymous participants
//!
//! Format: adjective + noun + two-digit suffix, e.g. "SwiftFalcon42".

use uuid::Uuid;

const ADJECTIVES: &[&str] = &[
    "Swift", "Bright", "Calm", "Deft", "Eager", "Fair", "Gentle", "Happy", "Keen", "Lively",
    "Merry", "Noble", "Polite", "Quick", "Serene", "Tidy", "Vivid", "Warm", "Zesty", "Bold",
];

const NOUNS: &[&str] = &[
    "Falcon", "Otter", "Panda", "Robin", "Tiger", "Whale", "Zebra", "Koala", "Eagle", "Dolphin",
    "Fox", "Owl", "Wolf", "Bear", "Hawk", "Seal", "Crane", "Deer", "Lynx", "Swan",
];

pub fn generate_display_name() -> String {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let hasher = RandomState::new();
    let mut h = hasher.build_hasher();
    h.write_u128(Uuid::new_v4().as_u128());
    let hash = h.finish();

    let adj_idx = (hash as usize) % ADJECTIVES.len();
    let noun_idx = ((hash >> 24) as usize) % NOUNS.len();
    let suffix = (hash >> 48) % 90 + 10;

    format!("{}{}{}", ADJECTIVES[adj_idx], NOUNS[noun_idx], suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_format() {
        for _ in 0..20 {
            let name = generate_display_name();

            let adjective = ADJECTIVES
                .iter()
                .find(|a| name.starts_with(*a))
                .unwrap_or_else(|| panic!("no known adjective in '{}'", name));
            let rest = &name[adjective.len()..];

            let noun = NOUNS
                .iter()
                .find(|n| rest.starts_with(*n))
                .unwrap_or_else(|| panic!("no known noun in '{}'", name));
            let suffix = &rest[noun.len()..];

            assert_eq!(suffix.len(), 2, "two-digit suffix in '{}'", name);
            let value: u64 = suffix.parse().expect("numeric suffix");
            assert!((10..100).contains(&value));
        }
    }
}
