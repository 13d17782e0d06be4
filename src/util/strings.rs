//! ASCII case folding helpers.
//!
//! Catalog object names and the `UPPER`/`LOWER` scalar functions only need
//! to consider ASCII case per the original engine's documented behavior;
//! full Unicode case folding is out of scope.

/// Case-insensitive equality for identifiers (catalog name lookup).
pub fn ascii_ieq(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.bytes().zip(b.bytes()).all(|(x, y)| x.to_ascii_lowercase() == y.to_ascii_lowercase())
}

pub fn ascii_upper(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii() { c.to_ascii_uppercase() } else { c })
        .collect()
}

pub fn ascii_lower(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii() { c.to_ascii_lowercase() } else { c })
        .collect()
}
