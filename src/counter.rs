//! Bounded positional counter over a fixed alphabet.
//!
//! One string-increment routine shared by everything that orders rows with
//! sortable codes: thread reply codes, nested comment codes and admin menu
//! ordering all count in base-36, digits before lowercase letters, so that
//! plain string comparison yields insertion order.

use thiserror::Error;

pub const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// The last slot at one level is taken; there is no 37th sibling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("positional counter exhausted its alphabet")]
pub struct Overflow;

impl From<Overflow> for crate::error::Error {
    fn from(_: Overflow) -> Self {
        crate::error::Error::CapacityExceeded
    }
}

/// First code at a new level.
pub fn first() -> char {
    ALPHABET[0] as char
}

/// The character following `c` in the alphabet, if any.
pub fn next_char(c: char) -> Result<char, Overflow> {
    let pos = ALPHABET.iter().position(|&a| a as char == c).ok_or(Overflow)?;
    ALPHABET
        .get(pos + 1)
        .map(|&a| a as char)
        .ok_or(Overflow)
}

/// Increments the final character of `code` in place, keeping its length.
/// Errors when the final character is already the last of the alphabet.
pub fn increment(code: &str) -> Result<String, Overflow> {
    let last = code.chars().last().ok_or(Overflow)?;
    let bumped = next_char(last)?;
    let mut out = code.to_owned();
    out.pop();
    out.push(bumped);
    Ok(out)
}

/// Produces the code for a new child under `parent`, given the greatest
/// sibling code already present at that level (if any). The result is one
/// character longer than `parent` and sorts after every existing sibling.
pub fn child_code(parent: &str, last_sibling: Option<&str>) -> Result<String, Overflow> {
    match last_sibling {
        None => {
            let mut out = parent.to_owned();
            out.push(first());
            Ok(out)
        }
        Some(sibling) => {
            debug_assert_eq!(sibling.len(), parent.len() + 1);
            increment(sibling)
        }
    }
}
