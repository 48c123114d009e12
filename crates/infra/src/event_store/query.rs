//! Name enumeration helpers shared by the event store and projection manager.
//!
//! Names are listed in natural order and paginated with `limit`/`offset`.

use core::cmp::Ordering;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::event_store::EventStoreError;

/// Pagination parameters for name queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of names to return (at least 1).
    pub limit: usize,
    /// Number of matching names to skip.
    pub offset: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 20,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: usize, offset: usize) -> Result<Self, EventStoreError> {
        if limit < 1 {
            return Err(EventStoreError::InvalidArgument(format!(
                "invalid limit {limit}: must be greater than 0"
            )));
        }
        Ok(Self { limit, offset })
    }

    /// Skip `offset` items, then take at most `limit`.
    pub fn apply<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        items.into_iter().skip(self.offset).take(self.limit).collect()
    }
}

/// Compile a user-supplied name pattern.
pub fn compile_pattern(pattern: &str) -> Result<Regex, EventStoreError> {
    if pattern.is_empty() {
        return Err(EventStoreError::InvalidArgument(
            "empty regex pattern given".to_string(),
        ));
    }
    Regex::new(pattern)
        .map_err(|e| EventStoreError::InvalidArgument(format!("invalid regex pattern given: {e}")))
}

/// Natural ordering: runs of ASCII digits compare by numeric value, all other
/// runs compare lexically. `stream-2` sorts before `stream-10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.as_bytes();
    let mut right = b.as_bytes();

    loop {
        match (left.first(), right.first()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let (ld, lrest) = split_digits(left);
                let (rd, rrest) = split_digits(right);
                let ordering = compare_digit_runs(ld, rd);
                if ordering != Ordering::Equal {
                    return ordering;
                }
                left = lrest;
                right = rrest;
            }
            (Some(_), Some(_)) => {
                let (lt, lrest) = split_text(left);
                let (rt, rrest) = split_text(right);
                let ordering = lt.cmp(rt);
                if ordering != Ordering::Equal {
                    return ordering;
                }
                left = lrest;
                right = rrest;
            }
        }
    }
}

fn split_digits(s: &[u8]) -> (&[u8], &[u8]) {
    let end = s.iter().position(|b| !b.is_ascii_digit()).unwrap_or(s.len());
    s.split_at(end)
}

fn split_text(s: &[u8]) -> (&[u8], &[u8]) {
    let end = s.iter().position(|b| b.is_ascii_digit()).unwrap_or(s.len());
    s.split_at(end)
}

fn compare_digit_runs(a: &[u8], b: &[u8]) -> Ordering {
    let a = trim_leading_zeros(a);
    let b = trim_leading_zeros(b);
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn trim_leading_zeros(s: &[u8]) -> &[u8] {
    let start = s.iter().position(|b| *b != b'0').unwrap_or(s.len());
    &s[start..]
}

/// Sort names in place in natural order.
pub fn sort_natural<T: AsRef<str>>(names: &mut [T]) {
    names.sort_by(|a, b| natural_cmp(a.as_ref(), b.as_ref()));
}
