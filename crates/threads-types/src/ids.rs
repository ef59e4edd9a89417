//! Typed identifiers for generations and branches.
//!
//! Both wrap a UUIDv7, so ids sort by mint time and a deleted generation's id
//! is never reissued. `Display` is the hyphenated UUID (logs, SQLite);
//! `to_hex()` is what users type prefixes of.
//!
//! The leading hex digits of a UUIDv7 are its millisecond timestamp, so ids
//! minted together share long prefixes. `short()` therefore shows the
//! trailing random digits: good for telling siblings apart in logs, useless
//! as a lookup prefix.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A generation identifier.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationId(uuid::Uuid);

/// A branch identifier.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchId(uuid::Uuid);

macro_rules! impl_typed_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Mint a fresh id.
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            /// Last 8 hex digits.
            pub fn short(&self) -> String {
                let hex = self.to_hex();
                hex[hex.len() - 8..].to_string()
            }

            /// 32 lowercase hex digits, no hyphens.
            pub fn to_hex(&self) -> String {
                self.0.simple().to_string()
            }

            /// Accepts both the hyphenated and the bare hex form.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                s.parse::<uuid::Uuid>().map(Self)
            }

            /// Case-insensitive hex prefix test; hyphens in `prefix` are ignored.
            pub fn matches_hex_prefix(&self, prefix: &str) -> bool {
                let wanted: String = prefix
                    .chars()
                    .filter(|c| *c != '-')
                    .map(|c| c.to_ascii_lowercase())
                    .collect();
                self.to_hex().starts_with(&wanted)
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0.hyphenated(), f)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple($name).field(&format_args!("{}", self.short())).finish()
            }
        }

        impl PrefixResolvable for $T {
            fn matches_hex_prefix(&self, prefix: &str) -> bool {
                $T::matches_hex_prefix(self, prefix)
            }

            fn to_hex(&self) -> String {
                $T::to_hex(self)
            }
        }
    };
}

impl_typed_id!(GenerationId, "GenerationId");
impl_typed_id!(BranchId, "BranchId");

/// Ids a human can name by typing the start of their hex form.
pub trait PrefixResolvable: Copy {
    fn matches_hex_prefix(&self, prefix: &str) -> bool;
    fn to_hex(&self) -> String;
}

#[derive(Debug, thiserror::Error)]
pub enum PrefixError {
    #[error("nothing matches '{0}'")]
    NoMatch(String),
    #[error("'{query}' is ambiguous: {candidates:?}")]
    Ambiguous {
        query: String,
        candidates: Vec<String>,
    },
}

/// Find the single entry `query` names.
///
/// Labels win over hex: an exact label, then a unique label prefix, then a
/// unique hex prefix. Several label matches are ambiguous even when the hex
/// stage would have found exactly one.
pub fn resolve_prefix<'a, T: PrefixResolvable>(
    entries: impl Iterator<Item = (T, Option<&'a str>)>,
    query: &str,
) -> Result<T, PrefixError> {
    let entries: Vec<(T, Option<&str>)> = entries.collect();
    let ambiguous = |candidates: Vec<String>| PrefixError::Ambiguous {
        query: query.to_string(),
        candidates,
    };

    if let Some(&(id, _)) = entries.iter().find(|(_, label)| *label == Some(query)) {
        return Ok(id);
    }

    let by_label: Vec<(T, &str)> = entries
        .iter()
        .filter_map(|&(id, label)| Some((id, label?)))
        .filter(|(_, label)| label.starts_with(query))
        .collect();
    match by_label.as_slice() {
        [(id, _)] => return Ok(*id),
        [] => {}
        many => return Err(ambiguous(many.iter().map(|(_, l)| l.to_string()).collect())),
    }

    let by_hex: Vec<T> = entries
        .iter()
        .map(|&(id, _)| id)
        .filter(|id| id.matches_hex_prefix(query))
        .collect();
    match by_hex.as_slice() {
        [id] => Ok(*id),
        [] => Err(PrefixError::NoMatch(query.to_string())),
        many => Err(ambiguous(many.iter().map(|id| id.to_hex()).collect())),
    }
}
