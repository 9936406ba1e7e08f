//! The tagged value stored at a key (§3: `Entity`).
//!
//! A sum type with one variant per supported kind — no runtime type
//! switching, no nulls. `TYPE` and `WRONGTYPE` checks become variant
//! discrimination (§9, "Type-tagged values").

use crate::error::DbError;
use crate::zset::SortedSet;
use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Clone, Debug)]
pub enum Entity {
    String(Bytes),
    List(VecDeque<Bytes>),
    Hash(HashMap<Bytes, Bytes>),
    Set(HashSet<Bytes>),
    ZSet(SortedSet),
}

impl Entity {
    /// The name TYPE reports for this variant.
    pub fn type_name(&self) -> &'static str {
        match self {
            Entity::String(_) => "string",
            Entity::List(_) => "list",
            Entity::Hash(_) => "hash",
            Entity::Set(_) => "set",
            Entity::ZSet(_) => "zset",
        }
    }

    pub fn as_string(&self) -> Result<&Bytes, DbError> {
        match self {
            Entity::String(s) => Ok(s),
            _ => Err(DbError::WrongType),
        }
    }

    pub fn as_string_mut(&mut self) -> Result<&mut Bytes, DbError> {
        match self {
            Entity::String(s) => Ok(s),
            _ => Err(DbError::WrongType),
        }
    }

    pub fn as_list(&self) -> Result<&VecDeque<Bytes>, DbError> {
        match self {
            Entity::List(l) => Ok(l),
            _ => Err(DbError::WrongType),
        }
    }

    pub fn as_list_mut(&mut self) -> Result<&mut VecDeque<Bytes>, DbError> {
        match self {
            Entity::List(l) => Ok(l),
            _ => Err(DbError::WrongType),
        }
    }

    pub fn as_hash(&self) -> Result<&HashMap<Bytes, Bytes>, DbError> {
        match self {
            Entity::Hash(h) => Ok(h),
            _ => Err(DbError::WrongType),
        }
    }

    pub fn as_hash_mut(&mut self) -> Result<&mut HashMap<Bytes, Bytes>, DbError> {
        match self {
            Entity::Hash(h) => Ok(h),
            _ => Err(DbError::WrongType),
        }
    }

    pub fn as_set(&self) -> Result<&HashSet<Bytes>, DbError> {
        match self {
            Entity::Set(s) => Ok(s),
            _ => Err(DbError::WrongType),
        }
    }

    pub fn as_set_mut(&mut self) -> Result<&mut HashSet<Bytes>, DbError> {
        match self {
            Entity::Set(s) => Ok(s),
            _ => Err(DbError::WrongType),
        }
    }

    pub fn as_zset(&self) -> Result<&SortedSet, DbError> {
        match self {
            Entity::ZSet(z) => Ok(z),
            _ => Err(DbError::WrongType),
        }
    }

    pub fn as_zset_mut(&mut self) -> Result<&mut SortedSet, DbError> {
        match self {
            Entity::ZSet(z) => Ok(z),
            _ => Err(DbError::WrongType),
        }
    }
}

/// Clamps a possibly negative list index (counted from the tail) to a
/// valid `0..len` index, or `None` if out of range — LINDEX/LSET semantics.
pub fn clamp_list_index(len: usize, idx: i64) -> Option<usize> {
    let len = len as i64;
    let resolved = if idx < 0 { len + idx } else { idx };
    if resolved < 0 || resolved >= len {
        None
    } else {
        Some(resolved as usize)
    }
}

/// Resolves an LRANGE-style `[start, stop]` pair (inclusive, negative from
/// tail) into a valid, possibly-empty `start..=stop` usize range.
pub fn clamp_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let len_i = len as i64;
    let norm = |i: i64| -> i64 { if i < 0 { len_i + i } else { i } };

    let start_raw = norm(start);
    let stop_raw = norm(stop);
    // start past the end, or stop still negative after normalizing against
    // the tail, both mean the requested range misses the list entirely —
    // must be caught before clamping, or clamping silently rescues them
    // into a bogus single-element range.
    if start_raw >= len_i || stop_raw < 0 {
        return None;
    }

    let start = start_raw.max(0);
    let stop = stop_raw.min(len_i - 1);
    if stop < start {
        None
    } else {
        Some((start as usize, stop as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_name_matches_variant() {
        assert_eq!(Entity::String(Bytes::new()).type_name(), "string");
        assert_eq!(Entity::List(VecDeque::new()).type_name(), "list");
        assert_eq!(Entity::Set(HashSet::new()).type_name(), "set");
    }

    #[test]
    fn wrong_type_access_errors() {
        let e = Entity::String(Bytes::from_static(b"x"));
        assert_eq!(e.as_list().unwrap_err(), DbError::WrongType);
    }

    #[test]
    fn clamp_list_index_handles_negative() {
        assert_eq!(clamp_list_index(5, -1), Some(4));
        assert_eq!(clamp_list_index(5, 0), Some(0));
        assert_eq!(clamp_list_index(5, 5), None);
        assert_eq!(clamp_list_index(5, -6), None);
    }

    #[test]
    fn clamp_range_inclusive_both_ends() {
        assert_eq!(clamp_range(5, 0, -1), Some((0, 4)));
        assert_eq!(clamp_range(5, -2, -1), Some((3, 4)));
        assert_eq!(clamp_range(5, 3, 1), None);
        assert_eq!(clamp_range(0, 0, -1), None);
    }
}
