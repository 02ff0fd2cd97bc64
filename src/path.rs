//! Parameter path parsing and the projection rules used to scope an
//! overlay of parameter overrides down through nested containers.
//!
//! A path addresses a field by dotted struct access and/or bracketed
//! list indices, e.g. `liststruct[1].first` or `outer[1][0]`.

use std::collections::HashMap;
use std::fmt;

use snafu::Snafu;

/// A single override value supplied by the caller, either for an
/// `encode` call (a literal to write) or a `validate` call (a literal
/// or a regular expression to match against).
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(u64),
    Str(String),
}

impl ParamValue {
    pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
        match self {
            ParamValue::Int(v) => std::borrow::Cow::Owned(v.to_string()),
            ParamValue::Str(s) => std::borrow::Cow::Borrowed(s),
        }
    }
}

impl From<u64> for ParamValue {
    fn from(v: u64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Str(v)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Str(s) => write!(f, "{s}"),
        }
    }
}

/// A flat parameter map, as supplied by a caller of `encode`/`validate`.
///
/// Keys are paths such as `"field_1"`, `"pair.first"` or
/// `"liststruct[1].first"`.
pub type ParamMap = HashMap<String, ParamValue>;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum PathError {
    #[snafu(display("unknown parameter path `{}`", path))]
    Unknown { path: String },
}

/// Strip a struct's own name from the front of every key in `params`,
/// keeping only entries whose leading segment is exactly `name`.
///
/// `pair.foo` under container `pair` becomes `foo`; `pairnotyourname.ploo`
/// is dropped, since the match is on full segment identity, not prefix.
pub fn struct_sub_tree(params: &ParamMap, name: &str) -> ParamMap {
    let prefix = format!("{name}.");
    params
        .iter()
        .filter_map(|(k, v)| k.strip_prefix(&prefix).map(|rest| (rest.to_string(), v.clone())))
        .collect()
}

/// Strip a list's own name and its enclosing brackets from the front of
/// every key in `params`.
///
/// `liststruct[1].first` under container `liststruct` becomes
/// `1.first`; `liststruct[4][0]` becomes `4[0]` (only the bracket pair
/// immediately following the name is consumed).
pub fn list_sub_tree(params: &ParamMap, name: &str) -> ParamMap {
    let prefix = format!("{name}[");
    params
        .iter()
        .filter_map(|(k, v)| {
            let rest = k.strip_prefix(&prefix)?;
            let close = rest.find(']')?;
            let mut stripped = String::with_capacity(rest.len() - 1);
            stripped.push_str(&rest[..close]);
            stripped.push_str(&rest[close + 1..]);
            Some((stripped, v.clone()))
        })
        .collect()
}

/// Split a list-local key such as `"1.first"` or `"4[0]"` or `"0"` into
/// its leading index and the remaining sub-path (kept with its leading
/// `.` or `[` delimiter, e.g. `".first"`, `"[0]"`, or `""`).
pub fn split_index(key: &str) -> Option<(usize, &str)> {
    let digits_len = key.find(|c: char| !c.is_ascii_digit()).unwrap_or(key.len());
    if digits_len == 0 {
        return None;
    }
    let index = key[..digits_len].parse().ok()?;
    Some((index, &key[digits_len..]))
}

/// Build the per-index parameter map handed to a list's shared element
/// template: groups `local`'s entries by leading index, then re-keys
/// each group so the element can apply its own `struct_sub_tree` /
/// `list_sub_tree` (or, for an anonymous primitive, a direct lookup by
/// the empty key) exactly as if it had received the map directly.
pub fn element_params_by_index(local: &ParamMap, element_name: &str, size: usize) -> Vec<ParamMap> {
    let mut per_index: Vec<ParamMap> = (0..size).map(|_| ParamMap::new()).collect();
    for (key, value) in local {
        if let Some((index, remainder)) = split_index(key) {
            if index < size {
                let element_key = format!("{element_name}{remainder}");
                per_index[index].insert(element_key, value.clone());
            }
        }
    }
    per_index
}
