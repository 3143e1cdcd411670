//! Source records to destination rows.
//!
//! Both sync jobs run downloaded records through the same sequence:
//! normalize the cursor timestamp, apply the fetch window, drop invalid
//! records, and collapse repeated keys so the last occurrence wins.

pub mod calls;
pub mod calltype;
pub mod filter;
pub mod raw;
pub mod timestamp;
pub mod value;

use std::collections::HashMap;
use std::hash::Hash;

use serde::Serialize;

pub use calls::CallTransform;
pub use calltype::CallTypeRules;
pub use filter::BusinessFilters;
pub use raw::{RawBatch, RawTransform};
pub use timestamp::TimestampNormalizer;

/// Per-run record accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransformStats {
    pub input: usize,
    pub bad_timestamp: usize,
    pub outside_window: usize,
    pub filtered: usize,
    pub missing_key: usize,
    /// Records whose typed fields could not be coerced.
    pub rejected: usize,
    pub duplicates: usize,
    pub output: usize,
}

/// Keep only the last item for each key, in the order of those last
/// occurrences.
pub(crate) fn dedupe_keep_last<T, K, F>(items: Vec<T>, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut last: HashMap<K, usize> = HashMap::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        last.insert(key(item), i);
    }
    items
        .into_iter()
        .enumerate()
        .filter(|(i, item)| last.get(&key(item)) == Some(i))
        .map(|(_, item)| item)
        .collect()
}
