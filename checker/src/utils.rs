// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use rpds::{HashTrieMap, HashTrieSet};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Hashes a persistent map order independently: per-entry hashes are folded
/// with a commutative operation so that structurally equal maps hash equally
/// regardless of internal tree shape. This is what makes state interning
/// consistent with structural equality.
pub fn hash_unordered_map<K: Hash + Eq, V: Hash, H: Hasher>(
    map: &HashTrieMap<K, V>,
    state: &mut H,
) {
    let mut combined: u64 = 0;
    for (k, v) in map.iter() {
        let mut entry_hasher = DefaultHasher::new();
        k.hash(&mut entry_hasher);
        v.hash(&mut entry_hasher);
        combined = combined.wrapping_add(entry_hasher.finish());
    }
    state.write_u64(combined);
    state.write_usize(map.size());
}

/// Order independent hash of a persistent set; see `hash_unordered_map`.
pub fn hash_unordered_set<T: Hash + Eq, H: Hasher>(set: &HashTrieSet<T>, state: &mut H) {
    let mut combined: u64 = 0;
    for v in set.iter() {
        let mut entry_hasher = DefaultHasher::new();
        v.hash(&mut entry_hasher);
        combined = combined.wrapping_add(entry_hasher.finish());
    }
    state.write_u64(combined);
    state.write_usize(set.size());
}

/// Escapes a string for use inside a quoted graph export label.
pub fn escape_label(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
