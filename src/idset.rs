//! Set operations over 32-bit gallery IDs.
//!
//! Multi-term searches fetch one ID list per filter dimension and combine
//! them with AND semantics ([`intersect`]); checkpointed IDs are subtracted
//! from a resolved list with [`difference`]. Both operate on hash sets so a
//! run over tens of thousands of IDs stays linear in the total input size.

use std::collections::HashSet;

/// Returns the sorted set of values present in every input collection.
///
/// The empty input yields an empty result, as does any empty member
/// collection (an absorbing element for intersection). Collections are
/// visited smallest-first so the working set never grows beyond the
/// smallest input.
#[must_use]
pub fn intersect(collections: &[Vec<u32>]) -> Vec<u32> {
    if collections.is_empty() {
        return Vec::new();
    }

    let mut sorted: Vec<&Vec<u32>> = collections.iter().collect();
    sorted.sort_by_key(|collection| collection.len());

    let (first, rest) = match sorted.split_first() {
        Some(parts) => parts,
        None => return Vec::new(),
    };
    if first.is_empty() {
        return Vec::new();
    }

    let mut accumulator: HashSet<u32> = first.iter().copied().collect();
    for collection in rest {
        let other: HashSet<u32> = collection.iter().copied().collect();
        accumulator.retain(|value| other.contains(value));
        if accumulator.is_empty() {
            return Vec::new();
        }
    }

    into_sorted(accumulator)
}

/// Returns the elements of the first collection absent from every
/// subsequent collection.
///
/// A single-collection input returns that collection unchanged apart from
/// deduplication. Used to subtract the checkpoint set from a resolved ID
/// list before downloading.
#[must_use]
pub fn difference(collections: &[Vec<u32>]) -> Vec<u32> {
    let (first, rest) = match collections.split_first() {
        Some(parts) => parts,
        None => return Vec::new(),
    };

    let mut accumulator: HashSet<u32> = first.iter().copied().collect();
    for collection in rest {
        for value in collection {
            accumulator.remove(value);
        }
        if accumulator.is_empty() {
            return Vec::new();
        }
    }

    into_sorted(accumulator)
}

fn into_sorted(set: HashSet<u32>) -> Vec<u32> {
    let mut values: Vec<u32> = set.into_iter().collect();
    values.sort_unstable();
    values
}
