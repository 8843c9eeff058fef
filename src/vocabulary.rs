//! Mapping between raw item identifiers and model indices.
//!
//! Two index spaces are in use throughout the crate:
//!
//! - the *model index space*, where 0 is reserved for unknown items and
//!   known items occupy `1..=N`; this is what indexes the embedding table;
//! - the *candidate index space*, `0..N`, which covers only known items and
//!   is what ranking operates on.
//!
//! [`to_candidate_index`] and [`to_model_index`] are the only way indices
//! cross from one space into the other.
use std::collections::HashMap;

use tracing::debug;

use crate::{BuildError, ItemId, ItemIndex};

/// Model index reserved for items not seen at construction time.
pub const UNKNOWN_INDEX: ItemIndex = 0;

/// Convert a model index into a candidate index.
///
/// Returns `None` for the unknown index, which is never a candidate.
pub fn to_candidate_index(model_index: ItemIndex) -> Option<usize> {
    model_index.checked_sub(1)
}

/// Convert a candidate index back into a model index.
pub fn to_model_index(candidate_index: usize) -> ItemIndex {
    candidate_index + 1
}

/// An immutable, ordered vocabulary of known items and their frequencies.
#[derive(Clone, Debug)]
pub struct Vocabulary {
    items: Vec<ItemId>,
    counts: Vec<u64>,
    index: HashMap<ItemId, ItemIndex>,
}

impl Vocabulary {
    /// Build a vocabulary from `(item, count)` pairs.
    ///
    /// The first pair receives index 1, the second index 2, and so on.
    pub fn new<I, K>(item_counts: I) -> Result<Self, BuildError>
    where
        I: IntoIterator<Item = (K, u64)>,
        K: Into<ItemId>,
    {
        let mut items = Vec::new();
        let mut counts = Vec::new();
        let mut index = HashMap::new();

        for (item, count) in item_counts {
            let item = item.into();

            if index.contains_key(&item) {
                return Err(BuildError::DuplicateItem(item));
            }

            index.insert(item.clone(), to_model_index(items.len()));
            items.push(item);
            counts.push(count);
        }

        if items.is_empty() {
            return Err(BuildError::EmptyVocabulary);
        }

        debug!(num_items = items.len(), "built vocabulary");

        Ok(Vocabulary {
            items,
            counts,
            index,
        })
    }

    /// Look up the model index of an item, falling back to [`UNKNOWN_INDEX`].
    pub fn lookup(&self, item: &str) -> ItemIndex {
        self.index.get(item).cloned().unwrap_or(UNKNOWN_INDEX)
    }

    /// Look up a sequence of items.
    pub fn lookup_all<S: AsRef<str>>(&self, items: &[S]) -> Vec<ItemIndex> {
        items.iter().map(|item| self.lookup(item.as_ref())).collect()
    }

    /// Return the item at a model index.
    ///
    /// The unknown index and out-of-range indices have no item.
    pub fn item(&self, index: ItemIndex) -> Option<&str> {
        to_candidate_index(index)
            .and_then(|idx| self.items.get(idx))
            .map(|item| item.as_str())
    }

    /// Number of known items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the vocabulary has no known items; never true once built.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of rows needed to embed every model index, including the
    /// unknown slot.
    pub fn num_rows(&self) -> usize {
        self.items.len() + 1
    }

    /// Frequencies of the known items, in candidate index order.
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Known items, in candidate index order.
    pub fn items(&self) -> &[ItemId] {
        &self.items
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn abc() -> Vocabulary {
        Vocabulary::new(vec![("A", 10), ("B", 5), ("C", 1)]).unwrap()
    }

    #[test]
    fn known_items_get_distinct_nonzero_indices() {
        let vocabulary = abc();

        let indices: HashSet<_> = vocabulary
            .items()
            .iter()
            .map(|item| vocabulary.lookup(item))
            .collect();

        assert_eq!(indices.len(), vocabulary.len());
        assert!(!indices.contains(&UNKNOWN_INDEX));
        assert!(indices.iter().all(|&idx| idx >= 1 && idx <= vocabulary.len()));
    }

    #[test]
    fn indices_follow_insertion_order() {
        let vocabulary = Vocabulary::new(vec![("z", 1), ("a", 100), ("m", 7)]).unwrap();

        assert_eq!(vocabulary.lookup("z"), 1);
        assert_eq!(vocabulary.lookup("a"), 2);
        assert_eq!(vocabulary.lookup("m"), 3);
        assert_eq!(vocabulary.counts(), &[1, 100, 7]);
        assert_eq!(vocabulary.num_rows(), 4);
    }

    #[test]
    fn unknown_items_map_to_zero() {
        let vocabulary = abc();

        assert_eq!(vocabulary.lookup("D"), UNKNOWN_INDEX);
        assert_eq!(vocabulary.lookup(""), UNKNOWN_INDEX);
        assert_eq!(vocabulary.lookup_all(&["A", "nope", "C"]), vec![1, 0, 3]);
    }

    #[test]
    fn item_decoding() {
        let vocabulary = abc();

        assert_eq!(vocabulary.item(UNKNOWN_INDEX), None);
        assert_eq!(vocabulary.item(1), Some("A"));
        assert_eq!(vocabulary.item(3), Some("C"));
        assert_eq!(vocabulary.item(4), None);
    }

    #[test]
    fn index_space_conversion() {
        assert_eq!(to_candidate_index(UNKNOWN_INDEX), None);
        assert_eq!(to_candidate_index(1), Some(0));
        assert_eq!(to_model_index(0), 1);

        for candidate in 0..10 {
            assert_eq!(to_candidate_index(to_model_index(candidate)), Some(candidate));
        }
    }

    #[test]
    fn rejects_empty_and_duplicates() {
        match Vocabulary::new(Vec::<(&str, u64)>::new()) {
            Err(BuildError::EmptyVocabulary) => {}
            other => panic!("Unexpected result {:?}", other),
        }

        match Vocabulary::new(vec![("A", 1), ("A", 2)]) {
            Err(BuildError::DuplicateItem(ref item)) if item == "A" => {}
            other => panic!("Unexpected result {:?}", other),
        }
    }
}
