//! Interaction data, training examples and batches.
use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::Hasher;

use rand::Rng;

use siphasher::sip::SipHasher;

use crate::{BatchError, ItemId, Timestamp, UserId};

/// A single user-item interaction.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Interaction {
    user_id: UserId,
    item_id: ItemId,
    timestamp: Timestamp,
}

impl Interaction {
    /// Create a new interaction.
    pub fn new<S: Into<ItemId>>(user_id: UserId, item_id: S, timestamp: Timestamp) -> Self {
        Interaction {
            user_id,
            item_id: item_id.into(),
            timestamp,
        }
    }

    /// Return the user id.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Return the item id.
    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    /// Return the timestamp.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

/// Split interactions into train and test sets such that every user is
/// either entirely in the train or entirely in the test set.
pub fn user_based_split<R: Rng>(
    interactions: &Interactions,
    rng: &mut R,
    test_fraction: f32,
) -> (Interactions, Interactions) {
    let denominator = 100_000;
    let test_cutoff = (test_fraction * denominator as f32) as u64;

    let (key_0, key_1): (u64, u64) = (rng.gen(), rng.gen());

    let is_train = |x: &Interaction| {
        let mut hasher = SipHasher::new_with_keys(key_0, key_1);
        hasher.write_usize(x.user_id());
        hasher.finish() % denominator >= test_cutoff
    };

    interactions.split_by(is_train)
}

fn cmp_timestamp(x: &Interaction, y: &Interaction) -> Ordering {
    x.user_id()
        .cmp(&y.user_id())
        .then(x.timestamp().cmp(&y.timestamp()))
}

/// A collection of interactions.
#[derive(Clone, Debug, Default)]
pub struct Interactions {
    interactions: Vec<Interaction>,
}

impl Interactions {
    /// Return the underlying interactions.
    pub fn data(&self) -> &[Interaction] {
        &self.interactions
    }

    /// Number of interactions.
    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    /// Whether there are no interactions.
    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    /// Shuffle the interactions in place.
    pub fn shuffle<R: Rng>(&mut self, rng: &mut R) {
        rng.shuffle(&mut self.interactions);
    }

    /// Split into the interactions for which `func` holds and the rest.
    pub fn split_by<F: Fn(&Interaction) -> bool>(&self, func: F) -> (Self, Self) {
        let (head, tail) = self.interactions.iter().cloned().partition(|x| func(x));

        (
            Interactions { interactions: head },
            Interactions { interactions: tail },
        )
    }

    /// Item frequencies, most frequent first; ties keep the order in which
    /// items first appear.
    pub fn item_counts(&self) -> Vec<(ItemId, u64)> {
        let mut positions: HashMap<&str, usize> = HashMap::new();
        let mut counts: Vec<(ItemId, u64)> = Vec::new();

        for interaction in &self.interactions {
            let next_position = counts.len();
            let position = *positions
                .entry(interaction.item_id())
                .or_insert(next_position);

            if position == next_position {
                counts.push((interaction.item_id.clone(), 0));
            }

            counts[position].1 += 1;
        }

        // Stable, so ties stay in first-appearance order.
        counts.sort_by(|a, b| b.1.cmp(&a.1));

        counts
    }

    /// Each user's items in timestamp order, users in ascending id order.
    pub fn to_sequences(&self) -> Vec<(UserId, Vec<ItemId>)> {
        let mut data = self.interactions.clone();
        data.sort_by(cmp_timestamp);

        let mut sequences: Vec<(UserId, Vec<ItemId>)> = Vec::new();

        for datum in data {
            let is_new_user = sequences
                .last()
                .map_or(true, |&(user_id, _)| user_id != datum.user_id);

            if is_new_user {
                sequences.push((datum.user_id, Vec::new()));
            }

            if let Some(&mut (_, ref mut items)) = sequences.last_mut() {
                items.push(datum.item_id);
            }
        }

        sequences
    }

    /// Every window of `context_length` consecutive items of a user,
    /// labelled with the item that follows it.
    ///
    /// Users with `context_length` items or fewer yield no examples.
    pub fn to_examples(&self, context_length: usize) -> Vec<Example> {
        if context_length == 0 {
            return Vec::new();
        }

        self.to_sequences()
            .into_iter()
            .flat_map(|(_, items)| {
                items
                    .windows(context_length + 1)
                    .map(|window| Example {
                        context: window[..context_length].to_vec(),
                        label: window[context_length].clone(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

impl From<Vec<Interaction>> for Interactions {
    fn from(data: Vec<Interaction>) -> Interactions {
        Interactions { interactions: data }
    }
}

/// A context sequence and the item that followed it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    /// Previously interacted-with items, oldest first.
    pub context: Vec<ItemId>,
    /// The next item.
    pub label: ItemId,
}

impl Example {
    /// Create a new example.
    pub fn new<S: Into<ItemId>>(context: Vec<S>, label: S) -> Self {
        Example {
            context: context.into_iter().map(Into::into).collect(),
            label: label.into(),
        }
    }
}

/// A batch of examples with uniform context length.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Batch {
    context_movie_id: Vec<Vec<ItemId>>,
    label_movie_id: Vec<ItemId>,
}

impl Batch {
    /// Build a batch, checking that there is one label per context and that
    /// all contexts are non-empty and equally long.
    pub fn new(
        context_movie_id: Vec<Vec<ItemId>>,
        label_movie_id: Vec<ItemId>,
    ) -> Result<Self, BatchError> {
        if context_movie_id.len() != label_movie_id.len() {
            return Err(BatchError::LengthMismatch {
                contexts: context_movie_id.len(),
                labels: label_movie_id.len(),
            });
        }

        let expected = match context_movie_id.first() {
            None => return Err(BatchError::EmptyBatch),
            Some(context) if context.is_empty() => return Err(BatchError::EmptyContext),
            Some(context) => context.len(),
        };

        for (position, context) in context_movie_id.iter().enumerate() {
            if context.len() != expected {
                return Err(BatchError::RaggedContext {
                    position,
                    expected,
                    found: context.len(),
                });
            }
        }

        Ok(Batch {
            context_movie_id,
            label_movie_id,
        })
    }

    /// Build a batch from examples.
    pub fn from_examples(examples: &[Example]) -> Result<Self, BatchError> {
        Batch::new(
            examples.iter().map(|x| x.context.clone()).collect(),
            examples.iter().map(|x| x.label.clone()).collect(),
        )
    }

    /// Context sequences.
    pub fn context_movie_id(&self) -> &[Vec<ItemId>] {
        &self.context_movie_id
    }

    /// Labels.
    pub fn label_movie_id(&self) -> &[ItemId] {
        &self.label_movie_id
    }

    /// Number of examples.
    pub fn len(&self) -> usize {
        self.label_movie_id.len()
    }

    /// Always false: batches hold at least one example.
    pub fn is_empty(&self) -> bool {
        self.label_movie_id.is_empty()
    }

    /// Length of every context sequence.
    pub fn sequence_length(&self) -> usize {
        self.context_movie_id.first().map_or(0, |context| context.len())
    }
}

/// Chunk `examples` into batches of at most `batch_size`.
pub fn minibatches<'a>(
    examples: &'a [Example],
    batch_size: usize,
) -> impl Iterator<Item = Result<Batch, BatchError>> + 'a {
    examples.chunks(batch_size.max(1)).map(Batch::from_examples)
}
