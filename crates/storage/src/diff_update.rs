//! Incremental replacement of a key's value set.
//!
//! Rebuilding a set with [`MultiMaplet::put`] costs the size of the final
//! set, while an append costs only the size of the delta. [`update`] reads
//! the current set once and picks the cheapest write that reaches the new
//! one:
//!
//! | current   | new       | diff                   | write             |
//! |-----------|-----------|------------------------|-------------------|
//! | empty     | non-empty | not consulted          | append everything |
//! | non-empty | empty     | not consulted          | remove the key    |
//! | empty     | empty     | not consulted          | nothing           |
//! | non-empty | non-empty | unchanged              | nothing           |
//! | non-empty | non-empty | only additions         | append the added  |
//! | non-empty | non-empty | removals or changes    | put the new set   |

use std::hash::Hash;

use crate::{
    error::Result,
    multi_maplet::{MultiMaplet, ValueSet},
};

/// The difference between two value sets, as reported by a diff function.
///
/// `changed` holds values present on both sides whose content differs in a
/// way the set equality cannot see. [`SetDiff::compute`] never fills it;
/// callers tracking such changes supply their own diff function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetDiff<V> {
    /// Values in the new set only.
    pub added: Vec<V>,

    /// Values in the old set only.
    pub removed: Vec<V>,

    /// Values in both sets whose content changed.
    pub changed: Vec<V>,
}

impl<V> Default for SetDiff<V> {
    fn default() -> Self {
        Self { added: Vec::new(), removed: Vec::new(), changed: Vec::new() }
    }
}

impl<V: Hash + Eq + Clone> SetDiff<V> {
    /// The plain set difference between `before` and `after`.
    ///
    /// # Example
    ///
    /// ```
    /// use depstore_storage::{SetDiff, ValueSet};
    ///
    /// let before: ValueSet<u32> = [1, 2].into_iter().collect();
    /// let after: ValueSet<u32> = [2, 3].into_iter().collect();
    ///
    /// let diff = SetDiff::compute(&before, &after);
    /// assert_eq!(diff.added, vec![3]);
    /// assert_eq!(diff.removed, vec![1]);
    /// assert!(diff.changed.is_empty());
    /// ```
    pub fn compute(before: &ValueSet<V>, after: &ValueSet<V>) -> Self {
        Self {
            added: after.difference(before).cloned().collect(),
            removed: before.difference(after).cloned().collect(),
            changed: Vec::new(),
        }
    }
}

impl<V> SetDiff<V> {
    /// Returns `true` if the diff reports no difference at all.
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.changed.is_empty()
    }

    /// Returns `true` if the diff only adds values.
    pub fn is_pure_addition(&self) -> bool {
        !self.added.is_empty()
            && self.removed.is_empty()
            && self.changed.is_empty()
    }
}

/// The write [`update`] performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateOutcome {
    /// Nothing was written.
    Unchanged,

    /// The given number of values was appended.
    Appended(usize),

    /// The key was removed.
    Removed,

    /// The whole set was rewritten with [`MultiMaplet::put`].
    Rewritten,
}

/// Replaces the set of `key` with `new_values` using the cheapest write.
///
/// `diff_fn` receives the current and the new set; it is only called when
/// both are non-empty. [`SetDiff::compute`] is a ready-made diff function.
///
/// # Errors
///
/// Propagates the failures of the store's read and write operations.
///
/// # Example
///
/// ```
/// use depstore_storage::{
///     MultiMaplet, SetDiff, UpdateOutcome, ValueSet, update,
///     multi_maplet::volatile::VolatileMultiMaplet,
/// };
///
/// let store = VolatileMultiMaplet::<String, u32>::new();
/// let key = "mod/Foo".to_owned();
/// store.append_values(&key, &[1, 2]).unwrap();
///
/// let grown: ValueSet<u32> = [1, 2, 3].into_iter().collect();
/// let outcome = update(&store, &key, &grown, SetDiff::compute).unwrap();
///
/// assert_eq!(outcome, UpdateOutcome::Appended(1));
/// assert_eq!(store.get(&key).unwrap(), grown);
/// ```
pub fn update<K, V, S>(
    store: &S,
    key: &K,
    new_values: &ValueSet<V>,
    diff_fn: impl FnOnce(&ValueSet<V>, &ValueSet<V>) -> SetDiff<V>,
) -> Result<UpdateOutcome>
where
    V: Clone,
    S: MultiMaplet<K, V> + ?Sized,
{
    let before = store.get(key)?;

    match (before.is_empty(), new_values.is_empty()) {
        (true, true) => return Ok(UpdateOutcome::Unchanged),

        (true, false) => {
            let added = new_values.iter().cloned().collect::<Vec<_>>();
            store.append_values(key, &added)?;
            return Ok(UpdateOutcome::Appended(added.len()));
        }

        (false, true) => {
            store.remove(key)?;
            return Ok(UpdateOutcome::Removed);
        }

        (false, false) => {}
    }

    let diff = diff_fn(&before, new_values);

    if diff.is_unchanged() {
        Ok(UpdateOutcome::Unchanged)
    } else if diff.is_pure_addition() {
        store.append_values(key, &diff.added)?;
        Ok(UpdateOutcome::Appended(diff.added.len()))
    } else {
        store.put(key, new_values)?;
        Ok(UpdateOutcome::Rewritten)
    }
}
