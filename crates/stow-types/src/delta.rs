use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of mutation a [`Delta`] describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeltaAction {
    Add,
    Put,
    Remove,
}

impl fmt::Display for DeltaAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Put => write!(f, "put"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

/// One observed mutation to a keyed entity.
///
/// Deltas are immutable once emitted; [`Delta::merge`] produces a new delta.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta<T> {
    pub action: DeltaAction,
    pub key: String,
    /// The value after the mutation. `None` for removals.
    pub value: Option<T>,
}

impl<T> Delta<T> {
    pub fn new(action: DeltaAction, key: impl Into<String>, value: Option<T>) -> Self {
        Self {
            action,
            key: key.into(),
            value,
        }
    }

    pub fn add(key: impl Into<String>, value: T) -> Self {
        Self::new(DeltaAction::Add, key, Some(value))
    }

    pub fn put(key: impl Into<String>, value: T) -> Self {
        Self::new(DeltaAction::Put, key, Some(value))
    }

    pub fn remove(key: impl Into<String>) -> Self {
        Self::new(DeltaAction::Remove, key, None)
    }

    /// Returns `true` if this delta is a removal.
    pub fn is_remove(&self) -> bool {
        self.action == DeltaAction::Remove
    }
}

impl<T: Clone> Delta<T> {
    /// Merge this delta with a later delta for the same key.
    ///
    /// `Remove ⊕ Remove = Remove`; every other combination becomes a `Put`
    /// carrying the later value. Returns `None` if the keys differ.
    pub fn merge(&self, later: &Delta<T>) -> Option<Delta<T>> {
        if self.key != later.key {
            return None;
        }
        if self.is_remove() && later.is_remove() {
            return Some(Delta::remove(self.key.clone()));
        }
        Some(Delta::new(
            DeltaAction::Put,
            self.key.clone(),
            later.value.clone(),
        ))
    }
}

impl<T> fmt::Display for Delta<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.action,
            std::any::type_name::<T>().rsplit("::").next().unwrap_or(""),
            self.key
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_then_put_merges_to_put() {
        let merged = Delta::<u32>::remove("k").merge(&Delta::put("k", 5)).unwrap();
        assert_eq!(merged, Delta::put("k", 5));
    }

    #[test]
    fn remove_then_remove_stays_remove() {
        let merged = Delta::<u32>::remove("k").merge(&Delta::remove("k")).unwrap();
        assert_eq!(merged, Delta::remove("k"));
    }

    #[test]
    fn add_then_put_carries_later_value() {
        let merged = Delta::add("k", 1u32).merge(&Delta::put("k", 2)).unwrap();
        assert_eq!(merged.action, DeltaAction::Put);
        assert_eq!(merged.value, Some(2));
    }

    #[test]
    fn put_then_remove_becomes_put_without_value() {
        let merged = Delta::put("k", 1u32).merge(&Delta::remove("k")).unwrap();
        assert_eq!(merged.action, DeltaAction::Put);
        assert_eq!(merged.value, None);
    }

    #[test]
    fn different_keys_do_not_merge() {
        assert!(Delta::put("a", 1u32).merge(&Delta::put("b", 2)).is_none());
    }

    #[test]
    fn merge_leaves_inputs_untouched() {
        let first = Delta::add("k", 1u32);
        let second = Delta::put("k", 2u32);
        let _ = first.merge(&second);
        assert_eq!(first, Delta::add("k", 1));
        assert_eq!(second, Delta::put("k", 2));
    }

    #[test]
    fn display_format() {
        assert_eq!(format!("{}", Delta::put("k1", 1u32)), "put u32 k1");
        assert_eq!(format!("{}", DeltaAction::Remove), "remove");
    }
}
