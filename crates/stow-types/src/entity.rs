use crate::temporal::Timestamp;

/// A value associated with a unique string key derived from its state.
pub trait Keyed {
    /// The stable key of this value.
    fn key(&self) -> String;
}

/// A value that can be stored through a typed storage dispatcher.
///
/// `Clone` is the deep copy used by read-modify-write helpers and by watchers
/// that keep the previously seen value. `Default` is the zero value delivered
/// for removals and absent keys.
pub trait Entity: Keyed + Clone + Default + Send + Sync + 'static {
    /// Settable logical timestamp, if this entity carries one.
    ///
    /// When timestamp stamping is enabled, writes fill in a timestamp that is
    /// still [`Timestamp::UNSET`] and leave an already-set one untouched.
    fn timestamp_mut(&mut self) -> Option<&mut Timestamp> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Note {
        id: String,
        time: Timestamp,
    }

    impl Keyed for Note {
        fn key(&self) -> String {
            self.id.clone()
        }
    }

    impl Entity for Note {
        fn timestamp_mut(&mut self) -> Option<&mut Timestamp> {
            Some(&mut self.time)
        }
    }

    #[derive(Clone, Default)]
    struct Plain(String);

    impl Keyed for Plain {
        fn key(&self) -> String {
            self.0.clone()
        }
    }

    impl Entity for Plain {}

    #[test]
    fn timestamp_capability_is_optional() {
        let mut plain = Plain("a".into());
        assert!(plain.timestamp_mut().is_none());

        let mut note = Note {
            id: "n".into(),
            time: Timestamp::UNSET,
        };
        *note.timestamp_mut().unwrap() = Timestamp::from_ticks(7);
        assert_eq!(note.time, Timestamp::from_ticks(7));
        assert_eq!(note.key(), "n");
    }
}
