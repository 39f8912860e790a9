//! Problems detected while parsing or validating an LRC document.

use bitflags::bitflags;

bitflags! {
    /// Set of problems found in a document.
    ///
    /// Flags combine with the usual bit operators. Declaration order is the
    /// order used when listing messages.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ErrorFlags: u16 {
        /// A tag occurs more than once
        const DUPLICATE_TAGS       = 1 << 0;
        /// A tag outside the reserved set is present
        const UNKNOWN_TAGS         = 1 << 1;
        /// A line could not be understood
        const BAD_DATA             = 1 << 2;
        /// A tag line follows a lyrics line
        const BAD_LAYOUT           = 1 << 3;
        /// A lyrics line has no timestamp
        const NO_TIMESTAMP         = 1 << 4;
        /// A timestamp is malformed or out of range
        const BAD_TIMESTAMP        = 1 << 5;
        /// Two lyrics lines share a timestamp
        const DUPLICATE_TIMESTAMPS = 1 << 6;
        /// Timestamps decrease somewhere in the file
        const OUT_OF_ORDER         = 1 << 7;
    }
}

impl ErrorFlags {
    /// Flags owned by the timestamp consistency pass.
    pub const TIMESTAMP_CHECKS: Self = Self::NO_TIMESTAMP
        .union(Self::DUPLICATE_TIMESTAMPS)
        .union(Self::OUT_OF_ORDER);

    /// Human-readable description of a single flag.
    ///
    /// Returns `None` for the empty set or for a combination of flags.
    #[must_use]
    pub fn message(self) -> Option<&'static str> {
        MESSAGES
            .iter()
            .find(|(flag, _)| *flag == self)
            .map(|(_, message)| *message)
    }

    /// Active flags paired with their messages, in declaration order.
    pub fn messages(self) -> impl Iterator<Item = (Self, &'static str)> {
        MESSAGES
            .iter()
            .copied()
            .filter(move |(flag, _)| self.contains(*flag))
    }
}

const MESSAGES: [(ErrorFlags, &str); 8] = [
    (ErrorFlags::DUPLICATE_TAGS, "Some tags are defined more than once"),
    (
        ErrorFlags::UNKNOWN_TAGS,
        "File contains tags that are not part of the LRC standard",
    ),
    (ErrorFlags::BAD_DATA, "File contains lines that could not be parsed"),
    (ErrorFlags::BAD_LAYOUT, "Tags appear after the first lyrics line"),
    (ErrorFlags::NO_TIMESTAMP, "Some lyrics lines have no timestamp"),
    (ErrorFlags::BAD_TIMESTAMP, "Some timestamps are malformed"),
    (
        ErrorFlags::DUPLICATE_TIMESTAMPS,
        "Some lyrics lines share the same timestamp",
    ),
    (ErrorFlags::OUT_OF_ORDER, "Timestamps are not in chronological order"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_flag_has_message() {
        for flag in ErrorFlags::all().iter() {
            assert!(flag.message().is_some(), "{flag:?} has no message");
        }
    }

    #[test]
    fn test_combined_flags_have_no_single_message() {
        let combined = ErrorFlags::BAD_DATA | ErrorFlags::BAD_LAYOUT;
        assert!(combined.message().is_none());
        assert!(ErrorFlags::empty().message().is_none());
    }

    #[test]
    fn test_messages_in_declaration_order() {
        let flags = ErrorFlags::OUT_OF_ORDER | ErrorFlags::DUPLICATE_TAGS | ErrorFlags::BAD_DATA;
        let listed: Vec<_> = flags.messages().map(|(flag, _)| flag).collect();
        assert_eq!(
            listed,
            vec![
                ErrorFlags::DUPLICATE_TAGS,
                ErrorFlags::BAD_DATA,
                ErrorFlags::OUT_OF_ORDER
            ]
        );
    }

    #[test]
    fn test_set_operations() {
        let mut flags = ErrorFlags::NO_TIMESTAMP | ErrorFlags::UNKNOWN_TAGS;
        assert!(flags.contains(ErrorFlags::UNKNOWN_TAGS));

        flags.remove(ErrorFlags::UNKNOWN_TAGS);
        assert!(!flags.contains(ErrorFlags::UNKNOWN_TAGS));
        assert_eq!(flags & ErrorFlags::TIMESTAMP_CHECKS, ErrorFlags::NO_TIMESTAMP);
        assert!(!(!flags).contains(ErrorFlags::NO_TIMESTAMP));
    }
}
