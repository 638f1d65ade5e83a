//! Layout versions of persisted batches.

use core::fmt;

use crate::SCHEMA_VERSION;

/// Revision of the [`Batch`](crate::Batch) layout within the current major
/// version. Bumped when optional fields are added.
pub const BATCH_LAYOUT_REVISION: u32 = 0;

/// Layout a persisted [`Batch`](crate::Batch) was written with.
///
/// Reports are rebuilt from batches long after they were written, possibly
/// by a newer or older reader, so every batch carries its layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
}

impl SchemaVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// The layout batches are written with by this build.
    pub const fn current() -> Self {
        Self::new(SCHEMA_VERSION, BATCH_LAYOUT_REVISION)
    }

    /// Whether a reader at this version can rebuild readings from a batch
    /// written at `written`. Unknown fields are skipped on read, so only the
    /// major versions have to agree.
    pub fn can_read(&self, written: SchemaVersion) -> bool {
        self.major == written.major
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readers_need_matching_major() {
        let reader = SchemaVersion::current();
        assert!(reader.can_read(SchemaVersion::new(SCHEMA_VERSION, 0)));
        assert!(reader.can_read(SchemaVersion::new(SCHEMA_VERSION, BATCH_LAYOUT_REVISION + 3)));
        assert!(!reader.can_read(SchemaVersion::new(SCHEMA_VERSION + 1, 0)));
        assert!(!SchemaVersion::new(SCHEMA_VERSION + 1, 0).can_read(reader));
    }

    #[test]
    fn displays_as_dotted_pair() {
        assert_eq!(SchemaVersion::new(1, 4).to_string(), "1.4");
        assert!(SchemaVersion::new(1, 4) < SchemaVersion::new(2, 0));
    }
}
