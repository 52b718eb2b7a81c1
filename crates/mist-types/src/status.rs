use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Per-row supersession marker on the object table.
///
/// Transitions only move forward: a row is written `Current` or `Deleted`
/// and, once a later version touches the same object, becomes `Old` or
/// `OldDeleted` respectively. Rows are never physically removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ObjectStatus {
    Current = 1,
    Deleted = 2,
    Old = 3,
    OldDeleted = 4,
}

impl ObjectStatus {
    /// Amount added to a status code when a later version supersedes the row.
    pub const SUPERSEDE_STEP: u8 = 2;

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Result<Self, TypeError> {
        match code {
            1 => Ok(Self::Current),
            2 => Ok(Self::Deleted),
            3 => Ok(Self::Old),
            4 => Ok(Self::OldDeleted),
            other => Err(TypeError::UnknownStatus(other)),
        }
    }

    /// `true` for the newest row of an object (`Current` or `Deleted`).
    pub fn is_latest(self) -> bool {
        self.code() <= Self::Deleted.code()
    }

    /// `true` for the newest row of an object that has not been deleted.
    pub fn is_live(self) -> bool {
        self == Self::Current
    }

    /// `true` if the row records a deletion, superseded or not.
    pub fn is_deletion(self) -> bool {
        matches!(self, Self::Deleted | Self::OldDeleted)
    }

    /// The status this row takes when a later version supersedes it.
    /// Already superseded rows are left unchanged.
    pub fn superseded(self) -> Self {
        match self {
            Self::Current => Self::Old,
            Self::Deleted => Self::OldDeleted,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supersede_adds_two() {
        for status in [ObjectStatus::Current, ObjectStatus::Deleted] {
            assert_eq!(
                status.superseded().code(),
                status.code() + ObjectStatus::SUPERSEDE_STEP
            );
        }
    }

    #[test]
    fn superseded_rows_stay_put() {
        assert_eq!(ObjectStatus::Old.superseded(), ObjectStatus::Old);
        assert_eq!(ObjectStatus::OldDeleted.superseded(), ObjectStatus::OldDeleted);
    }

    #[test]
    fn code_roundtrip() {
        for code in 1..=4 {
            assert_eq!(ObjectStatus::from_code(code).unwrap().code(), code);
        }
        assert_eq!(
            ObjectStatus::from_code(9).unwrap_err(),
            TypeError::UnknownStatus(9)
        );
    }

    #[test]
    fn latest_and_live() {
        assert!(ObjectStatus::Current.is_latest());
        assert!(ObjectStatus::Deleted.is_latest());
        assert!(!ObjectStatus::Old.is_latest());
        assert!(ObjectStatus::Current.is_live());
        assert!(!ObjectStatus::Deleted.is_live());
        assert!(ObjectStatus::OldDeleted.is_deletion());
    }
}
