use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use crate::error::{Error, Result};

/// Kind of a single file-level change.
///
/// Every [`ChangeRecord`] carries exactly one kind. Combinations of kinds are
/// only meaningful as a [`ChangeMask`] used to subscribe handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ChangeKind {
    Added = 0b00001,
    Deleted = 0b00010,
    Modified = 0b00100,
    Copied = 0b01000,
    Renamed = 0b10000,
}

impl ChangeKind {
    pub const ALL: [Self; 5] = [
        Self::Added,
        Self::Deleted,
        Self::Modified,
        Self::Copied,
        Self::Renamed,
    ];

    #[must_use]
    pub const fn bits(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Deleted => "deleted",
            Self::Modified => "modified",
            Self::Copied => "copied",
            Self::Renamed => "renamed",
        }
    }

    /// Number of paths a record of this kind carries.
    #[must_use]
    pub const fn arity(self) -> usize {
        match self {
            Self::Added | Self::Deleted | Self::Modified => 1,
            Self::Copied | Self::Renamed => 2,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription mask: any bitwise-OR combination of [`ChangeKind`] flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChangeMask(u8);

impl ChangeMask {
    pub const NONE: Self = Self(0);
    pub const ALL: Self = Self(0b11111);

    /// Builds a mask from raw flag bits, rejecting bits outside the five kinds.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Option<Self> {
        if bits & !Self::ALL.0 == 0 {
            Some(Self(bits))
        } else {
            None
        }
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn matches(self, kind: ChangeKind) -> bool {
        self.0 & kind.bits() != 0
    }

    pub fn kinds(self) -> impl Iterator<Item = ChangeKind> {
        ChangeKind::ALL.into_iter().filter(move |k| self.matches(*k))
    }
}

impl From<ChangeKind> for ChangeMask {
    fn from(kind: ChangeKind) -> Self {
        Self(kind.bits())
    }
}

impl FromIterator<ChangeKind> for ChangeMask {
    fn from_iter<I: IntoIterator<Item = ChangeKind>>(iter: I) -> Self {
        iter.into_iter().fold(Self::NONE, |mask, kind| mask | kind)
    }
}

impl BitOr for ChangeKind {
    type Output = ChangeMask;

    fn bitor(self, rhs: Self) -> ChangeMask {
        ChangeMask(self.bits() | rhs.bits())
    }
}

impl BitOr<ChangeKind> for ChangeMask {
    type Output = Self;

    fn bitor(self, rhs: ChangeKind) -> Self {
        Self(self.0 | rhs.bits())
    }
}

impl BitOr for ChangeMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign<ChangeKind> for ChangeMask {
    fn bitor_assign(&mut self, rhs: ChangeKind) {
        self.0 |= rhs.bits();
    }
}

/// One classified change between two revisions.
///
/// Added, Deleted and Modified records carry one path. Copied records carry
/// `(source, destination)` and Renamed records carry `(old, new)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeRecord {
    kind: ChangeKind,
    paths: Vec<String>,
}

impl ChangeRecord {
    /// Builds a record from a kind and its paths.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ParseError`] if the number of paths does not match
    /// [`ChangeKind::arity`].
    pub fn new(kind: ChangeKind, paths: Vec<String>) -> Result<Self> {
        if paths.len() != kind.arity() {
            return Err(Error::ParseError(format!(
                "{kind} change takes {} path(s), got {}",
                kind.arity(),
                paths.len()
            )));
        }
        Ok(Self { kind, paths })
    }

    #[must_use]
    pub const fn kind(&self) -> ChangeKind {
        self.kind
    }

    #[must_use]
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    #[must_use]
    pub fn added(path: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Added,
            paths: vec![path.into()],
        }
    }

    #[must_use]
    pub fn deleted(path: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Deleted,
            paths: vec![path.into()],
        }
    }

    #[must_use]
    pub fn modified(path: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Modified,
            paths: vec![path.into()],
        }
    }

    #[must_use]
    pub fn copied(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Copied,
            paths: vec![source.into(), destination.into()],
        }
    }

    #[must_use]
    pub fn renamed(old: impl Into<String>, new: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Renamed,
            paths: vec![old.into(), new.into()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_distinct_flags() {
        let combined: ChangeMask = ChangeKind::ALL.into_iter().collect();
        assert_eq!(combined, ChangeMask::ALL);
        assert_eq!(ChangeKind::Added.bits(), 1);
        assert_eq!(ChangeKind::Renamed.bits(), 16);
    }

    #[test]
    fn mask_matches_only_subscribed_kinds() {
        let mask = ChangeKind::Added | ChangeKind::Modified;
        assert!(mask.matches(ChangeKind::Added));
        assert!(mask.matches(ChangeKind::Modified));
        assert!(!mask.matches(ChangeKind::Deleted));
        assert_eq!(
            mask.kinds().collect::<Vec<_>>(),
            vec![ChangeKind::Added, ChangeKind::Modified]
        );
    }

    #[test]
    fn from_bits_rejects_unknown_flags() {
        assert_eq!(ChangeMask::from_bits(0b101), Some(ChangeKind::Added | ChangeKind::Modified));
        assert_eq!(ChangeMask::from_bits(0b100000), None);
    }

    #[test]
    fn record_arity_follows_kind() {
        for record in [
            ChangeRecord::added("a"),
            ChangeRecord::deleted("a"),
            ChangeRecord::modified("a"),
            ChangeRecord::copied("a", "b"),
            ChangeRecord::renamed("a", "b"),
        ] {
            assert_eq!(record.paths().len(), record.kind().arity());
        }
    }

    #[test]
    fn new_checks_path_count() {
        assert_eq!(
            ChangeRecord::new(ChangeKind::Renamed, vec!["a".into(), "b".into()]).unwrap(),
            ChangeRecord::renamed("a", "b")
        );
        assert!(matches!(
            ChangeRecord::new(ChangeKind::Added, vec!["a".into(), "b".into()]),
            Err(Error::ParseError(_))
        ));
        assert!(matches!(
            ChangeRecord::new(ChangeKind::Copied, vec!["a".into()]),
            Err(Error::ParseError(_))
        ));
    }
}
