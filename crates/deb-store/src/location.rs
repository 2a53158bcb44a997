use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Hierarchical address of a group of blocks, e.g. `3/17`.
///
/// Every segment is allocated by the store. A location is never empty; the
/// first segment names a root location and each further segment a child.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Location(Vec<u64>);

impl Location {
    /// A root location with a single segment.
    pub fn root(segment: u64) -> Self {
        Self(vec![segment])
    }

    /// A child of this location.
    pub fn child(&self, segment: u64) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment);
        Self(segments)
    }

    /// The parent location, or `None` for a root.
    pub fn parent(&self) -> Option<Self> {
        match self.0.len() {
            0 | 1 => None,
            n => Some(Self(self.0[..n - 1].to_vec())),
        }
    }

    pub fn segments(&self) -> &[u64] {
        &self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Location({self})")
    }
}

impl FromStr for Location {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Err(StoreError::InvalidLocation("empty location".into()));
        }
        trimmed
            .split('/')
            .map(|segment| {
                segment.parse::<u64>().map_err(|_| {
                    StoreError::InvalidLocation(format!("{s:?}: bad segment {segment:?}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl TryFrom<String> for Location {
    type Error = StoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Location> for String {
    fn from(location: Location) -> Self {
        location.to_string()
    }
}

/// Store-assigned identity of a block: its location plus a sequence number.
///
/// Opaque to the engine; only compared, hashed and displayed. Sequence
/// numbers increase in allocation order within a location.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId {
    pub location: Location,
    pub seq: u64,
}

impl BlockId {
    pub fn new(location: Location, seq: u64) -> Self {
        Self { location, seq }
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.location, self.seq)
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({self})")
    }
}

/// Version stamp of a stored block, replaced on every successful write.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    pub const fn new(stamp: u64) -> Self {
        Self(stamp)
    }

    pub const fn stamp(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Version({})", self.0)
    }
}

/// A block identity together with the version observed or written.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRef {
    pub id: BlockId,
    pub version: Version,
}

impl BlockRef {
    pub fn new(id: BlockId, version: Version) -> Self {
        Self { id, version }
    }
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let location: Location = "3/17".parse().unwrap();
        assert_eq!(location.segments(), &[3, 17]);
        assert_eq!(location.to_string(), "3/17");
        assert_eq!("/3/17/".parse::<Location>().unwrap(), location);
    }

    #[test]
    fn malformed_locations_rejected() {
        for bad in ["", "/", "3//4", "a/1", "-1"] {
            assert!(
                matches!(bad.parse::<Location>(), Err(StoreError::InvalidLocation(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn child_and_parent() {
        let root = Location::root(3);
        let child = root.child(17);
        assert_eq!(child.parent(), Some(root.clone()));
        assert_eq!(root.parent(), None);
    }

    #[test]
    fn block_id_display() {
        let id = BlockId::new(Location::root(3).child(4), 9);
        assert_eq!(id.to_string(), "3/4#9");
        let r = BlockRef::new(id, Version::new(12));
        assert_eq!(r.to_string(), "3/4#9@v12");
    }

    #[test]
    fn block_ids_order_by_location_then_seq() {
        let a = BlockId::new(Location::root(1), 5);
        let b = BlockId::new(Location::root(1), 6);
        let c = BlockId::new(Location::root(2), 1);
        assert!(a < b && b < c);
    }
}
