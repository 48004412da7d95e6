//! Identifiers for matches, players and moles.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Deserialize};

/// Match identifier (UUID, serialized as its string form).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(pub uuid::Uuid);

impl MatchId {
    /// Fresh random id.
    pub fn new_v4() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(uuid::Uuid::from_bytes(bytes))
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Player identifier assigned by the transport layer.
///
/// Opaque to the match core; ordering is only used to keep score snapshots
/// in a stable order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    /// Wrap a transport-assigned id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random id, for connections without an external identity.
    pub fn new_v4() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mole identifier, unique within one match.
///
/// Clients see it as a string (`"mole-7"`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct MoleId(pub u32);

/// A mole id string that is not `mole-<n>`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid mole id: {0:?}")]
pub struct InvalidMoleId(pub String);

impl fmt::Display for MoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mole-{}", self.0)
    }
}

impl FromStr for MoleId {
    type Err = InvalidMoleId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("mole-")
            .and_then(|n| n.parse().ok())
            .map(MoleId)
            .ok_or_else(|| InvalidMoleId(s.to_string()))
    }
}

impl From<MoleId> for String {
    fn from(id: MoleId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for MoleId {
    type Error = InvalidMoleId;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Milliseconds on the match clock (Unix epoch in production, logical in tests).
pub type Millis = u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mole_id_wire_form() {
        assert_eq!(serde_json::to_string(&MoleId(7)).unwrap(), r#""mole-7""#);
        assert_eq!(serde_json::from_str::<MoleId>(r#""mole-42""#).unwrap(), MoleId(42));
    }

    #[test]
    fn test_mole_id_rejects_other_forms() {
        assert!(serde_json::from_str::<MoleId>("7").is_err());
        assert!(serde_json::from_str::<MoleId>(r#""7""#).is_err());
        assert!(serde_json::from_str::<MoleId>(r#""mole-""#).is_err());
        assert!(serde_json::from_str::<MoleId>(r#""mole--1""#).is_err());
        assert_eq!("rabbit-3".parse::<MoleId>(), Err(InvalidMoleId("rabbit-3".into())));
    }

    #[test]
    fn test_mole_id_bincode() {
        let bytes = bincode::serialize(&MoleId(9)).unwrap();
        assert_eq!(bincode::deserialize::<MoleId>(&bytes).unwrap(), MoleId(9));
    }
}
