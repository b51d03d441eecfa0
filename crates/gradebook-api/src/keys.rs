//! Row identity and sync-state types.
//!
//! Identity is normalized here, once, at the boundary: a row owns a stable
//! `LocalId` assigned by the mirror store, optionally a `ServerId` assigned
//! by the backend, and cross-entity references are the closed `EntityRef`
//! enum with a canonical text encoding. Merge logic never juggles raw
//! numbers or strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifier assigned by the local mirror store. Stable for the lifetime
/// of a row regardless of server-identity changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalId(pub i64);

/// Identifier assigned by the remote system on first successful creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServerId(pub i64);

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error)]
#[error("invalid entity reference: {0:?}")]
pub struct KeyParseError(pub String);

/// Reference to another mirrored entity.
///
/// While the referenced row exists only locally the reference carries its
/// `LocalId`; once the row obtains a server identity, every referencing
/// column is rewritten to `Server` by the post-push cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityRef {
    Server(ServerId),
    Local(LocalId),
}

impl EntityRef {
    pub fn server_id(&self) -> Option<ServerId> {
        match self {
            EntityRef::Server(id) => Some(*id),
            EntityRef::Local(_) => None,
        }
    }

    pub fn local_id(&self) -> Option<LocalId> {
        match self {
            EntityRef::Server(_) => None,
            EntityRef::Local(id) => Some(*id),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, EntityRef::Local(_))
    }

    /// Canonical storage encoding: `s:<n>` for server identities,
    /// `l:<n>` for local-only rows.
    pub fn encode(&self) -> String {
        match self {
            EntityRef::Server(id) => format!("s:{}", id.0),
            EntityRef::Local(id) => format!("l:{}", id.0),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for EntityRef {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tag, num) = s.split_once(':').ok_or_else(|| KeyParseError(s.to_string()))?;
        let value: i64 = num.parse().map_err(|_| KeyParseError(s.to_string()))?;
        match tag {
            "s" => Ok(EntityRef::Server(ServerId(value))),
            "l" => Ok(EntityRef::Local(LocalId(value))),
            _ => Err(KeyParseError(s.to_string())),
        }
    }
}

impl Serialize for EntityRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for EntityRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Synchronization state of a mirrored row.
///
/// The wire encoding matches the pending-mutation verbs so a dump of the
/// mirror reads naturally: `synced`, `create`, `update`, `delete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncState {
    #[serde(rename = "synced")]
    Synced,
    #[serde(rename = "create")]
    PendingCreate,
    #[serde(rename = "update")]
    PendingUpdate,
    #[serde(rename = "delete")]
    PendingDelete,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Synced => "synced",
            SyncState::PendingCreate => "create",
            SyncState::PendingUpdate => "update",
            SyncState::PendingDelete => "delete",
        }
    }

    pub fn parse(s: &str) -> Result<Self, KeyParseError> {
        match s {
            "synced" => Ok(SyncState::Synced),
            "create" => Ok(SyncState::PendingCreate),
            "update" => Ok(SyncState::PendingUpdate),
            "delete" => Ok(SyncState::PendingDelete),
            other => Err(KeyParseError(other.to_string())),
        }
    }

    /// True for states holding an unsynced local edit (`create`/`update`).
    /// Tombstones are pending too, but they are not edits a merge must
    /// protect field-wise.
    pub fn is_pending_edit(&self) -> bool {
        matches!(self, SyncState::PendingCreate | SyncState::PendingUpdate)
    }

    pub fn is_pending(&self) -> bool {
        !matches!(self, SyncState::Synced)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A domain entity wrapped with its mirror bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mirrored<E> {
    pub local_id: LocalId,
    pub server_id: Option<ServerId>,
    pub state: SyncState,
    pub entity: E,
}

impl<E> Mirrored<E> {
    /// The reference other rows should use to point at this row: the server
    /// identity when one exists, the local key otherwise.
    pub fn key(&self) -> EntityRef {
        match self.server_id {
            Some(id) => EntityRef::Server(id),
            None => EntityRef::Local(self.local_id),
        }
    }

    /// True when `reference` designates this row under either identity.
    pub fn is_referenced_by(&self, reference: EntityRef) -> bool {
        match reference {
            EntityRef::Server(id) => self.server_id == Some(id),
            EntityRef::Local(id) => self.local_id == id,
        }
    }

    /// Every encoding under which other rows may reference this row.
    pub fn reference_encodings(&self) -> Vec<String> {
        let mut encodings = Vec::with_capacity(2);
        if let Some(id) = self.server_id {
            encodings.push(EntityRef::Server(id).encode());
        }
        encodings.push(EntityRef::Local(self.local_id).encode());
        encodings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_ref_round_trips_through_encoding() {
        let server = EntityRef::Server(ServerId(42));
        let local = EntityRef::Local(LocalId(7));
        assert_eq!(server.encode().parse::<EntityRef>().unwrap(), server);
        assert_eq!(local.encode().parse::<EntityRef>().unwrap(), local);
    }

    #[test]
    fn entity_ref_rejects_malformed_input() {
        assert!("42".parse::<EntityRef>().is_err());
        assert!("x:42".parse::<EntityRef>().is_err());
        assert!("s:abc".parse::<EntityRef>().is_err());
    }

    #[test]
    fn sync_state_round_trips() {
        for state in [
            SyncState::Synced,
            SyncState::PendingCreate,
            SyncState::PendingUpdate,
            SyncState::PendingDelete,
        ] {
            assert_eq!(SyncState::parse(state.as_str()).unwrap(), state);
        }
        assert!(SyncState::parse("bogus").is_err());
    }

    #[test]
    fn mirrored_key_prefers_server_identity() {
        let row = Mirrored {
            local_id: LocalId(3),
            server_id: Some(ServerId(9)),
            state: SyncState::Synced,
            entity: (),
        };
        assert_eq!(row.key(), EntityRef::Server(ServerId(9)));
        assert!(row.is_referenced_by(EntityRef::Local(LocalId(3))));
        assert!(row.is_referenced_by(EntityRef::Server(ServerId(9))));
        assert!(!row.is_referenced_by(EntityRef::Server(ServerId(4))));
    }
}
