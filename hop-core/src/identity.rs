//! Device identity: 64-byte identifiers, display profiles, and the identity store seam.

use std::fmt;
use std::str::FromStr;

use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Length of an [`Identifier`] in bytes.
pub const ID_LENGTH: usize = 64;

/// Length of the hex text form of an [`Identifier`].
pub const ID_HEX_LENGTH: usize = ID_LENGTH * 2;

/// Opaque device identity. Equality and hashing are byte-exact.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct Identifier([u8; ID_LENGTH]);

impl Identifier {
    /// Draw a fresh identifier from the operating system's secure random source.
    pub fn random() -> Self {
        let mut data = [0u8; ID_LENGTH];
        OsRng.fill_bytes(&mut data);
        Identifier(data)
    }

    pub fn from_bytes(bytes: [u8; ID_LENGTH]) -> Self {
        Identifier(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ID_LENGTH] {
        &self.0
    }

    /// Parse the fixed-width hex form. Upper- and lowercase digits are both accepted.
    pub fn from_hex(text: &str) -> Result<Self, IdentifierError> {
        if text.len() != ID_HEX_LENGTH {
            return Err(IdentifierError::Format {
                reason: "wrong length",
            });
        }
        let mut data = [0u8; ID_LENGTH];
        hex::decode_to_slice(text, &mut data).map_err(|_| IdentifierError::Format {
            reason: "non-hex character",
        })?;
        Ok(Identifier(data))
    }

    /// Lowercase hex, always [`ID_HEX_LENGTH`] characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Read exactly [`ID_LENGTH`] bytes from the front of `buf`, advancing it.
    /// On error `buf` is left untouched.
    pub fn read(buf: &mut &[u8]) -> Result<Self, IdentifierError> {
        if buf.len() < ID_LENGTH {
            return Err(IdentifierError::Truncated {
                needed: ID_LENGTH,
                available: buf.len(),
            });
        }
        let (head, rest) = buf.split_at(ID_LENGTH);
        let mut data = [0u8; ID_LENGTH];
        data.copy_from_slice(head);
        *buf = rest;
        Ok(Identifier(data))
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0);
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable.
        write!(f, "Identifier({}..)", hex::encode(&self.0[..6]))
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Identifier::from_hex(s)
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let text: String = Deserialize::deserialize(d)?;
        Identifier::from_hex(&text).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("malformed identifier text: {reason}")]
    Format { reason: &'static str },
    #[error("identifier truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
}

/// Human-readable information shown to other users.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
}

impl Profile {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// The local device: a stable identifier plus its display profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    id: Identifier,
    profile: Profile,
}

impl Identity {
    pub fn new(id: Identifier, profile: Profile) -> Self {
        Self { id, profile }
    }

    /// Create a brand new identity with a random identifier.
    pub fn generate(name: impl Into<String>) -> Self {
        Self::new(Identifier::random(), Profile::new(name))
    }

    pub fn id(&self) -> Identifier {
        self.id
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }
}

/// Persisted identity collaborator. The host decides where identities live.
pub trait IdentityStore: Send + Sync {
    /// Load the saved identity. Fails with [`StoreError::Missing`] if none was created yet.
    fn load(&self) -> Result<Identity, StoreError>;

    fn save(&self, identity: &Identity) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no identity has been created yet")]
    Missing,
    #[error("identity store failure: {0}")]
    Backend(String),
}

/// Identity store kept in memory, for hosts without persistence.
#[derive(Default)]
pub struct MemoryIdentityStore {
    slot: Mutex<Option<Identity>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(identity: Identity) -> Self {
        Self {
            slot: Mutex::new(Some(identity)),
        }
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn load(&self) -> Result<Identity, StoreError> {
        self.slot.lock().clone().ok_or(StoreError::Missing)
    }

    fn save(&self, identity: &Identity) -> Result<(), StoreError> {
        *self.slot.lock() = Some(identity.clone());
        Ok(())
    }
}
