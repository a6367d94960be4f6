//! Physical key derivation for segments.
//!
//! A logical map is stored as segment records addressed by
//! `(base key, segment ordinal)`. Two derivations are supported:
//!
//! - **Value keys** compose the base key and ordinal as text
//!   (`"<base>:<ordinal>"`). Records are directly addressable and easy to
//!   inspect, but consecutive ordinals map to neighbouring keys, which can
//!   concentrate load on one partition of the store.
//! - **Digest keys** hash `(base key, ordinal)` with SHA-256. Keys spread
//!   uniformly, and the segment index record lists which ordinals exist.

use crate::error::{CoreError, CoreResult};
use adaptmap_store::{RecordId, RecordKey, DIGEST_SIZE};
use sha2::{Digest, Sha256};

const SEGMENT_DOMAIN: u8 = 0x01;
const INDEX_DOMAIN: u8 = 0x02;

/// Strategy for deriving physical record keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressingMode {
    /// Human-readable `"<base>:<ordinal>"` keys.
    #[default]
    ValueKey,
    /// SHA-256 digest keys plus a persisted segment index.
    DigestKey,
}

/// Derives record keys for one namespace and set.
#[derive(Debug, Clone)]
pub struct KeyCodec {
    namespace: String,
    set: String,
    mode: AddressingMode,
}

impl KeyCodec {
    /// Creates a codec.
    pub fn new(namespace: impl Into<String>, set: impl Into<String>, mode: AddressingMode) -> Self {
        Self {
            namespace: namespace.into(),
            set: set.into(),
            mode,
        }
    }

    /// Returns the addressing mode.
    pub fn mode(&self) -> AddressingMode {
        self.mode
    }

    /// Derives the record identifier of a segment.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `base_key` is empty.
    pub fn physical_id(base_key: &str, ordinal: u32, mode: AddressingMode) -> CoreResult<RecordId> {
        check_base_key(base_key)?;
        Ok(match mode {
            AddressingMode::ValueKey => RecordId::Text(format!("{base_key}:{ordinal}")),
            AddressingMode::DigestKey => {
                RecordId::Digest(digest(SEGMENT_DOMAIN, base_key, &ordinal.to_be_bytes()))
            }
        })
    }

    /// Returns the record key of a segment.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `base_key` is empty.
    pub fn segment_key(&self, base_key: &str, ordinal: u32) -> CoreResult<RecordKey> {
        let id = Self::physical_id(base_key, ordinal, self.mode)?;
        Ok(RecordKey::new(self.namespace.clone(), self.set.clone(), id))
    }

    /// Returns the record key of the segment index for `base_key`.
    ///
    /// Only digest-key mode persists an index; in value-key mode the
    /// segments themselves are discoverable from their ordinals.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `base_key` is empty.
    pub fn index_key(&self, base_key: &str) -> CoreResult<RecordKey> {
        check_base_key(base_key)?;
        let id = RecordId::Digest(digest(INDEX_DOMAIN, base_key, b"index"));
        Ok(RecordKey::new(self.namespace.clone(), self.set.clone(), id))
    }
}

/// Rejects base keys the engine cannot address.
///
/// # Errors
///
/// Returns `InvalidArgument` if `base_key` is empty.
pub fn check_base_key(base_key: &str) -> CoreResult<()> {
    if base_key.is_empty() {
        return Err(CoreError::invalid_argument("base key must not be empty"));
    }
    Ok(())
}

fn digest(domain: u8, base_key: &str, suffix: &[u8]) -> [u8; DIGEST_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update([domain]);
    // Length prefix keeps (base, suffix) pairs unambiguous
    hasher.update((base_key.len() as u64).to_be_bytes());
    hasher.update(base_key.as_bytes());
    hasher.update(suffix);
    hasher.finalize().into()
}
