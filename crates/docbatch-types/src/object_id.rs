use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::TypeError;

/// Length of an object id in bytes.
pub const OBJECT_ID_LEN: usize = 12;

/// Length of the canonical hex form of an object id.
pub const OBJECT_ID_HEX_LEN: usize = OBJECT_ID_LEN * 2;

static COUNTER: AtomicU32 = AtomicU32::new(0);
static PROCESS_UNIQUE: OnceLock<[u8; 5]> = OnceLock::new();

/// Canonical 12-byte document identifier.
///
/// Layout follows the usual document-store convention: a 4-byte big-endian
/// creation timestamp (seconds), 5 bytes unique to the generating process and
/// a 3-byte big-endian counter. The canonical string form is 24 lowercase hex
/// characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; OBJECT_ID_LEN]);

impl ObjectId {
    /// Generate a fresh id for the current time.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as u32;
        let unique = PROCESS_UNIQUE.get_or_init(rand::random::<[u8; 5]>);
        let count = COUNTER.fetch_add(1, Ordering::Relaxed) & 0x00ff_ffff;

        let mut bytes = [0u8; OBJECT_ID_LEN];
        bytes[0..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(unique);
        bytes[9..12].copy_from_slice(&count.to_be_bytes()[1..]);
        Self(bytes)
    }

    /// Create an id from raw bytes.
    pub const fn from_bytes(bytes: [u8; OBJECT_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// The raw 12 bytes.
    pub fn as_bytes(&self) -> &[u8; OBJECT_ID_LEN] {
        &self.0
    }

    /// Creation time in seconds since the UNIX epoch.
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// Canonical lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a 24-character hex string (either case).
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != OBJECT_ID_LEN {
            return Err(TypeError::InvalidLength {
                expected: OBJECT_ID_LEN,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; OBJECT_ID_LEN];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Loose validity check: 24 hex characters, or any string of exactly
    /// 12 bytes (taken as the raw id bytes).
    ///
    /// This accepts strings such as `"toptoptoptop"` whose reconstructed id
    /// does not print back as the input. Use
    /// [`denormalize`](crate::identifier::denormalize) when the distinction
    /// matters.
    pub fn is_valid(s: &str) -> bool {
        Self::parse_loose(s).is_some()
    }

    /// Construct an id using the loose rules of [`ObjectId::is_valid`].
    pub fn parse_loose(s: &str) -> Option<Self> {
        if s.len() == OBJECT_ID_HEX_LEN {
            if let Ok(id) = Self::from_hex(s) {
                return Some(id);
            }
        }
        if s.len() == OBJECT_ID_LEN {
            let mut arr = [0u8; OBJECT_ID_LEN];
            arr.copy_from_slice(s.as_bytes());
            return Some(Self(arr));
        }
        None
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; OBJECT_ID_LEN]> for ObjectId {
    fn from(bytes: [u8; OBJECT_ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl From<ObjectId> for [u8; OBJECT_ID_LEN] {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}
