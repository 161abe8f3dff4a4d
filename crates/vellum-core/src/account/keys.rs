//! One-time and fallback prekeys held by an account.

use serde::{Deserialize, Serialize};
use vellum_crypto::{Curve25519KeyPair, Curve25519PublicKey};
use vellum_proto::{
    Pickle, PickleReader, PickleWriter, Unpickle, encode_base64, errors::Result,
    pickle::{BOOL_LEN, U8_LEN, U32_LEN},
};

use crate::pickle::libolm_base64;

/// Curve25519 prekey with its publication state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct OneTimeKey {
    pub(crate) id: u32,
    pub(crate) published: bool,
    #[serde(with = "libolm_base64")]
    pub(crate) key: Curve25519KeyPair,
}

impl OneTimeKey {
    pub(crate) fn new(id: u32, key: Curve25519KeyPair) -> Self {
        Self { id, published: false, key }
    }

    /// Key id as it appears in key listings: base64 of the big-endian id.
    pub(crate) fn key_id(&self) -> String {
        encode_base64(self.id.to_be_bytes())
    }

    pub(crate) fn public_key(&self) -> Curve25519PublicKey {
        self.key.public_key()
    }
}

impl Pickle for OneTimeKey {
    fn pickle_len(&self) -> usize {
        U32_LEN + BOOL_LEN + self.key.pickle_len()
    }

    fn pickle(&self, writer: &mut PickleWriter<'_>) -> Result<()> {
        writer.write_u32(self.id)?;
        writer.write_bool(self.published)?;
        self.key.pickle(writer)
    }
}

impl Unpickle for OneTimeKey {
    fn unpickle(reader: &mut PickleReader<'_>) -> Result<Self> {
        let id = reader.read_u32()?;
        let published = reader.read_bool()?;
        let key = Curve25519KeyPair::unpickle(reader)?;
        Ok(Self { id, published, key })
    }
}

/// Fallback key slots: none, one, or a current key plus the one it replaced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum FallbackKeys {
    #[default]
    Empty,
    Current(OneTimeKey),
    Rotated { current: OneTimeKey, previous: OneTimeKey },
}

impl FallbackKeys {
    /// Install `key` as current, keeping the old current as previous.
    pub(crate) fn rotate(&mut self, key: OneTimeKey) {
        *self = match std::mem::take(self) {
            Self::Empty => Self::Current(key),
            Self::Current(previous) | Self::Rotated { current: previous, .. } => {
                Self::Rotated { current: key, previous }
            },
        };
    }

    /// Drop the previous key, if any.
    pub(crate) fn forget_previous(&mut self) {
        if let Self::Rotated { current, .. } = std::mem::take(self) {
            *self = Self::Current(current);
        }
    }

    pub(crate) fn current(&self) -> Option<&OneTimeKey> {
        match self {
            Self::Empty => None,
            Self::Current(current) | Self::Rotated { current, .. } => Some(current),
        }
    }

    pub(crate) fn current_mut(&mut self) -> Option<&mut OneTimeKey> {
        match self {
            Self::Empty => None,
            Self::Current(current) | Self::Rotated { current, .. } => Some(current),
        }
    }

    fn count(&self) -> u8 {
        match self {
            Self::Empty => 0,
            Self::Current(_) => 1,
            Self::Rotated { .. } => 2,
        }
    }

    /// Version 3 layout: both slots always present, occupancy inferred from
    /// the published flags.
    pub(crate) fn unpickle_v3(reader: &mut PickleReader<'_>) -> Result<Self> {
        let current = OneTimeKey::unpickle(reader)?;
        let previous = OneTimeKey::unpickle(reader)?;
        Ok(match (current.published, previous.published) {
            (false, _) => Self::Empty,
            (true, false) => Self::Current(current),
            (true, true) => Self::Rotated { current, previous },
        })
    }
}

/// Version 4 layout: `count(u8)` followed by that many keys.
impl Pickle for FallbackKeys {
    fn pickle_len(&self) -> usize {
        U8_LEN
            + match self {
                Self::Empty => 0,
                Self::Current(current) => current.pickle_len(),
                Self::Rotated { current, previous } => current.pickle_len() + previous.pickle_len(),
            }
    }

    fn pickle(&self, writer: &mut PickleWriter<'_>) -> Result<()> {
        writer.write_u8(self.count())?;
        match self {
            Self::Empty => Ok(()),
            Self::Current(current) => current.pickle(writer),
            Self::Rotated { current, previous } => {
                current.pickle(writer)?;
                previous.pickle(writer)
            },
        }
    }
}

impl Unpickle for FallbackKeys {
    fn unpickle(reader: &mut PickleReader<'_>) -> Result<Self> {
        match reader.read_u8()? {
            0 => Ok(Self::Empty),
            1 => Ok(Self::Current(OneTimeKey::unpickle(reader)?)),
            2 => {
                let current = OneTimeKey::unpickle(reader)?;
                let previous = OneTimeKey::unpickle(reader)?;
                Ok(Self::Rotated { current, previous })
            },
            count => Err(vellum_proto::ProtocolError::OutOfRange {
                field: "num_fallback_keys",
                value: u64::from(count),
            }),
        }
    }
}
