use alloy_primitives::{B256, U256};

/// The index of the byte carrying the upkeep type in the 32 bytes identifier.
const UPKEEP_TYPE_BYTE_INDEX: usize = 15;

/// The range of bytes which must all be zero for the identifier to carry a type byte.
const UPKEEP_TYPE_PREFIX_RANGE: core::ops::Range<usize> = 4..UPKEEP_TYPE_BYTE_INDEX;

/// The trigger class of an upkeep, embedded in its identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub enum UpkeepType {
    /// A condition based upkeep, checked on every block.
    Conditional,
    /// An upkeep triggered by an event log.
    LogTrigger,
    /// A time based upkeep.
    Cron,
    /// A readiness based upkeep.
    Ready,
    /// A type byte which is not assigned to any known upkeep type.
    Unknown(u8),
}

impl UpkeepType {
    /// Returns the type byte for the upkeep type.
    pub const fn as_byte(&self) -> u8 {
        match self {
            Self::Conditional => 0,
            Self::LogTrigger => 1,
            Self::Cron => 2,
            Self::Ready => 3,
            Self::Unknown(b) => *b,
        }
    }
}

impl From<u8> for UpkeepType {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Conditional,
            1 => Self::LogTrigger,
            2 => Self::Cron,
            3 => Self::Ready,
            b => Self::Unknown(b),
        }
    }
}

/// The identifier of an upkeep on the registry.
///
/// Newer identifiers embed the [`UpkeepType`] at byte 15, with bytes 4 to 14 zeroed. Any
/// identifier with a non zero byte in that range is a legacy identifier and is always treated as
/// a [`UpkeepType::Conditional`] upkeep.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    derive_more::Display,
    derive_more::From,
)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct UpkeepId(pub U256);

impl UpkeepId {
    /// Returns an identifier of the provided type, with the four leading bytes taken from the
    /// prefix and the 16 trailing bytes taken from the suffix.
    pub fn new(upkeep_type: UpkeepType, prefix: [u8; 4], suffix: [u8; 16]) -> Self {
        let mut bytes = [0u8; 32];
        bytes[..4].copy_from_slice(&prefix);
        bytes[UPKEEP_TYPE_BYTE_INDEX] = upkeep_type.as_byte();
        bytes[16..].copy_from_slice(&suffix);
        Self(U256::from_be_bytes(bytes))
    }

    /// Returns the big endian bytes of the identifier.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_be_bytes()
    }

    /// Returns the identifier as a 32 bytes word, the way it appears in indexed log topics.
    pub fn as_word(&self) -> B256 {
        B256::new(self.to_bytes())
    }

    /// Returns the decoded upkeep type.
    pub fn upkeep_type(&self) -> UpkeepType {
        let bytes = self.to_bytes();
        if bytes[UPKEEP_TYPE_PREFIX_RANGE].iter().any(|b| *b != 0) {
            return UpkeepType::Conditional;
        }
        bytes[UPKEEP_TYPE_BYTE_INDEX].into()
    }
}

impl From<B256> for UpkeepId {
    fn from(value: B256) -> Self {
        Self(value.into())
    }
}

impl From<u64> for UpkeepId {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_should_round_trip_upkeep_type() {
        let mut rng = rand::rng();
        for ty in [
            UpkeepType::Conditional,
            UpkeepType::LogTrigger,
            UpkeepType::Cron,
            UpkeepType::Ready,
            UpkeepType::Unknown(42),
        ] {
            let id = UpkeepId::new(ty, rng.random(), rng.random());
            assert_eq!(id.upkeep_type(), ty);
        }
    }

    #[test]
    fn test_should_decode_legacy_id_as_conditional() {
        // Given
        let mut bytes: [u8; 32] = rand::rng().random();
        bytes[7] = 0xff;
        bytes[UPKEEP_TYPE_BYTE_INDEX] = UpkeepType::LogTrigger.as_byte();

        // When
        let id = UpkeepId::from(B256::new(bytes));

        // Then
        assert_eq!(id.upkeep_type(), UpkeepType::Conditional);
    }

    #[test]
    fn test_should_decode_small_ids_as_conditional() {
        for n in [0u64, 1, 255, u64::MAX] {
            assert_eq!(UpkeepId::from(n).upkeep_type(), UpkeepType::Conditional);
        }
    }
}
