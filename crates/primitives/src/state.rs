use crate::{UpkeepFailureReason, UpkeepId, WorkId};

/// The terminal state of a unit of work.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub enum UpkeepState {
    /// The work was performed on chain.
    Performed,
    /// The work was found ineligible.
    Ineligible,
    /// Nothing is known about the work.
    #[default]
    Unknown,
}

impl UpkeepState {
    /// Returns the persisted code of the state.
    pub const fn code(&self) -> u8 {
        match self {
            Self::Performed => 0,
            Self::Ineligible => 1,
            Self::Unknown => 2,
        }
    }

    /// Returns the state for the persisted code. Unrecognized codes map to
    /// [`UpkeepState::Unknown`].
    pub const fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Performed,
            1 => Self::Ineligible,
            _ => Self::Unknown,
        }
    }
}

/// A terminal state recorded for a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct UpkeepStateRecord {
    /// The identifier of the work.
    pub work_id: WorkId,
    /// The upkeep of the work.
    pub upkeep_id: UpkeepId,
    /// The recorded state.
    pub state: UpkeepState,
    /// The check block of the work.
    pub block_number: u64,
    /// The reason the work was found ineligible.
    pub ineligibility_reason: UpkeepFailureReason,
    /// The unix timestamp in milliseconds the record was created at.
    pub inserted_at: u64,
}
