//! Primitive types shared by the automation node crates.

pub use block::{BlockHistory, BlockInfo};
mod block;

pub use check::{CheckResult, UpkeepPayload};
mod check;

pub use reason::{PipelineExecutionState, UpkeepFailureReason};
mod reason;

pub use state::{UpkeepState, UpkeepStateRecord};
mod state;

pub use transmit::{CoordinatedBlockProposal, ReportedUpkeep, TransmitEvent, TransmitEventType};
mod transmit;

pub use trigger::{LogTriggerConfig, LogTriggerExtension, Trigger, WorkId};
mod trigger;

pub use upkeep::{UpkeepId, UpkeepType};
mod upkeep;
