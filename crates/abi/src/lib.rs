//! ABI definitions of the automation registry and the packing of the values exchanged with it.

#[allow(missing_docs)]
mod calls;
pub use calls::{
    checkCallbackCall, checkCallbackReturn, checkErrorHandlerCall, IAutomationRegistry,
    StreamsLookup,
};

mod error;
pub use error::AbiError;

#[allow(missing_docs)]
mod logs;
pub use logs::{
    try_decode_log, DedupKeyAdded, InsufficientFundsUpkeepReport, ReorgedUpkeepReport,
    StaleUpkeepReport, UpkeepCanceled, UpkeepMigrated, UpkeepPaused, UpkeepPerformed,
    UpkeepReceived, UpkeepRegistered, UpkeepTriggerConfigSet, UpkeepUnpaused,
};

#[allow(missing_docs)]
mod pack;
pub use pack::{
    pack_log, pack_log_trigger_config, pack_trigger, unpack_log_trigger_config, unpack_trigger,
    ConditionalTrigger, LogTrigger, LogTriggerConfig, Report, TriggerLog,
};
