use alloy_primitives::Log;
use alloy_sol_types::{sol, SolEvent};

sol! {
    #[derive(Debug)]
    event UpkeepRegistered(uint256 indexed id, uint32 performGas, address admin);

    #[derive(Debug)]
    event UpkeepReceived(uint256 indexed id, uint256 startingBalance, address importedFrom);

    #[derive(Debug)]
    event UpkeepPaused(uint256 indexed id);

    #[derive(Debug)]
    event UpkeepUnpaused(uint256 indexed id);

    #[derive(Debug)]
    event UpkeepCanceled(uint256 indexed id, uint64 indexed atBlockHeight);

    #[derive(Debug)]
    event UpkeepMigrated(uint256 indexed id, uint256 remainingBalance, address destination);

    #[derive(Debug)]
    event UpkeepTriggerConfigSet(uint256 indexed id, bytes triggerConfig);

    #[derive(Debug)]
    event DedupKeyAdded(bytes32 indexed dedupKey);

    #[derive(Debug)]
    event UpkeepPerformed(
        uint256 indexed id,
        bool indexed success,
        uint96 totalPayment,
        uint256 gasUsed,
        uint256 gasOverhead,
        bytes trigger
    );

    #[derive(Debug)]
    event StaleUpkeepReport(uint256 indexed id, bytes trigger);

    #[derive(Debug)]
    event ReorgedUpkeepReport(uint256 indexed id, bytes trigger);

    #[derive(Debug)]
    event InsufficientFundsUpkeepReport(uint256 indexed id, bytes trigger);
}

/// Tries to decode the provided log into the type T.
pub fn try_decode_log<T: SolEvent>(log: &Log) -> Option<Log<T>> {
    T::decode_log(log).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, U256};

    #[test]
    fn test_should_decode_only_matching_events() {
        let event = UpkeepPaused { id: U256::from(7) };
        let log = Log { address: Address::repeat_byte(1), data: event.encode_log_data() };

        let decoded = try_decode_log::<UpkeepPaused>(&log).expect("paused event");
        assert_eq!(decoded.data.id, U256::from(7));
        assert!(try_decode_log::<UpkeepUnpaused>(&log).is_none());
    }
}
