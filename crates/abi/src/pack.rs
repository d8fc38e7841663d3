use crate::AbiError;

use alloy_primitives::{Bytes, U256};
use alloy_sol_types::{sol, SolValue};
use automation_primitives::{LogTriggerExtension, Trigger, UpkeepId, UpkeepType};

sol! {
    #[derive(Debug, Default, PartialEq, Eq)]
    struct Report {
        uint256 fastGasWei;
        uint256 linkNative;
        uint256[] upkeepIds;
        uint256[] gasLimits;
        bytes[] triggers;
        bytes[] performDatas;
    }

    #[derive(Debug, Default, PartialEq, Eq)]
    struct ConditionalTrigger {
        uint32 blockNum;
        bytes32 blockHash;
    }

    #[derive(Debug, Default, PartialEq, Eq)]
    struct LogTrigger {
        bytes32 logBlockHash;
        bytes32 txHash;
        uint32 logIndex;
        uint32 blockNum;
        bytes32 blockHash;
    }

    #[derive(Debug, Default, PartialEq, Eq)]
    struct TriggerLog {
        uint256 index;
        uint256 timestamp;
        bytes32 txHash;
        uint256 blockNumber;
        bytes32 blockHash;
        address source;
        bytes32[] topics;
        bytes data;
    }

    #[derive(Debug, Default, PartialEq, Eq)]
    struct LogTriggerConfig {
        address contractAddress;
        uint8 filterSelector;
        bytes32 topic0;
        bytes32 topic1;
        bytes32 topic2;
        bytes32 topic3;
    }
}

impl From<LogTriggerConfig> for automation_primitives::LogTriggerConfig {
    fn from(value: LogTriggerConfig) -> Self {
        Self {
            contract_address: value.contractAddress,
            filter_selector: value.filterSelector,
            topic0: value.topic0,
            topic1: value.topic1,
            topic2: value.topic2,
            topic3: value.topic3,
        }
    }
}

impl From<&automation_primitives::LogTriggerConfig> for LogTriggerConfig {
    fn from(value: &automation_primitives::LogTriggerConfig) -> Self {
        Self {
            contractAddress: value.contract_address,
            filterSelector: value.filter_selector,
            topic0: value.topic0,
            topic1: value.topic1,
            topic2: value.topic2,
            topic3: value.topic3,
        }
    }
}

fn block_num(number: u64) -> Result<u32, AbiError> {
    u32::try_from(number).map_err(|_| AbiError::Overflow("block number"))
}

/// Packs the trigger the way the registry expects it for the upkeep type.
pub fn pack_trigger(upkeep_id: &UpkeepId, trigger: &Trigger) -> Result<Bytes, AbiError> {
    let packed = match upkeep_id.upkeep_type() {
        UpkeepType::Conditional => ConditionalTrigger {
            blockNum: block_num(trigger.block_number)?,
            blockHash: trigger.block_hash,
        }
        .abi_encode(),
        UpkeepType::LogTrigger => {
            let ext = trigger.log_trigger_extension.unwrap_or_default();
            LogTrigger {
                logBlockHash: ext.block_hash,
                txHash: ext.tx_hash,
                logIndex: ext.log_index,
                blockNum: block_num(trigger.block_number)?,
                blockHash: trigger.block_hash,
            }
            .abi_encode()
        }
        ty => return Err(AbiError::UnsupportedUpkeepType(ty.as_byte())),
    };
    Ok(packed.into())
}

/// Unpacks a trigger packed by [`pack_trigger`]. The block number of the log extension is not
/// part of the packed trigger and is left unset.
pub fn unpack_trigger(upkeep_id: &UpkeepId, raw: &[u8]) -> Result<Trigger, AbiError> {
    match upkeep_id.upkeep_type() {
        UpkeepType::Conditional => {
            let trigger = ConditionalTrigger::abi_decode(raw)?;
            Ok(Trigger::new(trigger.blockNum.into(), trigger.blockHash))
        }
        UpkeepType::LogTrigger => {
            let trigger = LogTrigger::abi_decode(raw)?;
            let ext = LogTriggerExtension {
                tx_hash: trigger.txHash,
                log_index: trigger.logIndex,
                block_hash: trigger.logBlockHash,
                block_number: 0,
            };
            Ok(Trigger::with_log(trigger.blockNum.into(), trigger.blockHash, ext))
        }
        ty => Err(AbiError::UnsupportedUpkeepType(ty.as_byte())),
    }
}

/// Packs a mined log into the check data of a log trigger upkeep.
pub fn pack_log(log: &alloy_rpc_types_eth::Log) -> Result<Bytes, AbiError> {
    let packed = TriggerLog {
        index: U256::from(log.log_index.ok_or(AbiError::IncompleteLog("log_index"))?),
        timestamp: U256::from(log.block_timestamp.unwrap_or_default()),
        txHash: log.transaction_hash.ok_or(AbiError::IncompleteLog("transaction_hash"))?,
        blockNumber: U256::from(log.block_number.ok_or(AbiError::IncompleteLog("block_number"))?),
        blockHash: log.block_hash.ok_or(AbiError::IncompleteLog("block_hash"))?,
        source: log.address(),
        topics: log.topics().to_vec(),
        data: log.data().data.clone(),
    };
    Ok(packed.abi_encode().into())
}

/// Unpacks the trigger config of a log upkeep.
pub fn unpack_log_trigger_config(
    raw: &[u8],
) -> Result<automation_primitives::LogTriggerConfig, AbiError> {
    Ok(LogTriggerConfig::abi_decode(raw)?.into())
}

/// Packs the trigger config of a log upkeep.
pub fn pack_log_trigger_config(config: &automation_primitives::LogTriggerConfig) -> Bytes {
    LogTriggerConfig::from(config).abi_encode().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, B256};

    #[test]
    fn test_should_pack_log_trigger_without_extension_block_number() -> eyre::Result<()> {
        // Given
        let id = UpkeepId::new(UpkeepType::LogTrigger, [0; 4], [9; 16]);
        let ext = LogTriggerExtension {
            tx_hash: B256::repeat_byte(1),
            log_index: 3,
            block_hash: B256::repeat_byte(2),
            block_number: 100,
        };
        let trigger = Trigger::with_log(105, B256::repeat_byte(4), ext);

        // When
        let unpacked = unpack_trigger(&id, &pack_trigger(&id, &trigger)?)?;

        // Then
        assert_eq!(unpacked.block_number, 105);
        assert_eq!(
            unpacked.log_trigger_extension,
            Some(LogTriggerExtension { block_number: 0, ..ext })
        );
        Ok(())
    }

    #[test]
    fn test_should_reject_unsupported_trigger_types() {
        let id = UpkeepId::new(UpkeepType::Cron, [0; 4], [9; 16]);
        assert!(matches!(
            pack_trigger(&id, &Trigger::default()),
            Err(AbiError::UnsupportedUpkeepType(2))
        ));
    }

    #[test]
    fn test_should_reject_incomplete_logs() {
        let log = alloy_rpc_types_eth::Log::default();
        assert!(matches!(pack_log(&log), Err(AbiError::IncompleteLog(_))));
    }

    #[test]
    fn test_should_unpack_trigger_config() -> eyre::Result<()> {
        let config = automation_primitives::LogTriggerConfig {
            contract_address: Address::repeat_byte(0xaa),
            filter_selector: 0b011,
            topic0: B256::repeat_byte(0x3d),
            topic1: B256::repeat_byte(1),
            ..Default::default()
        };
        assert_eq!(unpack_log_trigger_config(&pack_log_trigger_config(&config))?, config);
        assert!(unpack_log_trigger_config(&[1, 2, 3]).is_err());
        Ok(())
    }
}
