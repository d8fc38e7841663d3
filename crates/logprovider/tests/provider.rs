//! Integration tests of the log event provider against the in memory log index.

use alloy_primitives::{address, b256, Address, B256};
use automation_logprovider::{
    filter_name, LimiterConfig, LogEventProvider, LogProviderConfig, LogProviderError,
};
use automation_primitives::{LogTriggerConfig, UpkeepId, UpkeepType};
use automation_providers::test_utils::{mined_log, MockLogIndex};
use std::time::Duration;

const CONTRACT: Address = address!("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
const TOPIC0: B256 = b256!("0x3d53a39550e04688065827f3bb86584cb007ab9ebca7ebd528e7301c9c31eb5d");

fn upkeep(n: u8) -> UpkeepId {
    UpkeepId::new(UpkeepType::LogTrigger, [0; 4], [n; 16])
}

fn config() -> LogTriggerConfig {
    LogTriggerConfig { contract_address: CONTRACT, topic0: TOPIC0, ..Default::default() }
}

fn provider(config: LogProviderConfig) -> (LogEventProvider<MockLogIndex>, MockLogIndex) {
    let index = MockLogIndex::new();
    (LogEventProvider::new(index.clone(), config), index)
}

#[tokio::test]
async fn test_should_return_new_logs_once() -> eyre::Result<()> {
    // Given
    let (provider, index) = provider(LogProviderConfig::default());
    let id = upkeep(1);
    provider.register_filter(id, config(), 1).await?;
    index.add_logs((1..=10).map(|n| mined_log(CONTRACT, vec![TOPIC0], n, 0)));
    index.set_latest_block(10);

    // When
    let first = provider.get_logs(&[id]).await?;
    let second = provider.get_logs(&[id]).await?;

    // Then
    assert_eq!(first.len(), 10);
    assert!(first.iter().all(|l| l.upkeep_id == id));
    assert!(second.is_empty());
    assert_eq!(provider.filter(&id).map(|f| f.last_poll_block), Some(10));
    Ok(())
}

#[tokio::test]
async fn test_should_only_return_logs_above_last_poll_block() -> eyre::Result<()> {
    // Given
    let (provider, index) = provider(LogProviderConfig::default());
    let id = upkeep(1);
    provider.register_filter(id, config(), 1).await?;
    index.add_logs((1..=5).map(|n| mined_log(CONTRACT, vec![TOPIC0], n, 0)));
    index.set_latest_block(5);
    assert_eq!(provider.get_logs(&[id]).await?.len(), 5);

    // When
    index.add_logs((6..=8).map(|n| mined_log(CONTRACT, vec![TOPIC0], n, 0)));
    index.set_latest_block(8);
    let logs = provider.get_logs(&[id]).await?;

    // Then
    let numbers: Vec<_> = logs.iter().filter_map(|l| l.log.block_number).collect();
    assert_eq!(numbers.len(), 3);
    assert!(numbers.iter().all(|n| *n > 5));
    Ok(())
}

#[tokio::test]
async fn test_should_filter_selected_topics() -> eyre::Result<()> {
    let (provider, index) = provider(LogProviderConfig::default());
    let id = upkeep(1);
    let wanted = B256::repeat_byte(7);
    let config = LogTriggerConfig { filter_selector: 0b001, topic1: wanted, ..config() };
    provider.register_filter(id, config, 1).await?;
    index.add_logs([
        mined_log(CONTRACT, vec![TOPIC0, wanted], 1, 0),
        mined_log(CONTRACT, vec![TOPIC0, B256::repeat_byte(8)], 1, 1),
        mined_log(Address::repeat_byte(1), vec![TOPIC0, wanted], 1, 2),
    ]);
    index.set_latest_block(1);

    let logs = provider.get_logs(&[id]).await?;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].log.log_index, Some(0));
    Ok(())
}

#[tokio::test]
async fn test_should_reject_invalid_and_duplicate_filters() -> eyre::Result<()> {
    let (provider, index) = provider(LogProviderConfig::default());
    let id = upkeep(1);

    let zero_address = LogTriggerConfig { contract_address: Address::ZERO, ..config() };
    assert!(matches!(
        provider.register_filter(id, zero_address, 1).await,
        Err(LogProviderError::InvalidConfig(_))
    ));
    let zero_topic = LogTriggerConfig { topic0: B256::ZERO, ..config() };
    assert!(matches!(
        provider.register_filter(id, zero_topic, 1).await,
        Err(LogProviderError::InvalidConfig(_))
    ));

    provider.register_filter(id, config(), 1).await?;
    assert!(matches!(
        provider.register_filter(id, config(), 2).await,
        Err(LogProviderError::DuplicateFilter(_))
    ));

    let filters = index.filters();
    let filter = filters.get(&filter_name(&id)).ok_or_else(|| eyre::eyre!("missing filter"))?;
    assert_eq!(filter.addresses, vec![CONTRACT]);
    assert_eq!(filter.event_sigs, vec![TOPIC0]);
    Ok(())
}

#[tokio::test]
async fn test_should_unregister_filter() -> eyre::Result<()> {
    let (provider, index) = provider(LogProviderConfig::default());
    let id = upkeep(1);
    provider.register_filter(id, config(), 1).await?;

    provider.unregister_filter(id).await?;

    assert!(!provider.has_filter(&id));
    assert!(index.filters().is_empty());
    assert!(matches!(
        provider.unregister_filter(id).await,
        Err(LogProviderError::FilterNotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_should_ignore_older_config() -> eyre::Result<()> {
    let (provider, _) = provider(LogProviderConfig::default());
    let id = upkeep(1);
    provider.register_filter(id, config(), 10).await?;

    let older = LogTriggerConfig { topic0: B256::repeat_byte(1), ..config() };
    assert!(!provider.refresh_filter(id, older, 5).await?);
    assert_eq!(provider.filter(&id).map(|f| f.config), Some(config()));

    let newer = LogTriggerConfig { topic0: B256::repeat_byte(2), ..config() };
    assert!(provider.refresh_filter(id, newer, 11).await?);
    assert_eq!(provider.filter(&id).map(|f| f.config_block), Some(11));
    Ok(())
}

#[tokio::test]
async fn test_should_truncate_logs_over_log_budget() -> eyre::Result<()> {
    // Given
    let config = LogProviderConfig {
        log_limit: LimiterConfig::new(0.0, 5),
        ..LogProviderConfig::default()
    };
    let (provider, index) = provider(config);
    let id = upkeep(1);
    provider.register_filter(id, self::config(), 1).await?;
    index.add_logs((1..=10).rev().map(|n| mined_log(CONTRACT, vec![TOPIC0], n, 0)));
    index.set_latest_block(10);

    // When
    let logs = provider.get_logs(&[id]).await?;

    // Then
    let numbers: Vec<_> = logs.iter().filter_map(|l| l.log.block_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
    assert_eq!(provider.filter(&id).map(|f| f.last_poll_block), Some(5));

    // When the budget is spent
    let logs = provider.get_logs(&[id]).await?;

    // Then the round is skipped
    assert!(logs.is_empty());
    assert_eq!(provider.filter(&id).map(|f| f.last_poll_block), Some(5));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_should_catch_up_after_falling_behind() -> eyre::Result<()> {
    // Given an upkeep polled up to block 300
    let (provider, index) = provider(LogProviderConfig::default());
    let id = upkeep(1);
    provider.register_filter(id, config(), 1).await?;
    index.set_latest_block(300);
    provider.get_logs(&[id]).await?;
    assert_eq!(provider.filter(&id).map(|f| f.last_poll_block), Some(300));

    // When the chain moves 200 blocks ahead, twice the block budget
    index.add_logs([
        mined_log(CONTRACT, vec![TOPIC0], 350, 0),
        mined_log(CONTRACT, vec![TOPIC0], 450, 0),
    ]);
    index.set_latest_block(500);
    tokio::time::advance(Duration::from_secs(2)).await;
    let logs = provider.get_logs(&[id]).await?;

    // Then only the most recent blocks within the budget are polled
    let numbers: Vec<_> = logs.iter().filter_map(|l| l.log.block_number).collect();
    assert_eq!(numbers, vec![450]);
    assert_eq!(provider.filter(&id).map(|f| f.last_poll_block), Some(500));

    // When the chain moves on
    index.add_logs([mined_log(CONTRACT, vec![TOPIC0], 510, 0)]);
    index.set_latest_block(520);
    tokio::time::advance(Duration::from_secs(1)).await;
    let logs = provider.get_logs(&[id]).await?;

    // Then the upkeep keeps up with the head
    let numbers: Vec<_> = logs.iter().filter_map(|l| l.log.block_number).collect();
    assert_eq!(numbers, vec![510]);
    assert_eq!(provider.filter(&id).map(|f| f.last_poll_block), Some(520));
    Ok(())
}

#[tokio::test]
async fn test_should_skip_upkeep_over_block_budget() -> eyre::Result<()> {
    // Given
    let config = LogProviderConfig {
        block_limit: LimiterConfig::new(0.0, 20),
        lookback_blocks: 20,
        ..LogProviderConfig::default()
    };
    let (provider, index) = provider(config);
    let id = upkeep(1);
    provider.register_filter(id, self::config(), 1).await?;
    index.set_latest_block(100);
    provider.get_logs(&[id]).await?;

    // When
    index.set_latest_block(200);
    provider.get_logs(&[id]).await?;

    // Then
    assert_eq!(provider.filter(&id).map(|f| f.last_poll_block), Some(100));
    Ok(())
}

#[tokio::test]
async fn test_should_not_advance_on_log_index_failure() -> eyre::Result<()> {
    let (provider, index) = provider(LogProviderConfig::default());
    let id = upkeep(1);
    provider.register_filter(id, config(), 1).await?;
    index.set_latest_block(10);
    provider.get_logs(&[id]).await?;

    index.set_failing(true);
    assert!(provider.get_logs(&[id]).await.is_err());
    index.set_failing(false);
    index.set_latest_block(12);
    provider.get_logs(&[id]).await?;

    assert_eq!(provider.filter(&id).map(|f| f.last_poll_block), Some(12));
    Ok(())
}

#[tokio::test]
async fn test_should_build_payloads_from_new_logs() -> eyre::Result<()> {
    // Given
    let (provider, index) = provider(LogProviderConfig::default());
    let (first, second) = (upkeep(1), upkeep(2));
    provider.register_filter(first, config(), 1).await?;
    let other = address!("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");
    provider
        .register_filter(second, LogTriggerConfig { contract_address: other, ..config() }, 1)
        .await?;
    index.add_logs([
        mined_log(CONTRACT, vec![TOPIC0], 3, 1),
        mined_log(other, vec![TOPIC0], 4, 0),
        mined_log(other, vec![TOPIC0], 4, 1),
    ]);
    index.set_latest_block(4);

    // When
    let payloads = provider.get_latest_payloads().await?;

    // Then
    assert_eq!(payloads.len(), 3);
    assert_eq!(payloads.iter().filter(|p| p.upkeep_id == second).count(), 2);
    let payload = payloads
        .iter()
        .find(|p| p.upkeep_id == first)
        .ok_or_else(|| eyre::eyre!("missing payload"))?;
    let ext = payload.trigger.log_trigger_extension.ok_or_else(|| eyre::eyre!("no log"))?;
    assert_eq!(ext.block_number, 3);
    assert_eq!(ext.log_index, 1);
    assert_eq!(payload.trigger.block_number, 3);
    Ok(())
}
