use alloy_sol_types::sol;

sol! {
    /// The view functions of the automation registry used by the node.
    #[derive(Debug)]
    interface IAutomationRegistry {
        function checkUpkeep(uint256 id, bytes triggerData) external view returns (
            bool upkeepNeeded,
            bytes performData,
            uint8 upkeepFailureReason,
            uint256 gasUsed,
            uint256 gasLimit,
            uint256 fastGasWei,
            uint256 linkNative
        );

        function checkUpkeep(uint256 id) external view returns (
            bool upkeepNeeded,
            bytes performData,
            uint8 upkeepFailureReason,
            uint256 gasUsed,
            uint256 gasLimit,
            uint256 fastGasWei,
            uint256 linkNative
        );

        function simulatePerformUpkeep(uint256 id, bytes performData) external view returns (
            bool success,
            uint256 gasUsed
        );

        function getActiveUpkeepIDs(uint256 startIndex, uint256 maxCount) external view returns (
            uint256[] memory
        );

        function executeCallback(uint256 id, bytes payload) external returns (
            bool upkeepNeeded,
            bytes performData,
            uint8 upkeepFailureReason,
            uint256 gasUsed
        );

        function getUpkeepTriggerConfig(uint256 upkeepId) external view returns (bytes memory);

        function getUpkeepPrivilegeConfig(uint256 upkeepId) external view returns (bytes memory);
    }

    #[derive(Debug)]
    function checkCallback(uint256 id, bytes[] values, bytes extraData) external view returns (
        bool upkeepNeeded,
        bytes performData,
        uint8 upkeepFailureReason,
        uint256 gasUsed
    );

    /// The handler of an upkeep called when its off chain data cannot be fetched.
    #[derive(Debug)]
    function checkErrorHandler(uint256 errCode, bytes extraData) external view returns (
        bool upkeepNeeded,
        bytes performData
    );

    /// The revert raised by an upkeep requesting off chain data.
    #[derive(Debug, PartialEq, Eq)]
    error StreamsLookup(
        string feedParamKey,
        string[] feeds,
        string timeParamKey,
        uint256 time,
        bytes extraData
    );
}

