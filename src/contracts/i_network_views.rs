use ethers::prelude::abigen;

// Fee and liquidation parameters exposed by the network views contract
abigen!(
    INetworkViews,
    r#"[
        function getNetworkFee() external view returns (uint256)
        function getOperatorFee(uint64 operatorId) external view returns (uint256)
        function getLiquidationThresholdPeriod() external view returns (uint256)
    ]"#
);
