use ethers::prelude::abigen;

abigen!(
    IPoolManager,
    r#"[
        function getPendingPoolIds() external view returns (uint32[])
        function getStakedPoolIds() external view returns (uint32[])
    ]"#
);
