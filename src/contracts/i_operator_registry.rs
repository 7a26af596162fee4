use ethers::prelude::abigen;

abigen!(
    IOperatorRegistry,
    r#"[
        function getOperator(uint64 operatorId) external view returns (bool active, uint256 collateral, uint32 poolCount, bool resharing)
    ]"#
);
