//! ABI bindings for the contracts the engine talks to.
//!
//! - [`IPool`]: shape-A lending protocol (AAVE V3 and forks)
//! - [`IComet`]: shape-B lending protocol (Compound V3)
//! - [`IStateView`]: read-only pool manager state lens
//! - [`ILiquidityRouter`]: liquidity modification entry point

use alloy::sol;

// AAVE V3 Pool interface
sol! {
    /// Aave V3 Pool interface (subset for health reads and liquidation)
    #[sol(rpc)]
    interface IPool {
        event LiquidationCall(address indexed collateralAsset, address indexed debtAsset, address indexed user, uint256 debtToCover, uint256 liquidatedCollateralAmount, address liquidator, bool receiveAToken);

        function getUserAccountData(address user) external view returns (
            uint256 totalCollateralBase,
            uint256 totalDebtBase,
            uint256 availableBorrowsBase,
            uint256 currentLiquidationThreshold,
            uint256 ltv,
            uint256 healthFactor
        );

        /// Liquidate a position - direct pool call (without flash loan)
        function liquidationCall(
            address collateralAsset,
            address debtAsset,
            address user,
            uint256 debtToCover,
            bool receiveAToken
        ) external;
    }
}

// Compound V3 Comet interface
sol! {
    /// Comet interface (subset for liquidatable checks and absorption)
    #[sol(rpc)]
    interface IComet {
        event AbsorbDebt(address indexed absorber, address indexed borrower, uint256 basePaidOut, uint256 usdValue);
        event AbsorbCollateral(address indexed absorber, address indexed borrower, address indexed asset, uint256 collateralAbsorbed, uint256 usdValue);
        event BuyCollateral(address indexed buyer, address indexed asset, uint256 baseAmount, uint256 collateralAmount);

        function isLiquidatable(address account) external view returns (bool);
        function isBorrowCollateralized(address account) external view returns (bool);
        function absorb(address absorber, address[] calldata accounts) external;
        function buyCollateral(address asset, uint256 minAmount, uint256 baseAmount, address recipient) external;
    }
}

// Uniswap V4 periphery: pool state lens and liquidity router
sol! {
    #[derive(Debug)]
    struct PoolKey {
        address currency0;
        address currency1;
        uint24 fee;
        int24 tickSpacing;
        address hooks;
    }

    struct ModifyLiquidityParams {
        int24 tickLower;
        int24 tickUpper;
        int256 liquidityDelta;
        bytes32 salt;
    }

    #[sol(rpc)]
    interface IStateView {
        function getSlot0(bytes32 poolId) external view returns (
            uint160 sqrtPriceX96,
            int24 tick,
            uint24 protocolFee,
            uint24 lpFee
        );
    }

    #[sol(rpc)]
    interface ILiquidityRouter {
        /// Returns the caller's packed BalanceDelta
        function modifyLiquidity(
            PoolKey memory key,
            ModifyLiquidityParams memory params,
            bytes memory hookData
        ) external payable returns (int256 delta);
    }
}
