//! The guardian engine: entry points invoked by the trade-execution host.
//!
//! The host calls [`Engine::before_trade`] and [`Engine::after_trade`] once
//! per trade, serialized. Every mutating entry point checks the pause flag
//! first and holds the busy guard for its whole duration. State changes are
//! staged in a [`Txn`] and committed, with their events, only when the
//! invocation returns `Ok`.

use alloy::primitives::{Address, U256};
use guardian_chain::{
    position_key, BalanceDelta, LendingGateway, ModifyLiquidityParams, PoolId, PoolKey,
    PoolManager, Slot0, SwapParams,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::events::{EngineEvent, EventBus};
use crate::guard::{BusyFlag, PauseFlag};
use crate::history::{HistoryKey, TickHistory};
use crate::position::{PoolPosition, PositionRecord};
use crate::range::{
    alignment_spacing, optimal_range, rebalanced_range, should_rebalance, should_rebalance_position,
    validate_range,
};
use crate::registry::AdapterConfig;
use crate::resolver::ProtocolShape;
use crate::store::{EngineStore, Txn};
use crate::tick_math::{liquidity_for_amounts, sqrt_ratio_at_tick};
use crate::trigger::{decode_intent, LiquidationDecision, LiquidationIntent, LiquidationTrigger};
use crate::volatility::{self, DEFAULT_SCORE};

#[derive(Debug)]
pub struct Engine {
    owner: Address,
    config: EngineConfig,
    trigger: LiquidationTrigger,
    pool_manager: Arc<dyn PoolManager>,
    store: Mutex<EngineStore>,
    busy: BusyFlag,
    paused: PauseFlag,
    events: EventBus,
}

impl Engine {
    /// Create an engine administered by `owner`.
    ///
    /// `beneficiary` absorbs shape-B accounts and receives purchased
    /// collateral; in a deployment it is the engine's own address.
    pub fn new(
        owner: Address,
        beneficiary: Address,
        config: EngineConfig,
        lending: Arc<dyn LendingGateway>,
        pool_manager: Arc<dyn PoolManager>,
    ) -> Self {
        Self {
            owner,
            config,
            trigger: LiquidationTrigger::new(lending, beneficiary),
            pool_manager,
            store: Mutex::new(EngineStore::default()),
            busy: BusyFlag::default(),
            paused: PauseFlag::default(),
            events: EventBus::default(),
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    // ---- Host hooks ----

    /// Pre-trade hook. Runs the liquidation path when `hook_data` carries an
    /// intent. Always returns a zero delta.
    #[instrument(skip_all, fields(initiator = %initiator, pool = %key.id()))]
    pub async fn before_trade(
        &self,
        initiator: Address,
        key: &PoolKey,
        params: &SwapParams,
        hook_data: &[u8],
    ) -> EngineResult<BalanceDelta> {
        self.paused.ensure_running()?;
        let _busy = self.busy.enter()?;
        debug!(
            zero_for_one = params.zero_for_one,
            amount_specified = params.amount_specified,
            "Before trade"
        );

        let Some(intent) = decode_intent(hook_data)? else {
            return Ok(BalanceDelta::ZERO);
        };

        let mut txn = Txn::default();
        self.liquidate(&mut txn, initiator, &intent).await?;
        self.commit(txn);
        Ok(BalanceDelta::ZERO)
    }

    /// Post-trade hook. Records the tick and repositions the engine's
    /// liquidity when `hook_data` carries an intent, then maintains the
    /// initiator's opted-in position for this pool.
    #[instrument(skip_all, fields(initiator = %initiator, pool = %key.id()))]
    pub async fn after_trade(
        &self,
        initiator: Address,
        key: &PoolKey,
        params: &SwapParams,
        delta: BalanceDelta,
        hook_data: &[u8],
    ) -> EngineResult<BalanceDelta> {
        self.paused.ensure_running()?;
        let _busy = self.busy.enter()?;
        debug!(
            zero_for_one = params.zero_for_one,
            amount0 = delta.amount0,
            amount1 = delta.amount1,
            "After trade"
        );

        let intent = decode_intent(hook_data)?;
        let pool_id = key.id();
        let record_key = position_key(pool_id, initiator);
        let record = {
            let store = self.store.lock();
            store.positions.get(&record_key).copied()
        }
        .filter(|record| record.auto_rebalance_enabled);

        if intent.is_none() && record.is_none() {
            return Ok(BalanceDelta::ZERO);
        }

        let slot0 = self
            .pool_manager
            .get_slot0(pool_id)
            .await
            .map_err(EngineError::HostRead)?;

        let mut txn = Txn::default();
        if let Some(intent) = &intent {
            let now = self
                .pool_manager
                .block_timestamp()
                .await
                .map_err(EngineError::HostRead)?;
            self.reposition_liquidity(&mut txn, key, intent.protocol, slot0, delta, now)
                .await?;
        }
        if let Some(record) = record {
            self.maintain_position(&mut txn, key, initiator, record, slot0.tick)?;
        }

        self.commit(txn);
        Ok(BalanceDelta::ZERO)
    }

    // ---- Liquidation path ----

    async fn liquidate(
        &self,
        txn: &mut Txn,
        initiator: Address,
        intent: &LiquidationIntent,
    ) -> EngineResult<()> {
        let adapter = self.adapter(intent.protocol);
        let decision = self.trigger.decide(&adapter, intent).await;
        if !decision.liquidate {
            debug!(
                protocol = %intent.protocol,
                borrower = %intent.borrower,
                enabled = decision.enabled,
                "No liquidation"
            );
            return Ok(());
        }

        if !self.is_authorized(initiator) {
            warn!(%initiator, protocol = %intent.protocol, "Unauthorized liquidation attempt");
            return Err(EngineError::Unauthorized(initiator));
        }

        let settlement = self.trigger.dispatch(&adapter, decision.shape, intent).await?;
        txn.emit(EngineEvent::LiquidationExecuted {
            protocol_id: intent.protocol,
            liquidator: initiator,
            borrower: intent.borrower,
            collateral_asset: intent.collateralAsset,
            debt_asset: intent.debtAsset,
            debt_to_cover: intent.debtToCover,
            debt_repaid: settlement.debt_repaid,
            collateral_seized: settlement.collateral_seized,
            tx_hash: settlement.tx_hash,
        });
        Ok(())
    }

    // ---- LP optimizer path ----

    async fn reposition_liquidity(
        &self,
        txn: &mut Txn,
        key: &PoolKey,
        protocol: Address,
        slot0: Slot0,
        delta: BalanceDelta,
        now: u64,
    ) -> EngineResult<()> {
        let history_key: HistoryKey = (key.id(), protocol);
        let (adapter, current) = {
            let store = self.store.lock();
            txn.history_mut(&store, history_key).record(slot0.tick, now);
            (store.registry.get(protocol), txn.pool_position(&store, &history_key))
        };

        let optimal = optimal_range(
            slot0.tick,
            adapter.liquidation_threshold,
            self.spacing_for(key),
            &self.config.range,
        );
        if !should_rebalance(&current, optimal, slot0.tick, self.config.range.hysteresis_bps) {
            debug!(
                %protocol,
                tick = slot0.tick,
                lower = current.lower_tick,
                upper = current.upper_tick,
                "Position within tolerance"
            );
            return Ok(());
        }

        self.execute_reposition(txn, key, history_key, current, optimal, slot0, delta, now)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_reposition(
        &self,
        txn: &mut Txn,
        key: &PoolKey,
        history_key: HistoryKey,
        current: PoolPosition,
        (lower, upper): (i32, i32),
        slot0: Slot0,
        delta: BalanceDelta,
        now: u64,
    ) -> EngineResult<()> {
        validate_range(lower, upper, key.tick_spacing)?;
        let (sqrt_lower, sqrt_upper) = match (sqrt_ratio_at_tick(lower), sqrt_ratio_at_tick(upper)) {
            (Some(a), Some(b)) => (a, b),
            _ => return Err(EngineError::InvalidRange { lower, upper }),
        };
        let salt = history_key.1.into_word();

        if current.liquidity > 0 {
            let withdrawn = i128::try_from(current.liquidity).map_err(|_| {
                EngineError::LiquidityModification(anyhow::anyhow!(
                    "liquidity {} exceeds int128",
                    current.liquidity
                ))
            })?;
            self.pool_manager
                .modify_liquidity(
                    key,
                    ModifyLiquidityParams {
                        tick_lower: current.lower_tick,
                        tick_upper: current.upper_tick,
                        liquidity_delta: -withdrawn,
                        salt,
                    },
                )
                .await
                .map_err(EngineError::LiquidityModification)?;
        }

        let (amount0, amount1) = delta.absolute_amounts();
        let liquidity = liquidity_for_amounts(slot0.sqrt_price_x96, sqrt_lower, sqrt_upper, amount0, amount1)
            .min(i128::MAX as u128);

        if liquidity > 0 {
            self.pool_manager
                .modify_liquidity(
                    key,
                    ModifyLiquidityParams {
                        tick_lower: lower,
                        tick_upper: upper,
                        liquidity_delta: liquidity as i128,
                        salt,
                    },
                )
                .await
                .map_err(EngineError::LiquidityModification)?;
        }

        txn.set_pool_position(
            history_key,
            PoolPosition {
                liquidity,
                lower_tick: lower,
                upper_tick: upper,
                last_update_timestamp: now,
                fees_earned0: U256::ZERO,
                fees_earned1: U256::ZERO,
            },
        );
        txn.emit(EngineEvent::PositionRebalanced {
            pool_id: history_key.0,
            protocol_id: history_key.1,
            old_lower: current.lower_tick,
            old_upper: current.upper_tick,
            new_lower: lower,
            new_upper: upper,
            liquidity,
        });
        info!(
            protocol = %history_key.1,
            old_lower = current.lower_tick,
            old_upper = current.upper_tick,
            new_lower = lower,
            new_upper = upper,
            liquidity,
            "Liquidity repositioned"
        );
        Ok(())
    }

    /// Grid for ranges the engine picks in `key`'s pool.
    fn spacing_for(&self, key: &PoolKey) -> i32 {
        alignment_spacing(key.tick_spacing, self.config.range.tick_spacing)
    }

    // ---- User position path ----

    fn maintain_position(
        &self,
        txn: &mut Txn,
        key: &PoolKey,
        owner: Address,
        record: PositionRecord,
        tick: i32,
    ) -> EngineResult<()> {
        if !should_rebalance_position(&record, tick, self.config.positions.proximity_bps) {
            return Ok(());
        }

        let pool_id = key.id();
        let volatility = {
            let store = self.store.lock();
            pool_volatility_of(&store, txn, pool_id, key.fee, tick)
        };
        let (lower, upper) =
            rebalanced_range(tick, volatility, self.spacing_for(key), &self.config.positions)?;

        txn.set_position(
            position_key(pool_id, owner),
            PositionRecord {
                tick_lower: lower,
                tick_upper: upper,
                ..record
            },
        );
        txn.emit(EngineEvent::TickRangeUpdated {
            pool_id,
            owner,
            old_lower: record.tick_lower,
            old_upper: record.tick_upper,
            new_lower: lower,
            new_upper: upper,
        });
        info!(%owner, tick, volatility, lower, upper, "Position range updated");
        Ok(())
    }

    fn commit(&self, txn: Txn) {
        let events = {
            let mut store = self.store.lock();
            txn.commit(&mut store)
        };
        for event in events {
            self.events.publish(event);
        }
    }

    // ---- Admin surface ----

    fn ensure_owner(&self, caller: Address) -> EngineResult<()> {
        if caller != self.owner {
            return Err(EngineError::NotOwner(caller));
        }
        Ok(())
    }

    /// Register or overwrite the adapter for `protocol_id`.
    #[instrument(skip(self))]
    pub fn set_adapter(
        &self,
        caller: Address,
        protocol_id: Address,
        adapter: Address,
        enabled: bool,
        liquidation_threshold: U256,
    ) -> EngineResult<()> {
        self.paused.ensure_running()?;
        let _busy = self.busy.enter()?;
        self.ensure_owner(caller)?;

        self.store.lock().registry.set(AdapterConfig {
            protocol_id,
            adapter_address: adapter,
            enabled,
            liquidation_threshold,
        });
        info!("Adapter updated");
        self.events.publish(EngineEvent::AdapterUpdated {
            protocol_id,
            adapter,
            enabled,
            liquidation_threshold,
        });
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn set_liquidator_authorization(
        &self,
        caller: Address,
        liquidator: Address,
        authorized: bool,
    ) -> EngineResult<()> {
        self.paused.ensure_running()?;
        let _busy = self.busy.enter()?;
        self.ensure_owner(caller)?;

        {
            let mut store = self.store.lock();
            if authorized {
                store.liquidators.insert(liquidator);
            } else {
                store.liquidators.remove(&liquidator);
            }
        }
        info!("Liquidator authorization changed");
        self.events.publish(EngineEvent::LiquidatorAuthorizationChanged {
            liquidator,
            authorized,
        });
        Ok(())
    }

    pub fn pause(&self, caller: Address) -> EngineResult<()> {
        self.ensure_owner(caller)?;
        self.paused.set(true);
        warn!(%caller, "Engine paused");
        self.events.publish(EngineEvent::Paused { account: caller });
        Ok(())
    }

    pub fn unpause(&self, caller: Address) -> EngineResult<()> {
        self.ensure_owner(caller)?;
        self.paused.set(false);
        info!(%caller, "Engine unpaused");
        self.events.publish(EngineEvent::Unpaused { account: caller });
        Ok(())
    }

    // ---- User surface ----

    /// Opt the caller's position in `key` into automatic rebalancing.
    #[instrument(skip(self, key), fields(pool = %key.id()))]
    pub fn enable_auto_rebalance(
        &self,
        caller: Address,
        key: &PoolKey,
        tick_lower: i32,
        tick_upper: i32,
        liquidity: u128,
    ) -> EngineResult<()> {
        self.paused.ensure_running()?;
        let _busy = self.busy.enter()?;
        if liquidity > 0 {
            validate_range(tick_lower, tick_upper, key.tick_spacing)?;
        }

        let pool_id = key.id();
        self.store.lock().positions.insert(
            position_key(pool_id, caller),
            PositionRecord {
                owner: caller,
                tick_lower,
                tick_upper,
                liquidity,
                auto_rebalance_enabled: true,
            },
        );
        info!("Auto-rebalance enabled");
        self.events.publish(EngineEvent::AutoRebalanceEnabled {
            pool_id,
            owner: caller,
            tick_lower,
            tick_upper,
            liquidity,
        });
        Ok(())
    }

    /// Stop rebalancing the caller's position. The record is kept.
    #[instrument(skip(self, key), fields(pool = %key.id()))]
    pub fn disable_auto_rebalance(&self, caller: Address, key: &PoolKey) -> EngineResult<()> {
        self.paused.ensure_running()?;
        let _busy = self.busy.enter()?;

        let pool_id = key.id();
        if let Some(record) = self
            .store
            .lock()
            .positions
            .get_mut(&position_key(pool_id, caller))
        {
            record.auto_rebalance_enabled = false;
        }
        info!("Auto-rebalance disabled");
        self.events.publish(EngineEvent::AutoRebalanceDisabled {
            pool_id,
            owner: caller,
        });
        Ok(())
    }

    // ---- Read surface ----

    pub fn adapter(&self, protocol_id: Address) -> AdapterConfig {
        self.store.lock().registry.get(protocol_id)
    }

    pub fn is_authorized(&self, liquidator: Address) -> bool {
        self.store.lock().liquidators.contains(&liquidator)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.is_paused()
    }

    pub fn position(&self, key: &PoolKey, owner: Address) -> Option<PositionRecord> {
        self.store
            .lock()
            .positions
            .get(&position_key(key.id(), owner))
            .copied()
    }

    pub fn pool_position(&self, pool_id: PoolId, protocol_id: Address) -> Option<PoolPosition> {
        self.store
            .lock()
            .pool_positions
            .get(&(pool_id, protocol_id))
            .copied()
    }

    pub fn tick_history(&self, pool_id: PoolId, protocol_id: Address) -> Option<TickHistory> {
        self.store
            .lock()
            .histories
            .get(&(pool_id, protocol_id))
            .cloned()
    }

    /// Volatility score of one (pool, protocol) history.
    pub fn volatility(&self, pool_id: PoolId, protocol_id: Address) -> u8 {
        self.store
            .lock()
            .histories
            .get(&(pool_id, protocol_id))
            .map(|history| history.volatility_score())
            .unwrap_or(DEFAULT_SCORE)
    }

    /// Pool-level volatility across all protocols tracking `key`.
    pub fn pool_volatility(&self, key: &PoolKey, tick: i32) -> u8 {
        let store = self.store.lock();
        pool_volatility_of(&store, &Txn::default(), key.id(), key.fee, tick)
    }

    /// Cached shape of an adapter address, if it has been classified.
    pub fn protocol_shape(&self, adapter: Address) -> Option<ProtocolShape> {
        self.trigger.evaluator().resolver().cached(adapter)
    }

    /// Evaluate an intent without dispatching. Not gated by authorization
    /// or pause.
    pub async fn would_liquidate(&self, intent: &LiquidationIntent) -> LiquidationDecision {
        let adapter = self.adapter(intent.protocol);
        self.trigger.decide(&adapter, intent).await
    }
}

fn pool_volatility_of(store: &EngineStore, txn: &Txn, pool_id: PoolId, fee: u32, tick: i32) -> u8 {
    let protocols = txn.pool_protocols(store, &pool_id);
    let histories = protocols
        .iter()
        .filter_map(|protocol| txn.history(store, &(pool_id, *protocol)));
    volatility::pool_volatility(histories, fee, tick)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCall, MockLending, MockPoolManager, MockShape};
    use crate::u256_math::{bps_to_wad, WAD};
    use alloy::sol_types::SolValue;
    use async_trait::async_trait;
    use guardian_chain::{
        AccountData, CollateralFlagLending, HealthFactorLending, LiquidationCallParams, Settlement,
    };
    use std::sync::{OnceLock, Weak};
    use tokio::sync::broadcast::error::TryRecvError;

    const OWNER: Address = Address::repeat_byte(0x0f);
    const ENGINE: Address = Address::repeat_byte(0xee);
    const LIQUIDATOR: Address = Address::repeat_byte(0x1a);
    const USER: Address = Address::repeat_byte(0x05);
    const PROTOCOL: Address = Address::repeat_byte(0x01);
    const ADAPTER: Address = Address::repeat_byte(0x0a);
    const BORROWER: Address = Address::repeat_byte(0xb0);

    struct Harness {
        engine: Arc<Engine>,
        lending: Arc<MockLending>,
        pools: Arc<MockPoolManager>,
    }

    fn harness(shape: MockShape) -> Harness {
        let lending = Arc::new(MockLending::new().with_adapter(ADAPTER, shape));
        let pools = Arc::new(MockPoolManager::new());
        let engine = Arc::new(Engine::new(
            OWNER,
            ENGINE,
            EngineConfig::default(),
            lending.clone(),
            pools.clone(),
        ));
        engine
            .set_adapter(OWNER, PROTOCOL, ADAPTER, true, WAD)
            .unwrap();
        engine
            .set_liquidator_authorization(OWNER, LIQUIDATOR, true)
            .unwrap();
        Harness {
            engine,
            lending,
            pools,
        }
    }

    fn pool_key() -> PoolKey {
        PoolKey {
            currency0: Address::repeat_byte(0xc0),
            currency1: Address::repeat_byte(0xd0),
            fee: 3000,
            tick_spacing: 60,
            hooks: ENGINE,
        }
    }

    fn intent() -> LiquidationIntent {
        LiquidationIntent {
            protocol: PROTOCOL,
            borrower: BORROWER,
            collateralAsset: Address::repeat_byte(0xc0),
            debtAsset: Address::repeat_byte(0xd0),
            debtToCover: U256::from(1_000u64),
            receiveAToken: false,
        }
    }

    fn trade_delta() -> BalanceDelta {
        BalanceDelta::new(-1_000_000_000_000, 1_000_000_000_000)
    }

    fn drain(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return events,
                Err(TryRecvError::Lagged(_)) => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_liquidation_reports_settled_amounts() {
        let h = harness(MockShape::HealthFactor);
        h.lending.set_health_factor(BORROWER, bps_to_wad(9_000));
        let mut rx = h.engine.subscribe();

        let delta = h
            .engine
            .before_trade(LIQUIDATOR, &pool_key(), &SwapParams::default(), &intent().abi_encode())
            .await
            .unwrap();
        assert_eq!(delta, BalanceDelta::ZERO);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            EngineEvent::LiquidationExecuted {
                liquidator,
                debt_repaid,
                collateral_seized,
                ..
            } => {
                assert_eq!(*liquidator, LIQUIDATOR);
                assert_eq!(*debt_repaid, U256::from(1_000u64));
                assert_eq!(*collateral_seized, U256::from(1_050u64));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_intent_is_a_no_op() {
        let h = harness(MockShape::HealthFactor);
        h.engine
            .before_trade(LIQUIDATOR, &pool_key(), &SwapParams::default(), &[])
            .await
            .unwrap();
        assert_eq!(h.lending.probe_count(ADAPTER), 0);
    }

    #[tokio::test]
    async fn test_disabled_adapter_never_dispatches() {
        let h = harness(MockShape::HealthFactor);
        h.engine
            .set_adapter(OWNER, PROTOCOL, ADAPTER, false, WAD)
            .unwrap();
        h.lending.set_health_factor(BORROWER, U256::ZERO);

        h.engine
            .before_trade(LIQUIDATOR, &pool_key(), &SwapParams::default(), &intent().abi_encode())
            .await
            .unwrap();
        assert!(h.lending.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unauthorized_liquidator_is_rejected() {
        let h = harness(MockShape::HealthFactor);
        h.lending.set_health_factor(BORROWER, U256::ZERO);
        let mut rx = h.engine.subscribe();
        let stranger = Address::repeat_byte(0x99);

        let result = h
            .engine
            .before_trade(stranger, &pool_key(), &SwapParams::default(), &intent().abi_encode())
            .await;
        assert!(matches!(result, Err(EngineError::Unauthorized(who)) if who == stranger));
        assert!(h.lending.calls().is_empty());
        assert!(drain(&mut rx).is_empty());

        // The read-only query is still open to anyone
        assert!(h.engine.would_liquidate(&intent()).await.liquidate);
    }

    #[tokio::test]
    async fn test_shape_b_liquidation_absorbs_and_buys() {
        let h = harness(MockShape::CollateralFlag);
        h.lending.set_flags(BORROWER, true, true);
        let mut rx = h.engine.subscribe();

        let decision = h.engine.would_liquidate(&intent()).await;
        assert_eq!(decision.shape, ProtocolShape::CollateralFlag);
        assert_eq!(decision.health_metric, Some(crate::health::LIQUIDATABLE_SENTINEL));

        h.engine
            .before_trade(LIQUIDATOR, &pool_key(), &SwapParams::default(), &intent().abi_encode())
            .await
            .unwrap();
        let calls = h.lending.calls();
        assert!(matches!(calls[0], MockCall::Absorb { .. }));
        assert!(matches!(calls[1], MockCall::BuyCollateral { .. }));

        match drain(&mut rx).as_slice() {
            [EngineEvent::LiquidationExecuted {
                debt_repaid,
                collateral_seized,
                ..
            }] => {
                assert_eq!(*debt_repaid, U256::from(500u64));
                assert_eq!(*collateral_seized, U256::from(1_000u64));
            }
            other => panic!("unexpected events {other:?}"),
        }
        assert_eq!(h.engine.protocol_shape(ADAPTER), Some(ProtocolShape::CollateralFlag));
    }

    #[tokio::test]
    async fn test_dispatch_failure_fails_invocation() {
        let h = harness(MockShape::HealthFactor);
        h.lending.set_health_factor(BORROWER, U256::ZERO);
        h.lending.fail_writes(true);
        let mut rx = h.engine.subscribe();

        let result = h
            .engine
            .before_trade(LIQUIDATOR, &pool_key(), &SwapParams::default(), &intent().abi_encode())
            .await;
        assert!(matches!(result, Err(EngineError::Dispatch { .. })));
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_malformed_intent_is_rejected() {
        let h = harness(MockShape::HealthFactor);
        let result = h
            .engine
            .before_trade(LIQUIDATOR, &pool_key(), &SwapParams::default(), &[1, 2, 3])
            .await;
        assert!(matches!(result, Err(EngineError::InvalidIntent(_))));
    }

    #[tokio::test]
    async fn test_paused_engine_rejects_mutations() {
        let h = harness(MockShape::HealthFactor);
        h.lending.set_health_factor(BORROWER, U256::ZERO);
        h.engine.pause(OWNER).unwrap();
        let key = pool_key();
        let data = intent().abi_encode();

        assert!(matches!(
            h.engine.before_trade(LIQUIDATOR, &key, &SwapParams::default(), &data).await,
            Err(EngineError::Paused)
        ));
        assert!(matches!(
            h.engine
                .after_trade(LIQUIDATOR, &key, &SwapParams::default(), trade_delta(), &data)
                .await,
            Err(EngineError::Paused)
        ));
        assert!(matches!(
            h.engine.set_adapter(OWNER, PROTOCOL, ADAPTER, false, WAD),
            Err(EngineError::Paused)
        ));
        assert!(matches!(
            h.engine.set_liquidator_authorization(OWNER, USER, true),
            Err(EngineError::Paused)
        ));
        assert!(matches!(
            h.engine.enable_auto_rebalance(USER, &key, -600, 600, 1),
            Err(EngineError::Paused)
        ));
        assert!(matches!(
            h.engine.disable_auto_rebalance(USER, &key),
            Err(EngineError::Paused)
        ));

        // Nothing reached the collaborators or the store
        assert_eq!(h.lending.probe_count(ADAPTER), 0);
        assert!(h.lending.calls().is_empty());
        assert!(h.pools.modifications().is_empty());
        assert!(h.engine.adapter(PROTOCOL).enabled);
        assert!(h.engine.tick_history(key.id(), PROTOCOL).is_none());
        assert!(h.engine.position(&key, USER).is_none());

        // Reads keep working
        assert!(h.engine.is_paused());
        assert!(h.engine.is_authorized(LIQUIDATOR));
        assert!(h.engine.would_liquidate(&intent()).await.liquidate);

        h.engine.unpause(OWNER).unwrap();
        assert!(h
            .engine
            .before_trade(LIQUIDATOR, &key, &SwapParams::default(), &data)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_admin_surface_is_owner_gated() {
        let h = harness(MockShape::HealthFactor);
        assert!(matches!(
            h.engine.set_adapter(USER, PROTOCOL, ADAPTER, false, WAD),
            Err(EngineError::NotOwner(who)) if who == USER
        ));
        assert!(matches!(
            h.engine.set_liquidator_authorization(USER, USER, true),
            Err(EngineError::NotOwner(_))
        ));
        assert!(matches!(h.engine.pause(USER), Err(EngineError::NotOwner(_))));
        assert!(!h.engine.is_paused());

        h.engine
            .set_liquidator_authorization(OWNER, LIQUIDATOR, false)
            .unwrap();
        assert!(!h.engine.is_authorized(LIQUIDATOR));
    }

    #[tokio::test]
    async fn test_after_trade_tracks_and_repositions() {
        let h = harness(MockShape::HealthFactor);
        let key = pool_key();
        let data = intent().abi_encode();
        let mut rx = h.engine.subscribe();
        h.pools.set_timestamp(1_000);

        h.engine
            .after_trade(USER, &key, &SwapParams::default(), trade_delta(), &data)
            .await
            .unwrap();
        let position = h.engine.pool_position(key.id(), PROTOCOL).unwrap();
        assert_eq!((position.lower_tick, position.upper_tick), (-2040, 1500));
        assert!(position.liquidity > 0);
        assert_eq!(position.last_update_timestamp, 1_000);
        assert_eq!(position.fees_earned0, U256::ZERO);
        assert_eq!(h.pools.modifications().len(), 1);
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [EngineEvent::PositionRebalanced { new_lower: -2040, new_upper: 1500, .. }]
        ));

        // Same tick: within tolerance, only the history grows
        h.engine
            .after_trade(USER, &key, &SwapParams::default(), trade_delta(), &data)
            .await
            .unwrap();
        assert_eq!(h.pools.modifications().len(), 1);
        assert_eq!(h.engine.tick_history(key.id(), PROTOCOL).unwrap().len(), 2);

        // Price leaves the range: withdraw, then deposit at the new range
        h.pools.set_tick(key.id(), 3_000);
        h.engine
            .after_trade(USER, &key, &SwapParams::default(), trade_delta(), &data)
            .await
            .unwrap();
        let modifications = h.pools.modifications();
        assert_eq!(modifications.len(), 3);
        assert_eq!(modifications[1].liquidity_delta, -(position.liquidity as i128));
        assert_eq!((modifications[1].tick_lower, modifications[1].tick_upper), (-2040, 1500));
        assert!(modifications[2].liquidity_delta > 0);
        assert_eq!(modifications[2].salt, PROTOCOL.into_word());

        let moved = h.engine.pool_position(key.id(), PROTOCOL).unwrap();
        assert_eq!((moved.lower_tick, moved.upper_tick), (960, 4500));
    }

    #[tokio::test]
    async fn test_failed_reposition_commits_nothing() {
        let h = harness(MockShape::HealthFactor);
        let key = pool_key();
        h.pools.fail_modify(true);
        let mut rx = h.engine.subscribe();

        let result = h
            .engine
            .after_trade(USER, &key, &SwapParams::default(), trade_delta(), &intent().abi_encode())
            .await;
        assert!(matches!(result, Err(EngineError::LiquidityModification(_))));
        assert!(h.engine.tick_history(key.id(), PROTOCOL).is_none());
        assert!(h.engine.pool_position(key.id(), PROTOCOL).is_none());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_out_of_bounds_reposition_commits_nothing() {
        let h = harness(MockShape::HealthFactor);
        let key = pool_key();
        let data = intent().abi_encode();
        h.engine
            .after_trade(USER, &key, &SwapParams::default(), trade_delta(), &data)
            .await
            .unwrap();
        h.engine
            .enable_auto_rebalance(USER, &key, -600, 600, 1_000)
            .unwrap();
        let before = h.engine.pool_position(key.id(), PROTOCOL).unwrap();
        let mut rx = h.engine.subscribe();

        // Target lower bound falls below the lowest usable tick
        h.pools.set_tick(key.id(), -886_900);
        let result = h
            .engine
            .after_trade(USER, &key, &SwapParams::default(), trade_delta(), &data)
            .await;
        assert!(matches!(result, Err(EngineError::InvalidRange { .. })));

        assert_eq!(h.pools.modifications().len(), 1);
        assert_eq!(h.engine.pool_position(key.id(), PROTOCOL).unwrap(), before);
        assert_eq!(h.engine.tick_history(key.id(), PROTOCOL).unwrap().len(), 1);
        let record = h.engine.position(&key, USER).unwrap();
        assert_eq!((record.tick_lower, record.tick_upper), (-600, 600));
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_ranges_align_to_pool_spacing() {
        let h = harness(MockShape::HealthFactor);
        let key = PoolKey {
            tick_spacing: 200,
            ..pool_key()
        };

        h.engine
            .after_trade(USER, &key, &SwapParams::default(), trade_delta(), &intent().abi_encode())
            .await
            .unwrap();
        let modifications = h.pools.modifications();
        assert_eq!(modifications.len(), 1);
        assert_eq!(modifications[0].tick_lower.rem_euclid(200), 0);
        assert_eq!(modifications[0].tick_upper.rem_euclid(200), 0);
        let position = h.engine.pool_position(key.id(), PROTOCOL).unwrap();
        assert_eq!((position.lower_tick, position.upper_tick), (-2400, 1200));

        h.engine
            .enable_auto_rebalance(USER, &key, -600, 600, 1_000)
            .unwrap();
        h.pools.set_tick(key.id(), 1_180);
        h.engine
            .after_trade(USER, &key, &SwapParams::default(), trade_delta(), &[])
            .await
            .unwrap();
        let record = h.engine.position(&key, USER).unwrap();
        assert_ne!((record.tick_lower, record.tick_upper), (-600, 600));
        assert_eq!(record.tick_lower.rem_euclid(200), 0);
        assert_eq!(record.tick_upper.rem_euclid(200), 0);
        assert!(record.contains(1_180));
    }

    #[tokio::test]
    async fn test_enable_rejects_off_grid_range() {
        let h = harness(MockShape::HealthFactor);
        let key = PoolKey {
            tick_spacing: 200,
            ..pool_key()
        };
        let result = h.engine.enable_auto_rebalance(USER, &key, -600, 660, 1);
        assert!(matches!(result, Err(EngineError::InvalidRange { lower: -600, upper: 660 })));
        assert!(h.engine.position(&key, USER).is_none());
    }

    #[tokio::test]
    async fn test_host_read_failure_surfaces() {
        let h = harness(MockShape::HealthFactor);
        h.pools.fail_reads(true);
        let result = h
            .engine
            .after_trade(USER, &pool_key(), &SwapParams::default(), trade_delta(), &intent().abi_encode())
            .await;
        assert!(matches!(result, Err(EngineError::HostRead(_))));
    }

    #[tokio::test]
    async fn test_oscillating_ticks_score() {
        let h = harness(MockShape::HealthFactor);
        let key = pool_key();
        let data = intent().abi_encode();

        for i in 0..10 {
            h.pools.set_tick(key.id(), if i % 2 == 0 { 0 } else { 100 });
            h.pools.set_timestamp(i);
            h.engine
                .after_trade(USER, &key, &SwapParams::default(), trade_delta(), &data)
                .await
                .unwrap();
        }

        let history = h.engine.tick_history(key.id(), PROTOCOL).unwrap();
        assert_eq!(history.len(), 10);
        assert_eq!(history.average_tick_movement(), 100);
        assert_eq!(history.last_update_timestamp(), 9);
        assert_eq!(h.engine.volatility(key.id(), PROTOCOL), 49);
        assert_eq!(h.engine.pool_volatility(&key, 0), 49);
    }

    #[tokio::test]
    async fn test_volatility_defaults() {
        let h = harness(MockShape::HealthFactor);
        let key = pool_key();
        assert_eq!(h.engine.volatility(key.id(), PROTOCOL), DEFAULT_SCORE);
        // No history anywhere: fee tier 3000 with a large tick
        assert_eq!(h.engine.pool_volatility(&key, 150_000), 55);
    }

    #[tokio::test]
    async fn test_auto_rebalance_recenters_position() {
        let h = harness(MockShape::HealthFactor);
        let key = pool_key();
        h.engine
            .enable_auto_rebalance(USER, &key, -600, 600, 1_000)
            .unwrap();
        let mut rx = h.engine.subscribe();

        // 20 ticks from the upper bound, inside the 120-tick margin
        h.pools.set_tick(key.id(), 580);
        h.engine
            .after_trade(USER, &key, &SwapParams::default(), trade_delta(), &[])
            .await
            .unwrap();

        // Fee tier fallback 50 -> half width 1100 -> 1080, centered on 540
        let record = h.engine.position(&key, USER).unwrap();
        assert_eq!((record.tick_lower, record.tick_upper), (-540, 1620));
        assert_eq!(record.liquidity, 1_000);
        assert!(record.auto_rebalance_enabled);
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [EngineEvent::TickRangeUpdated { old_lower: -600, old_upper: 600, .. }]
        ));
        assert!(h.pools.modifications().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_position_is_left_alone() {
        let h = harness(MockShape::HealthFactor);
        let key = pool_key();
        h.engine
            .enable_auto_rebalance(USER, &key, -600, 600, 1_000)
            .unwrap();
        h.engine.disable_auto_rebalance(USER, &key).unwrap();

        h.pools.set_tick(key.id(), 5_000);
        h.engine
            .after_trade(USER, &key, &SwapParams::default(), trade_delta(), &[])
            .await
            .unwrap();
        let record = h.engine.position(&key, USER).unwrap();
        assert_eq!((record.tick_lower, record.tick_upper), (-600, 600));
        assert!(!record.auto_rebalance_enabled);
    }

    #[tokio::test]
    async fn test_enable_rejects_inverted_range() {
        let h = harness(MockShape::HealthFactor);
        let result = h.engine.enable_auto_rebalance(USER, &pool_key(), 600, -600, 1);
        assert!(matches!(result, Err(EngineError::InvalidRange { .. })));
        assert!(h.engine.position(&pool_key(), USER).is_none());
    }

    /// Lending gateway that trades back into the engine while liquidating.
    #[derive(Debug, Default)]
    struct ReentrantLending {
        inner: MockLending,
        engine: OnceLock<Weak<Engine>>,
        nested_rejected: parking_lot::Mutex<Option<bool>>,
    }

    #[async_trait]
    impl HealthFactorLending for ReentrantLending {
        async fn get_user_account_data(&self, adapter: Address, user: Address) -> anyhow::Result<AccountData> {
            self.inner.get_user_account_data(adapter, user).await
        }

        async fn liquidation_call(
            &self,
            adapter: Address,
            params: &LiquidationCallParams,
        ) -> anyhow::Result<Settlement> {
            if let Some(engine) = self.engine.get().and_then(Weak::upgrade) {
                let nested = engine
                    .before_trade(LIQUIDATOR, &pool_key(), &SwapParams::default(), &[])
                    .await;
                *self.nested_rejected.lock() = Some(matches!(nested, Err(EngineError::Reentrancy)));
            }
            self.inner.liquidation_call(adapter, params).await
        }
    }

    #[async_trait]
    impl CollateralFlagLending for ReentrantLending {
        async fn is_liquidatable(&self, adapter: Address, account: Address) -> anyhow::Result<bool> {
            self.inner.is_liquidatable(adapter, account).await
        }

        async fn is_borrow_collateralized(&self, adapter: Address, account: Address) -> anyhow::Result<bool> {
            self.inner.is_borrow_collateralized(adapter, account).await
        }

        async fn absorb(
            &self,
            adapter: Address,
            absorber: Address,
            accounts: &[Address],
        ) -> anyhow::Result<Settlement> {
            self.inner.absorb(adapter, absorber, accounts).await
        }

        async fn buy_collateral(
            &self,
            adapter: Address,
            asset: Address,
            min_amount: U256,
            base_amount: U256,
            recipient: Address,
        ) -> anyhow::Result<Settlement> {
            self.inner
                .buy_collateral(adapter, asset, min_amount, base_amount, recipient)
                .await
        }
    }

    #[tokio::test]
    async fn test_nested_entry_is_rejected() {
        let lending = Arc::new(ReentrantLending {
            inner: MockLending::new().with_adapter(ADAPTER, MockShape::HealthFactor),
            ..Default::default()
        });
        lending.inner.set_health_factor(BORROWER, U256::ZERO);
        let engine = Arc::new(Engine::new(
            OWNER,
            ENGINE,
            EngineConfig::default(),
            lending.clone(),
            Arc::new(MockPoolManager::new()),
        ));
        let _ = lending.engine.set(Arc::downgrade(&engine));
        engine.set_adapter(OWNER, PROTOCOL, ADAPTER, true, WAD).unwrap();
        engine
            .set_liquidator_authorization(OWNER, LIQUIDATOR, true)
            .unwrap();

        engine
            .before_trade(LIQUIDATOR, &pool_key(), &SwapParams::default(), &intent().abi_encode())
            .await
            .unwrap();
        assert_eq!(*lending.nested_rejected.lock(), Some(true));

        // The guard was released on exit
        assert!(engine
            .before_trade(LIQUIDATOR, &pool_key(), &SwapParams::default(), &[])
            .await
            .is_ok());
    }
}
