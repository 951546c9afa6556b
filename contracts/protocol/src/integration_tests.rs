//! Integration Tests
//!
//! End-to-end flows across the ledger, positions, liquidation and
//! settlement, driven through the deployed protocol.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ausd_book_keeper::CollateralPoolParams;
    use ausd_common::{
        constants::settlement::WEEK, AccountId, Amount, AusdError, AusdResult, PoolId, PositionId, Rate,
        Role, Value,
    };
    use ausd_liquidation_engine::{FlashLendingCall, FlashLendingCallee};
    use ausd_price_oracle::SimplePriceFeed;
    use proptest::prelude::*;

    use crate::{DeployConfig, Protocol};

    struct World {
        protocol: Protocol,
        owner: AccountId,
        faucet: AccountId,
        operator: AccountId,
        alice: AccountId,
        bob: AccountId,
        wbtc: PoolId,
        weth: PoolId,
        wbtc_feed: Arc<SimplePriceFeed>,
    }

    impl World {
        /// Mints collateral tokens to `user` and approves the pool's adapter
        fn fund(&mut self, user: AccountId, pool: PoolId, units: u64) {
            let faucet = self.faucet;
            let adapter = self.protocol.collateral(&pool).unwrap().adapter.account();
            self.protocol
                .mint_collateral(&faucet, &pool, &user, Amount::from_units(units))
                .unwrap();
            self.protocol
                .approve_collateral(&user, &pool, &adapter, Amount::from_units(units))
                .unwrap();
        }

        fn open(&mut self, user: AccountId, pool: PoolId) -> PositionId {
            self.protocol.open_position(&user, &pool, &user).unwrap()
        }

        /// Funds, opens, locks `collateral` and mints `debt` at time 1
        fn borrow(&mut self, user: AccountId, pool: PoolId, collateral: u64, debt: u64) -> PositionId {
            self.fund(user, pool, collateral);
            let id = self.open(user, pool);
            self.protocol
                .lock_and_mint(&user, id, Amount::from_units(collateral), Amount::from_units(debt), 1)
                .unwrap();
            id
        }

        fn set_feed(&mut self, price: Rate) {
            let operator = self.operator;
            self.wbtc_feed.set_price(&operator, price, true, 2).unwrap();
            let wbtc = self.wbtc;
            self.protocol.set_price(&wbtc).unwrap();
        }

        fn position(&self, id: PositionId) -> ausd_common::Position {
            self.protocol
                .position_manager()
                .position(self.protocol.book_keeper(), id)
                .unwrap()
        }

        fn sde(&self) -> AccountId {
            self.protocol.accounts().system_debt_engine
        }
    }

    fn params() -> CollateralPoolParams {
        CollateralPoolParams {
            liquidation_ratio: Rate::ONE,
            debt_floor: Value::from_units(1),
            ..Default::default()
        }
    }

    fn world() -> World {
        let owner = AccountId::from_label("owner");
        let faucet = AccountId::from_label("faucet");
        let operator = AccountId::from_label("feed-operator");

        let mut protocol = Protocol::deploy(DeployConfig::new(owner)).unwrap();
        protocol.access().grant_role(&owner, Role::Mintable, faucet).unwrap();

        let wbtc_feed = Arc::new(SimplePriceFeed::new(operator, Rate::ONE, 0).unwrap());
        let weth_feed = Arc::new(SimplePriceFeed::new(operator, Rate::ONE, 0).unwrap());
        let wbtc = protocol
            .add_collateral_pool(&owner, "WBTC", "Wrapped BTC", params(), wbtc_feed.clone(), 0)
            .unwrap();
        let weth = protocol
            .add_collateral_pool(&owner, "WETH", "Wrapped Ether", params(), weth_feed, 0)
            .unwrap();
        protocol.set_price(&wbtc).unwrap();
        protocol.set_price(&weth).unwrap();

        World {
            protocol,
            owner,
            faucet,
            operator,
            alice: AccountId::from_label("alice"),
            bob: AccountId::from_label("bob"),
            wbtc,
            weth,
            wbtc_feed,
        }
    }

    /// Issued stablecoin equals pool debt plus unbacked stablecoin
    fn assert_debt_balanced(protocol: &Protocol, pools: &[PoolId]) {
        let book_keeper = protocol.book_keeper();
        let mut backed = Value::ZERO;
        for pool_id in pools {
            let pool = book_keeper.pool_config().pool(pool_id).unwrap();
            backed = backed.checked_add(pool.total_debt_value().unwrap()).unwrap();
        }
        assert_eq!(
            book_keeper.total_stablecoin_issued(),
            backed.checked_add(book_keeper.total_unbacked_stablecoin()).unwrap()
        );
    }

    /// Collateral held by the adapter equals the ledger's locked plus free collateral
    fn assert_collateral_backed(protocol: &Protocol, pool_id: &PoolId) {
        let asset = protocol.collateral(pool_id).unwrap();
        let book_keeper = protocol.book_keeper();
        let in_ledger = book_keeper
            .total_locked_collateral(pool_id)
            .unwrap()
            .checked_add(book_keeper.total_free_collateral(pool_id).unwrap())
            .unwrap();
        assert_eq!(asset.token.balance_of(&asset.adapter.account()), in_ledger);
    }

    /// Flash callee that repays a fixed number of tokens it already holds
    struct Arbitrageur {
        account: AccountId,
        repay: Amount,
    }

    impl FlashLendingCallee for Arbitrageur {
        fn account(&self) -> AccountId {
            self.account
        }

        fn flash_lending_call(&mut self, mut call: FlashLendingCall<'_>) -> AusdResult<()> {
            call.repay(self.repay)
        }
    }

    // ============================================================================
    // Positions
    // ============================================================================

    #[test]
    fn test_open_lock_and_mint() {
        let mut w = world();
        let (alice, wbtc) = (w.alice, w.wbtc);
        let id = w.borrow(alice, wbtc, 10, 5);

        let position = w.position(id);
        assert_eq!(position.locked_collateral, Amount::from_units(10));
        assert_eq!(position.debt_share, Amount::from_units(5));
        assert_eq!(w.protocol.stablecoin().balance_of(&alice), Amount::from_units(5));
        assert!(w.protocol.collateral(&wbtc).unwrap().token.balance_of(&alice).is_zero());
        assert_eq!(w.protocol.book_keeper().total_stablecoin_issued(), Value::from_units(5));

        assert_debt_balanced(&w.protocol, &[w.wbtc, w.weth]);
        assert_collateral_backed(&w.protocol, &wbtc);
    }

    #[test]
    fn test_position_debt_ceiling_leaves_state_unchanged() {
        let mut w = world();
        let (alice, wbtc) = (w.alice, w.wbtc);
        w.fund(alice, wbtc, 2_000_000);
        let id = w.open(alice, wbtc);

        let result = w.protocol.lock_and_mint(
            &alice,
            id,
            Amount::from_units(2_000_000),
            Amount::from_units(1_000_001),
            1,
        );
        assert!(matches!(result, Err(AusdError::PositionDebtCeilingExceeded { .. })));

        // collateral deposit rolled back with the failed mint
        assert!(w.position(id).is_empty());
        let asset = w.protocol.collateral(&wbtc).unwrap();
        assert_eq!(asset.token.balance_of(&alice), Amount::from_units(2_000_000));
        assert!(asset.token.balance_of(&asset.adapter.account()).is_zero());
        assert!(w.protocol.book_keeper().total_stablecoin_issued().is_zero());
    }

    #[test]
    fn test_repay_and_unlock() {
        let mut w = world();
        let (alice, wbtc) = (w.alice, w.wbtc);
        let id = w.borrow(alice, wbtc, 10, 5);
        let adapter = w.protocol.stablecoin_adapter().account();
        w.protocol.approve_stablecoin(&alice, &adapter, Amount::from_units(5)).unwrap();

        w.protocol
            .repay_and_unlock(&alice, id, Amount::from_units(5), Amount::from_units(10), 1)
            .unwrap();

        assert!(w.position(id).is_empty());
        assert!(w.protocol.stablecoin().balance_of(&alice).is_zero());
        assert_eq!(
            w.protocol.collateral(&wbtc).unwrap().token.balance_of(&alice),
            Amount::from_units(10)
        );
        assert!(w.protocol.book_keeper().total_stablecoin_issued().is_zero());
        assert_collateral_backed(&w.protocol, &wbtc);
    }

    #[test]
    fn test_move_collateral_across_pools() {
        let mut w = world();
        let (alice, wbtc, weth) = (w.alice, w.wbtc, w.weth);
        let a = w.open(alice, wbtc);
        let b = w.open(alice, wbtc);
        let c = w.open(alice, weth);
        w.fund(alice, wbtc, 10);
        let account_a = w.protocol.position_account(a).unwrap();
        w.protocol
            .deposit_collateral(&alice, &wbtc, &account_a, Amount::from_units(10))
            .unwrap();

        let result = w.protocol.move_collateral_between(&alice, a, c, Amount::from_units(4));
        assert_eq!(result, Err(AusdError::NotSameCollateralPool { source: wbtc, destination: weth }));

        w.protocol.move_collateral_between(&alice, a, b, Amount::from_units(4)).unwrap();
        let account_b = w.protocol.position_account(b).unwrap();
        let book_keeper = w.protocol.book_keeper();
        assert_eq!(book_keeper.collateral_token(&wbtc, &account_a), Amount::from_units(6));
        assert_eq!(book_keeper.collateral_token(&wbtc, &account_b), Amount::from_units(4));
    }

    #[test]
    fn test_stability_fee_accrual() {
        let mut w = world();
        let (owner, alice, wbtc) = (w.owner, w.alice, w.wbtc);
        // ~3.2% per year
        let per_second = Rate::from_ray(1_000_000_001_000_000_000_000_000_000);
        w.protocol.set_stability_fee_rate(&owner, &wbtc, per_second, 0).unwrap();
        w.borrow(alice, wbtc, 100, 50);

        let fee = w.protocol.accrue_stability_fee(&wbtc, 1_000_001).unwrap();
        assert!(!fee.is_zero());
        assert_eq!(w.protocol.book_keeper().stablecoin(&w.sde()), fee);
        assert!(w.protocol.book_keeper().pool_config().pool(&wbtc).unwrap().debt_accumulated_rate > Rate::ONE);

        // same timestamp accrues nothing
        assert!(w.protocol.accrue_stability_fee(&wbtc, 1_000_001).unwrap().is_zero());
        assert_debt_balanced(&w.protocol, &[w.wbtc, w.weth]);
    }

    #[test]
    fn test_fee_rate_change_is_not_retroactive() {
        let per_second = Rate::from_ray(1_000_000_001_000_000_000_000_000_000);
        let faster = Rate::from_ray(1_000_000_010_000_000_000_000_000_000);
        let rate_of = |w: &World| w.protocol.book_keeper().pool_config().pool(&w.wbtc).unwrap().debt_accumulated_rate;

        let mut changed = world();
        let (owner, alice, wbtc) = (changed.owner, changed.alice, changed.wbtc);
        changed.protocol.set_stability_fee_rate(&owner, &wbtc, per_second, 0).unwrap();
        changed.borrow(alice, wbtc, 100, 50);
        changed.protocol.set_stability_fee_rate(&owner, &wbtc, faster, 1_000).unwrap();

        let mut unchanged = world();
        unchanged.protocol.set_stability_fee_rate(&owner, &wbtc, per_second, 0).unwrap();
        unchanged.borrow(alice, wbtc, 100, 50);
        unchanged.protocol.accrue_stability_fee(&wbtc, 1_000).unwrap();

        // the old rate covered everything up to the change
        assert_eq!(rate_of(&changed), rate_of(&unchanged));

        // setting the rate on the pool directly needs an accrued pool
        let result = changed.protocol.pool_config_mut().set_stability_fee_rate(&owner, &wbtc, per_second, 2_000);
        assert_eq!(result, Err(AusdError::StabilityFeeNotAccrued { pool_id: wbtc, accrued_to: 1_000, now: 2_000 }));
        assert_debt_balanced(&changed.protocol, &[changed.wbtc, changed.weth]);
    }

    // ============================================================================
    // Liquidation
    // ============================================================================

    #[test]
    fn test_keeper_liquidation() {
        let mut w = world();
        let (alice, bob, wbtc) = (w.alice, w.bob, w.wbtc);
        let id = w.borrow(alice, wbtc, 100, 60);
        w.borrow(bob, wbtc, 200, 40);
        w.set_feed(Rate::from_bps(5_000));

        let strategy = w.protocol.accounts().liquidation_strategy;
        w.protocol.approve_stablecoin(&bob, &strategy, Amount::from_units(40)).unwrap();
        let outcome = w
            .protocol
            .liquidate(&bob, id, Amount::from_units(60), Amount::from_units(100), None, b"", 2)
            .unwrap();

        // half the debt at a 5% bonus and a 0.5 price
        assert_eq!(outcome.debt_share_liquidated, Amount::from_units(30));
        assert_eq!(outcome.collateral_seized, Amount::from_units(63));
        assert_eq!(outcome.collateral_to_treasury, Amount::from_units(3));
        assert_eq!(outcome.collateral_to_liquidator, Amount::from_units(60));

        let position = w.position(id);
        assert_eq!(position.locked_collateral, Amount::from_units(37));
        assert_eq!(position.debt_share, Amount::from_units(30));

        let sde = w.sde();
        let book_keeper = w.protocol.book_keeper();
        assert_eq!(book_keeper.collateral_token(&wbtc, &bob), Amount::from_units(60));
        assert_eq!(book_keeper.collateral_token(&wbtc, &sde), Amount::from_units(3));
        assert_eq!(book_keeper.stablecoin(&sde), Value::from_units(30));
        assert_eq!(book_keeper.system_bad_debt(&sde), Value::from_units(30));
        assert_eq!(w.protocol.stablecoin().balance_of(&bob), Amount::from_units(10));

        w.protocol.settle_system_bad_debt(Value::from_units(30)).unwrap();
        assert!(w.protocol.book_keeper().system_bad_debt(&sde).is_zero());
        assert_debt_balanced(&w.protocol, &[w.wbtc, w.weth]);
        assert_collateral_backed(&w.protocol, &wbtc);
    }

    #[test]
    fn test_flash_under_repayment_reverts_liquidation() {
        let mut w = world();
        let (alice, bob, wbtc) = (w.alice, w.bob, w.wbtc);
        let id = w.borrow(alice, wbtc, 100, 60);
        w.set_feed(Rate::from_bps(5_000));

        let mut callee = Arbitrageur { account: AccountId::from_label("arbitrageur"), repay: Amount::from_units(1) };
        w.protocol.transfer_stablecoin(&alice, &callee.account, Amount::from_units(10)).unwrap();
        let before = w.position(id);
        let supply_before = w.protocol.stablecoin().total_supply();

        let result = w.protocol.liquidate(
            &bob,
            id,
            Amount::from_units(60),
            Amount::from_units(100),
            Some(&mut callee),
            b"arb",
            2,
        );
        assert!(matches!(result, Err(AusdError::InsufficientRepayment { .. })));

        assert_eq!(w.position(id), before);
        let book_keeper = w.protocol.book_keeper();
        assert!(book_keeper.collateral_token(&wbtc, &callee.account).is_zero());
        assert!(book_keeper.stablecoin(&w.sde()).is_zero());
        assert!(book_keeper.system_bad_debt(&w.sde()).is_zero());
        assert_eq!(w.protocol.stablecoin().balance_of(&callee.account), Amount::from_units(10));
        assert_eq!(w.protocol.stablecoin().total_supply(), supply_before);
    }

    #[test]
    fn test_flash_liquidation_repays_from_callee() {
        let mut w = world();
        let (alice, bob, wbtc) = (w.alice, w.bob, w.wbtc);
        let id = w.borrow(alice, wbtc, 100, 60);
        w.set_feed(Rate::from_bps(5_000));

        let mut callee = Arbitrageur { account: AccountId::from_label("arbitrageur"), repay: Amount::from_units(30) };
        w.protocol.transfer_stablecoin(&alice, &callee.account, Amount::from_units(30)).unwrap();

        let outcome = w
            .protocol
            .liquidate(&bob, id, Amount::from_units(60), Amount::from_units(100), Some(&mut callee), b"arb", 2)
            .unwrap();
        assert!(outcome.flash);
        assert_eq!(
            w.protocol.book_keeper().collateral_token(&wbtc, &callee.account),
            Amount::from_units(60)
        );
        assert!(w.protocol.stablecoin().balance_of(&callee.account).is_zero());
        assert_eq!(w.position(id).debt_share, Amount::from_units(30));
    }

    // ============================================================================
    // Settlement
    // ============================================================================

    #[test]
    fn test_global_settlement() {
        let mut w = world();
        let (owner, alice, bob, wbtc) = (w.owner, w.alice, w.bob, w.wbtc);
        let a = w.borrow(alice, wbtc, 10, 5);
        let b = w.borrow(bob, wbtc, 10, 5);

        // 1. Freeze
        w.protocol.cage(&owner, WEEK, 100).unwrap();
        assert!(!w.protocol.book_keeper().live());
        assert_eq!(w.protocol.uncage(&owner), Err(AusdError::NotLive));
        assert_eq!(w.protocol.cage_pool(&wbtc).unwrap(), Rate::ONE);

        // 2. Each position gives up collateral covering its debt
        for id in [a, b] {
            let account = w.protocol.position_account(id).unwrap();
            w.protocol.accumulate_bad_debt(&wbtc, &account).unwrap();
            let position = w.position(id);
            assert_eq!(position.locked_collateral, Amount::from_units(5));
            assert!(position.debt_share.is_zero());
        }
        assert_eq!(w.protocol.book_keeper().system_bad_debt(&w.sde()), Value::from_units(10));

        // 3. Debt and cash price
        assert_eq!(
            w.protocol.finalize_debt(100),
            Err(AusdError::CooldownNotElapsed { now: 100, available_at: 100 + WEEK })
        );
        let debt = w.protocol.finalize_debt(100 + WEEK).unwrap();
        assert_eq!(debt, Value::from_units(10));
        assert_eq!(w.protocol.finalize_cash_price(&wbtc).unwrap(), Rate::ONE);

        // 4. Holders exit
        let adapter = w.protocol.stablecoin_adapter().account();
        for (user, id) in [(alice, a), (bob, b)] {
            w.protocol.approve_stablecoin(&user, &adapter, Amount::from_units(5)).unwrap();
            w.protocol.deposit_stablecoin(&user, Amount::from_units(5)).unwrap();
            w.protocol.accumulate_stablecoin(&user, Amount::from_units(5)).unwrap();
            let collateral = w.protocol.redeem_stablecoin(&user, &wbtc, Amount::from_units(5)).unwrap();
            assert_eq!(collateral, Amount::from_units(5));

            let leftover = w.protocol.redeem_locked_collateral(&user, id, &user).unwrap();
            assert_eq!(leftover, Amount::from_units(5));
            w.protocol.withdraw_collateral(&user, &wbtc, Amount::from_units(10)).unwrap();
            assert_eq!(
                w.protocol.collateral(&wbtc).unwrap().token.balance_of(&user),
                Amount::from_units(10)
            );
        }

        // everything was paid out
        let show_stopper = w.protocol.accounts().show_stopper;
        assert!(w.protocol.book_keeper().collateral_token(&wbtc, &show_stopper).is_zero());
        assert_collateral_backed(&w.protocol, &wbtc);
    }

    #[test]
    fn test_settlement_with_undercollateralized_position() {
        let mut w = world();
        let (owner, alice, bob, wbtc) = (w.owner, w.alice, w.bob, w.wbtc);
        let a = w.borrow(alice, wbtc, 10, 8);
        let b = w.borrow(bob, wbtc, 40, 8);
        w.set_feed(Rate::from_bps(5_000));

        w.protocol.cage(&owner, WEEK, 100).unwrap();
        assert_eq!(w.protocol.cage_pool(&wbtc).unwrap(), Rate::from_units(2));
        for id in [a, b] {
            let account = w.protocol.position_account(id).unwrap();
            w.protocol.accumulate_bad_debt(&wbtc, &account).unwrap();
        }
        // alice owed 16 collateral but had 10
        assert_eq!(w.protocol.show_stopper().bad_debt_accumulator(&wbtc), Amount::from_units(6));
        assert!(w.position(a).is_empty());
        assert_eq!(w.position(b).locked_collateral, Amount::from_units(24));

        w.protocol.finalize_debt(100 + WEEK).unwrap();
        // (16 * 2 - 6) / 16
        let cash_price = w.protocol.finalize_cash_price(&wbtc).unwrap();
        assert_eq!(cash_price, Rate::from_ratio(13, 8));

        // every holder gets the same collateral per stablecoin, capped by what was seized
        let adapter = w.protocol.stablecoin_adapter().account();
        let mut paid = Amount::ZERO;
        for user in [alice, bob] {
            w.protocol.approve_stablecoin(&user, &adapter, Amount::from_units(8)).unwrap();
            w.protocol.deposit_stablecoin(&user, Amount::from_units(8)).unwrap();
            w.protocol.accumulate_stablecoin(&user, Amount::from_units(8)).unwrap();
            let collateral = w.protocol.redeem_stablecoin(&user, &wbtc, Amount::from_units(8)).unwrap();
            assert_eq!(collateral, Amount::from_units(13));
            paid = paid.checked_add(collateral).unwrap();
        }
        assert_eq!(paid, Amount::from_units(26));
        let show_stopper = w.protocol.accounts().show_stopper;
        assert!(w.protocol.book_keeper().collateral_token(&wbtc, &show_stopper).is_zero());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_settlement_pays_each_pool_from_its_own_holdings(
            wbtc_collateral in 10u64..100,
            wbtc_debt in 1u64..10,
            weth_collateral in 10u64..100,
            weth_debt in 1u64..10,
            wbtc_price_bps in 1_000u64..20_000,
        ) {
            let mut w = world();
            let (owner, alice, bob, wbtc, weth) = (w.owner, w.alice, w.bob, w.wbtc, w.weth);
            let a = w.borrow(alice, wbtc, wbtc_collateral, wbtc_debt);
            let b = w.borrow(bob, weth, weth_collateral, weth_debt);
            w.set_feed(Rate::from_bps(wbtc_price_bps));

            w.protocol.cage(&owner, WEEK, 100).unwrap();
            for (pool, id) in [(wbtc, a), (weth, b)] {
                w.protocol.cage_pool(&pool).unwrap();
                let account = w.protocol.position_account(id).unwrap();
                w.protocol.accumulate_bad_debt(&pool, &account).unwrap();
            }
            w.protocol.finalize_debt(100 + WEEK).unwrap();
            w.protocol.finalize_cash_price(&wbtc).unwrap();
            w.protocol.finalize_cash_price(&weth).unwrap();

            let show_stopper = w.protocol.accounts().show_stopper;
            let holdings = [wbtc, weth].map(|pool| w.protocol.book_keeper().collateral_token(&pool, &show_stopper));

            // both holders redeem the same deposit against both pools
            let adapter = w.protocol.stablecoin_adapter().account();
            let mut paid = [Amount::ZERO; 2];
            for (user, debt) in [(alice, wbtc_debt), (bob, weth_debt)] {
                let amount = Amount::from_units(debt);
                w.protocol.approve_stablecoin(&user, &adapter, amount).unwrap();
                w.protocol.deposit_stablecoin(&user, amount).unwrap();
                w.protocol.accumulate_stablecoin(&user, amount).unwrap();
                for (i, pool) in [wbtc, weth].iter().enumerate() {
                    let collateral = w.protocol.redeem_stablecoin(&user, pool, amount).unwrap();
                    paid[i] = paid[i].checked_add(collateral).unwrap();
                }
                let again = w.protocol.redeem_stablecoin(&user, &wbtc, amount);
                prop_assert!(
                    matches!(again, Err(AusdError::InsufficientAccumulatedStablecoin { .. })),
                    "second redemption from one pool must fail"
                );
            }

            for i in 0..2 {
                prop_assert!(paid[i] <= holdings[i]);
            }
            assert_collateral_backed(&w.protocol, &wbtc);
            assert_collateral_backed(&w.protocol, &weth);
        }
    }

    #[test]
    fn test_caged_protocol_rejects_minting_atomically() {
        let mut w = world();
        let (owner, alice, wbtc) = (w.owner, w.alice, w.wbtc);
        w.fund(alice, wbtc, 10);
        let id = w.open(alice, wbtc);
        w.protocol.cage(&owner, WEEK, 100).unwrap();

        let result = w
            .protocol
            .lock_and_mint(&alice, id, Amount::from_units(10), Amount::from_units(5), 101);
        assert_eq!(result, Err(AusdError::NotLive));
        assert_eq!(
            w.protocol.collateral(&wbtc).unwrap().token.balance_of(&alice),
            Amount::from_units(10)
        );
    }

    #[test]
    fn test_add_pool_requires_owner() {
        let mut w = world();
        let alice = w.alice;
        let feed = Arc::new(SimplePriceFeed::new(w.operator, Rate::ONE, 0).unwrap());
        let result = w.protocol.add_collateral_pool(&alice, "WSOL", "Wrapped SOL", params(), feed, 0);
        assert!(matches!(result, Err(AusdError::MissingRole { .. })));
        assert!(w.protocol.collateral(&PoolId::from_symbol("WSOL")).is_err());
    }

    // ============================================================================
    // Properties
    // ============================================================================

    #[derive(Debug, Clone)]
    enum Action {
        Borrow { user: usize, collateral: u64, debt: u64 },
        Repay { user: usize, debt: u64, collateral: u64 },
        Accrue { seconds: u64 },
    }

    fn action() -> impl Strategy<Value = Action> {
        prop_oneof![
            (0usize..3, 1u64..100, 0u64..100)
                .prop_map(|(user, collateral, debt)| Action::Borrow { user, collateral, debt }),
            (0usize..3, 0u64..50, 0u64..50).prop_map(|(user, debt, collateral)| Action::Repay { user, debt, collateral }),
            (1u64..100_000).prop_map(|seconds| Action::Accrue { seconds }),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_ledger_conservation(actions in proptest::collection::vec(action(), 1..25)) {
            let mut w = world();
            let (owner, wbtc, weth) = (w.owner, w.wbtc, w.weth);
            let per_second = Rate::from_ray(1_000_000_001_000_000_000_000_000_000);
            w.protocol.set_stability_fee_rate(&owner, &wbtc, per_second, 0).unwrap();

            let users: Vec<AccountId> = (0..3).map(|i| AccountId::from_label(&format!("user-{i}"))).collect();
            let mut ids = Vec::new();
            for user in &users {
                w.fund(*user, wbtc, 10_000);
                ids.push(w.open(*user, wbtc));
            }
            let adapter = w.protocol.stablecoin_adapter().account();
            let mut now = 1;

            for action in actions {
                let _outcome = match action {
                    Action::Borrow { user, collateral, debt } => w
                        .protocol
                        .lock_and_mint(&users[user], ids[user], Amount::from_units(collateral), Amount::from_units(debt), now)
                        .map(|_| ()),
                    Action::Repay { user, debt, collateral } => {
                        w.protocol.approve_stablecoin(&users[user], &adapter, Amount::from_units(debt + 1)).unwrap();
                        w.protocol.repay_and_unlock(
                            &users[user],
                            ids[user],
                            Amount::from_units(debt),
                            Amount::from_units(collateral),
                            now,
                        )
                    }
                    Action::Accrue { seconds } => {
                        now += seconds;
                        w.protocol.accrue_stability_fee(&wbtc, now).map(|_| ())
                    }
                };

                assert_debt_balanced(&w.protocol, &[wbtc, weth]);
                assert_collateral_backed(&w.protocol, &wbtc);

                // outstanding tokens stay backed by the adapter's ledger balance
                let tokens = w.protocol.stablecoin().total_supply().to_value().unwrap();
                prop_assert!(w.protocol.book_keeper().stablecoin(&adapter) >= tokens);

                // pool share is the sum of its positions
                let mut total_share = Amount::ZERO;
                for id in &ids {
                    total_share = total_share.checked_add(w.position(*id).debt_share).unwrap();
                }
                let pool = w.protocol.book_keeper().pool_config().pool(&wbtc).unwrap();
                prop_assert_eq!(pool.total_debt_share, total_share);
            }
        }
    }
}
