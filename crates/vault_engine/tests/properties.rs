//! Randomized ledger properties

use proptest::prelude::*;
use vault_engine::*;

const USERS: [Address; 3] = [Address::repeat(1), Address::repeat(2), Address::repeat(3)];
const KEEPER: Address = Address::repeat(9);

#[derive(Debug, Clone, Copy)]
enum Op {
    Open { user: usize, col: i128, debt: i128 },
    Deposit { user: usize, amount: i128 },
    Withdraw { user: usize, amount: i128 },
    Borrow { user: usize, amount: i128 },
    Payback { user: usize, amount: i128 },
    CloseOut { user: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let user = 0..USERS.len();
    let amount = 1_000i128..20_000_000_000i128;
    prop_oneof![
        (user.clone(), amount.clone(), 0i128..8_000).prop_map(|(user, col, pct)| Op::Open {
            user,
            col,
            debt: col * pct / 10_000,
        }),
        (user.clone(), amount.clone()).prop_map(|(user, amount)| Op::Deposit { user, amount }),
        (user.clone(), amount.clone()).prop_map(|(user, amount)| Op::Withdraw { user, amount }),
        (user.clone(), amount.clone()).prop_map(|(user, amount)| Op::Borrow { user, amount }),
        (user.clone(), amount).prop_map(|(user, amount)| Op::Payback { user, amount }),
        user.prop_map(|user| Op::CloseOut { user }),
    ]
}

/// Applies ops, tracking the positions each user opened
struct Driver {
    vault: Vault,
    owned: Vec<Vec<u32>>,
}

impl Driver {
    fn new(config: VaultConfig) -> Self {
        Self {
            vault: Vault::new(config).unwrap(),
            owned: vec![Vec::new(); USERS.len()],
        }
    }

    fn apply(&mut self, op: Op, market: &Market<'_>) -> VaultResult<PositionSnapshot> {
        let pick = |owned: &Vec<Vec<u32>>, user: usize| owned[user].last().copied().unwrap_or(9_999);
        let result = match op {
            Op::Open { user, col, debt } => self.vault.operate(0, USERS[user], col, debt, market),
            Op::Deposit { user, amount } => {
                self.vault.operate(pick(&self.owned, user), USERS[user], amount, 0, market)
            }
            Op::Withdraw { user, amount } => {
                self.vault.operate(pick(&self.owned, user), USERS[user], -amount, 0, market)
            }
            Op::Borrow { user, amount } => {
                self.vault.operate(pick(&self.owned, user), USERS[user], 0, amount, market)
            }
            Op::Payback { user, amount } => {
                self.vault.operate(pick(&self.owned, user), USERS[user], 0, -amount, market)
            }
            Op::CloseOut { user } => {
                self.vault.operate(pick(&self.owned, user), USERS[user], i128::MIN, i128::MIN, market)
            }
        };
        if let (Op::Open { user, .. }, Ok(snap)) = (op, &result) {
            self.owned[user].push(snap.position_id);
        }
        result
    }
}

fn realized_totals(vault: &Vault) -> (u128, u128) {
    vault.positions().iter().fold((0u128, 0u128), |(col, debt), p| {
        let r = p.realize(vault.ticks()).unwrap();
        (col + r.collateral, debt + r.debt)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Without liquidation the ledgers add up exactly, and failed calls
    /// change nothing
    #[test]
    fn prop_operate_conserves(ops in proptest::collection::vec(op_strategy(), 1..40)) {
        let (oracle, liq) = (FixedPrice::PARITY, StaticLiquidity::default());
        let market = Market::new(&oracle, &liq);
        let mut d = Driver::new(VaultConfig::default());

        for op in ops {
            let before = d.vault.clone();
            match d.apply(op, &market) {
                Ok(_) => {}
                Err(e) => {
                    prop_assert!(!e.is_fatal(), "fatal error {:?} on {:?}", e, op);
                    prop_assert_eq!(&d.vault, &before);
                }
            }
            let (col, debt) = realized_totals(&d.vault);
            prop_assert_eq!(col, d.vault.state().total_supply);
            prop_assert_eq!(debt, d.vault.state().total_borrow);
            prop_assert!(invariants::check_invariants(&d.vault).is_ok());
        }
    }

    /// After any mix of operates and liquidations the bitmap tracks tick
    /// debt, topmost only falls under liquidation, and branches stay a chain
    #[test]
    fn prop_liquidation_keeps_ledgers_in_sync(
        ops in proptest::collection::vec(op_strategy(), 1..30),
        crash_bps in 0u128..2_500,
        requests in proptest::collection::vec((1_000u128..30_000_000_000u128, any::<bool>()), 1..6),
        budget_units in 1u32..5,
    ) {
        let (oracle, liq) = (FixedPrice::PARITY, StaticLiquidity::default());
        let market = Market::new(&oracle, &liq);
        let mut d = Driver::new(VaultConfig::default());
        for op in ops {
            let _ = d.apply(op, &market);
        }

        let crashed = FixedPrice(COL_PER_DEBT_PRECISION * 10_000 / (10_000 - crash_bps));
        let crashed_market = Market::new(&crashed, &liq);

        for (amount, absorb) in requests {
            let top_before = d.vault.topmost_tick();
            let branches_before = d.vault.state().total_branch_id;
            let mut budget = MeteredBudget::new(budget_units);
            match d.vault.liquidate(KEEPER, KEEPER, amount, 0, absorb, &crashed_market, &mut budget) {
                Ok(r) => {
                    prop_assert!(r.ticks_touched as u32 <= budget_units);
                    prop_assert!(d.vault.topmost_tick() <= top_before);
                    prop_assert!(d.vault.state().total_branch_id <= branches_before + 1);
                }
                Err(e) => prop_assert!(!e.is_fatal(), "fatal error {:?}", e),
            }
            prop_assert!(invariants::bitmap_in_sync(&d.vault));
            prop_assert!(invariants::topmost_consistent(&d.vault));
            prop_assert!(invariants::branches_acyclic(&d.vault));
            prop_assert!(invariants::conservation_ok(&d.vault));
            prop_assert!(invariants::supply_covers_positions(&d.vault));
        }

        // the vault keeps working after liquidations
        for op in [Op::Open { user: 0, col: 1_000_000_000, debt: 100_000_000 }] {
            if let Err(e) = d.apply(op, &crashed_market) {
                prop_assert!(!e.is_fatal());
            }
        }
        prop_assert!(invariants::check_invariants(&d.vault).is_ok());
    }

    /// Deposit then withdraw-all never hands back more than went in
    #[test]
    fn prop_rounding_favours_vault(
        amount in 1_000i128..1_000_000_000_000i128,
        supply_px in 1_000_000_000_000u128..3_000_000_000_000u128,
    ) {
        let oracle = FixedPrice::PARITY;
        let liq = StaticLiquidity {
            prices: ExchangePrices { supply: supply_px, borrow: EXCHANGE_PRICES_PRECISION },
            debt_liquidity: u128::MAX,
        };
        let market = Market::new(&oracle, &liq);
        let mut vault = Vault::new(VaultConfig::default()).unwrap();

        let open = match vault.operate(0, USERS[0], amount, 0, &market) {
            Ok(s) => s,
            Err(e) => {
                prop_assert_eq!(e, VaultError::AmountInsufficient);
                return Ok(());
            }
        };
        let out = vault.operate(open.position_id, USERS[0], i128::MIN, 0, &market).unwrap();
        prop_assert!(-out.col_amount <= amount);
    }

    /// Repeated deposit/withdraw and borrow/payback cycles at arbitrary
    /// exchange prices never leave a position better off, and payback never
    /// credits more raw debt than the tokens paid are worth
    #[test]
    fn prop_round_trips_never_favour_position(
        supply_px in EXCHANGE_PRICES_PRECISION..3 * EXCHANGE_PRICES_PRECISION,
        borrow_px in EXCHANGE_PRICES_PRECISION..3 * EXCHANGE_PRICES_PRECISION,
        col in 1_000_000_000i128..1_000_000_000_000i128,
        debt_pct in 0i128..40,
        cycles in proptest::collection::vec((10_000i128..1_000_000_000i128, 10_000i128..1_000_000_000i128), 1..8),
    ) {
        let oracle = FixedPrice::PARITY;
        let liq = StaticLiquidity {
            prices: ExchangePrices { supply: supply_px, borrow: borrow_px },
            debt_liquidity: u128::MAX,
        };
        let market = Market::new(&oracle, &liq);
        let mut vault = Vault::new(VaultConfig::default()).unwrap();
        let user = USERS[0];

        let id = vault.operate(0, user, col, col * debt_pct / 100, &market).unwrap().position_id;

        for (x, y) in cycles {
            // borrows stay well under the collateral factor
            let y = (y % (col / 10)).max(10_000);

            let before = vault.position(id).unwrap();
            vault.operate(id, user, x, 0, &market).unwrap();
            vault.operate(id, user, -x, 0, &market).unwrap();
            let after = vault.position(id).unwrap();
            prop_assert!(after.collateral <= before.collateral);

            let before = after;
            vault.operate(id, user, 0, y, &market).unwrap();
            let borrowed = vault.position(id).unwrap();
            let paid = vault.operate(id, user, 0, -y, &market).unwrap();
            let after = vault.position(id).unwrap();

            prop_assert_eq!(paid.debt_amount, -y);
            let credited = borrowed.net_debt() - after.net_debt();
            prop_assert!(credited * borrow_px <= y as u128 * EXCHANGE_PRICES_PRECISION);
            prop_assert!(after.net_debt() >= before.net_debt());
        }
        prop_assert!(invariants::check_invariants(&vault).is_ok());
    }
}
