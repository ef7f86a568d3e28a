//! Balance arithmetic.
//!
//! Everything here is pure: given a transaction's kind, status and amount the
//! functions return the [`BalanceDelta`] the ledger applies to the account row.
//! Every delta keeps `total == available + locked + emergency_reserve`.

use std::ops::{Neg, Sub};

use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::{EngineError, MoneyCents, ResultEngine, TransactionKind, TransactionStatus};

/// Share of each income moved to the emergency reserve, in percent (`0..=100`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservePercentage(Decimal);

impl ReservePercentage {
    pub const DEFAULT: ReservePercentage = ReservePercentage(dec!(30));

    pub fn new(percent: Decimal) -> ResultEngine<Self> {
        if percent < Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
            return Err(EngineError::Validation(format!(
                "reserve percentage must be between 0 and 100, got {percent}"
            )));
        }
        Ok(Self(percent))
    }

    /// Builds the percentage from basis points (3000 = 30%).
    pub fn from_bps(bps: i64) -> ResultEngine<Self> {
        Self::new(Decimal::new(bps, 2))
    }

    #[must_use]
    pub fn to_bps(self) -> i64 {
        (self.0 * Decimal::ONE_HUNDRED)
            .round()
            .to_i64()
            .unwrap_or_default()
    }

    #[must_use]
    pub const fn value(self) -> Decimal {
        self.0
    }
}

impl Default for ReservePercentage {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// How an income is split between reserve and available funds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomeSplit {
    pub total_received: MoneyCents,
    pub emergency_reserve: MoneyCents,
    pub available: MoneyCents,
}

impl Sub for IncomeSplit {
    type Output = IncomeSplit;

    fn sub(self, rhs: IncomeSplit) -> Self::Output {
        IncomeSplit {
            total_received: self.total_received - rhs.total_received,
            emergency_reserve: self.emergency_reserve - rhs.emergency_reserve,
            available: self.available - rhs.available,
        }
    }
}

/// Splits `amount` using `pct`.
///
/// The reserve is rounded half away from zero to whole minor units and the
/// available part is the remainder, so the two always add up to `amount`.
#[must_use]
pub fn split_income(amount: MoneyCents, pct: ReservePercentage) -> IncomeSplit {
    let reserve = (Decimal::from(amount.cents()) * pct.value() / Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        // |reserve| <= |amount|, so the conversion cannot overflow.
        .unwrap_or(amount.cents());
    let reserve = MoneyCents::new(reserve);
    IncomeSplit {
        total_received: amount,
        emergency_reserve: reserve,
        available: amount - reserve,
    }
}

/// Signed change to the four balance fields of an account.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceDelta {
    pub total: MoneyCents,
    pub available: MoneyCents,
    pub locked: MoneyCents,
    pub emergency_reserve: MoneyCents,
}

impl BalanceDelta {
    pub const ZERO: BalanceDelta = BalanceDelta {
        total: MoneyCents::ZERO,
        available: MoneyCents::ZERO,
        locked: MoneyCents::ZERO,
        emergency_reserve: MoneyCents::ZERO,
    };

    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// `Δtotal == Δavailable + Δlocked + Δreserve`.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.total == self.available + self.locked + self.emergency_reserve
    }

    /// Amount that must be present in `available_balance` before applying.
    ///
    /// Returns `None` when the delta does not withdraw from available funds.
    #[must_use]
    pub fn required_available(&self) -> Option<MoneyCents> {
        self.available.is_negative().then(|| -self.available)
    }

    fn income(split: IncomeSplit) -> Self {
        Self {
            total: split.total_received,
            available: split.available,
            locked: MoneyCents::ZERO,
            emergency_reserve: split.emergency_reserve,
        }
    }

    fn lock(amount: MoneyCents) -> Self {
        Self {
            total: MoneyCents::ZERO,
            available: -amount,
            locked: amount,
            emergency_reserve: MoneyCents::ZERO,
        }
    }

    fn spend(amount: MoneyCents) -> Self {
        Self {
            total: -amount,
            available: -amount,
            locked: MoneyCents::ZERO,
            emergency_reserve: MoneyCents::ZERO,
        }
    }
}

impl Neg for BalanceDelta {
    type Output = BalanceDelta;

    fn neg(self) -> Self::Output {
        BalanceDelta {
            total: -self.total,
            available: -self.available,
            locked: -self.locked,
            emergency_reserve: -self.emergency_reserve,
        }
    }
}

/// Initial status and balance effect of a new transaction.
#[must_use]
pub fn creation(
    kind: TransactionKind,
    amount: MoneyCents,
    pct: ReservePercentage,
) -> (TransactionStatus, BalanceDelta) {
    match kind {
        TransactionKind::Income => (
            TransactionStatus::Executed,
            BalanceDelta::income(split_income(amount, pct)),
        ),
        TransactionKind::FixedExpense => (TransactionStatus::Locked, BalanceDelta::lock(amount)),
        TransactionKind::VariableExpense => {
            (TransactionStatus::Executed, BalanceDelta::spend(amount))
        }
    }
}

/// Paying a locked fixed expense moves the money out of `locked` and `total`.
#[must_use]
pub fn payment(amount: MoneyCents) -> BalanceDelta {
    BalanceDelta {
        total: -amount,
        available: MoneyCents::ZERO,
        locked: -amount,
        emergency_reserve: MoneyCents::ZERO,
    }
}

/// Balance effect of editing a transaction amount from `old` to `new`.
#[must_use]
pub fn amount_change(
    kind: TransactionKind,
    status: TransactionStatus,
    old: MoneyCents,
    new: MoneyCents,
    pct: ReservePercentage,
) -> BalanceDelta {
    let delta = new - old;
    match (status, kind) {
        (TransactionStatus::Locked, _) => BalanceDelta::lock(delta),
        (TransactionStatus::Executed, TransactionKind::Income) => {
            BalanceDelta::income(split_income(new, pct) - split_income(old, pct))
        }
        (
            TransactionStatus::Executed,
            TransactionKind::FixedExpense | TransactionKind::VariableExpense,
        ) => BalanceDelta::spend(delta),
        (TransactionStatus::Pending | TransactionStatus::Cancelled, _) => BalanceDelta::ZERO,
    }
}

/// Balance effect of deleting a transaction in its current status.
#[must_use]
pub fn reversal(
    kind: TransactionKind,
    status: TransactionStatus,
    amount: MoneyCents,
    pct: ReservePercentage,
) -> BalanceDelta {
    match (status, kind) {
        (TransactionStatus::Locked, _) => -BalanceDelta::lock(amount),
        (TransactionStatus::Executed, TransactionKind::Income) => {
            -BalanceDelta::income(split_income(amount, pct))
        }
        (
            TransactionStatus::Executed,
            TransactionKind::FixedExpense | TransactionKind::VariableExpense,
        ) => -BalanceDelta::spend(amount),
        (TransactionStatus::Pending | TransactionStatus::Cancelled, _) => BalanceDelta::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn cents(v: i64) -> MoneyCents {
        MoneyCents::new(v)
    }

    #[test]
    fn income_split_thirty_seventy() {
        let split = split_income(cents(1000), ReservePercentage::DEFAULT);
        assert_eq!(split.emergency_reserve, cents(300));
        assert_eq!(split.available, cents(700));
        assert_eq!(split.total_received, cents(1000));
    }

    #[test]
    fn income_split_rounds_half_away_from_zero() {
        // 30% of 5 = 1.5 -> 2
        let split = split_income(cents(5), ReservePercentage::DEFAULT);
        assert_eq!(split.emergency_reserve, cents(2));
        assert_eq!(split.available, cents(3));

        let pct = ReservePercentage::new(dec!(12.5)).unwrap();
        // 12.5% of 333 = 41.625 -> 42
        assert_eq!(split_income(cents(333), pct).emergency_reserve, cents(42));
    }

    #[test]
    fn percentage_bounds_and_bps() {
        assert!(ReservePercentage::new(dec!(-1)).is_err());
        assert!(ReservePercentage::new(dec!(100.01)).is_err());
        assert_eq!(ReservePercentage::from_bps(3000).unwrap(), ReservePercentage::DEFAULT);
        assert_eq!(ReservePercentage::new(dec!(12.5)).unwrap().to_bps(), 1250);
    }

    #[test]
    fn creation_sets_initial_status() {
        let pct = ReservePercentage::DEFAULT;
        let (status, delta) = creation(TransactionKind::FixedExpense, cents(500), pct);
        assert_eq!(status, TransactionStatus::Locked);
        assert_eq!(delta.total, MoneyCents::ZERO);
        assert_eq!(delta.available, cents(-500));
        assert_eq!(delta.locked, cents(500));

        let (status, delta) = creation(TransactionKind::VariableExpense, cents(50), pct);
        assert_eq!(status, TransactionStatus::Executed);
        assert_eq!(delta.required_available(), Some(cents(50)));

        let (status, delta) = creation(TransactionKind::Income, cents(50), pct);
        assert_eq!(status, TransactionStatus::Executed);
        assert_eq!(delta.required_available(), None);
    }

    #[test]
    fn locked_amount_change_moves_between_available_and_locked() {
        let delta = amount_change(
            TransactionKind::FixedExpense,
            TransactionStatus::Locked,
            cents(100),
            cents(150),
            ReservePercentage::DEFAULT,
        );
        assert_eq!(delta.available, cents(-50));
        assert_eq!(delta.locked, cents(50));
        assert_eq!(delta.total, MoneyCents::ZERO);
    }

    #[test]
    fn executed_income_amount_change_applies_split_difference() {
        let delta = amount_change(
            TransactionKind::Income,
            TransactionStatus::Executed,
            cents(1000),
            cents(2000),
            ReservePercentage::DEFAULT,
        );
        assert_eq!(delta.total, cents(1000));
        assert_eq!(delta.emergency_reserve, cents(300));
        assert_eq!(delta.available, cents(700));
    }

    #[test]
    fn pending_and_cancelled_have_no_effect() {
        for status in [TransactionStatus::Pending, TransactionStatus::Cancelled] {
            for kind in [
                TransactionKind::Income,
                TransactionKind::FixedExpense,
                TransactionKind::VariableExpense,
            ] {
                let pct = ReservePercentage::DEFAULT;
                assert!(amount_change(kind, status, cents(1), cents(9), pct).is_zero());
                assert!(reversal(kind, status, cents(9), pct).is_zero());
            }
        }
    }

    #[test]
    fn paid_fixed_expense_reversal_refunds_total_and_available() {
        let delta = reversal(
            TransactionKind::FixedExpense,
            TransactionStatus::Executed,
            cents(500),
            ReservePercentage::DEFAULT,
        );
        assert_eq!(delta.total, cents(500));
        assert_eq!(delta.available, cents(500));
        assert_eq!(delta.locked, MoneyCents::ZERO);
    }

    fn kind_strategy() -> impl Strategy<Value = TransactionKind> {
        prop_oneof![
            Just(TransactionKind::Income),
            Just(TransactionKind::FixedExpense),
            Just(TransactionKind::VariableExpense),
        ]
    }

    fn status_strategy() -> impl Strategy<Value = TransactionStatus> {
        prop_oneof![
            Just(TransactionStatus::Pending),
            Just(TransactionStatus::Locked),
            Just(TransactionStatus::Executed),
            Just(TransactionStatus::Cancelled),
        ]
    }

    fn pct_strategy() -> impl Strategy<Value = ReservePercentage> {
        (0i64..=10_000).prop_map(|bps| ReservePercentage::from_bps(bps).unwrap())
    }

    proptest! {
        #[test]
        fn every_delta_is_balanced(
            kind in kind_strategy(),
            status in status_strategy(),
            old in 1i64..1_000_000_000,
            new in 1i64..1_000_000_000,
            pct in pct_strategy(),
        ) {
            let (_, created) = creation(kind, cents(old), pct);
            prop_assert!(created.is_balanced());
            prop_assert!(payment(cents(old)).is_balanced());
            prop_assert!(amount_change(kind, status, cents(old), cents(new), pct).is_balanced());
            prop_assert!(reversal(kind, status, cents(old), pct).is_balanced());
        }

        #[test]
        fn reversal_undoes_creation(
            kind in kind_strategy(),
            amount in 1i64..1_000_000_000,
            pct in pct_strategy(),
        ) {
            let (status, created) = creation(kind, cents(amount), pct);
            let reversed = reversal(kind, status, cents(amount), pct);
            prop_assert_eq!(-created, reversed);
        }

        #[test]
        fn split_parts_add_up(amount in 1i64..1_000_000_000_000, pct in pct_strategy()) {
            let split = split_income(cents(amount), pct);
            prop_assert_eq!(split.emergency_reserve + split.available, cents(amount));
            prop_assert!(!split.emergency_reserve.is_negative());
            prop_assert!(!split.available.is_negative());
        }

        #[test]
        fn successive_updates_compose(
            kind in kind_strategy(),
            a in 1i64..1_000_000,
            b in 1i64..1_000_000,
            c in 1i64..1_000_000,
            pct in pct_strategy(),
        ) {
            let (status, _) = creation(kind, cents(a), pct);
            let step = |from, to| amount_change(kind, status, cents(from), cents(to), pct);
            let ab = step(a, b);
            let bc = step(b, c);
            let ac = step(a, c);
            prop_assert_eq!(ab.total + bc.total, ac.total);
            prop_assert_eq!(ab.available + bc.available, ac.available);
            prop_assert_eq!(ab.locked + bc.locked, ac.locked);
            prop_assert_eq!(ab.emergency_reserve + bc.emergency_reserve, ac.emergency_reserve);
        }
    }
}
