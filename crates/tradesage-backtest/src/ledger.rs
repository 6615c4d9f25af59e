use rust_decimal::Decimal;
use tradesage_models::decision::{Decision, TradeAction};
use tradesage_models::ledger::LedgerState;

/// Outcome of applying one decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fill {
    pub state: LedgerState,
    /// Asset units actually traded after clamping.
    pub filled_amount: Decimal,
    /// Quote currency spent (buy) or received (sell).
    pub cost: Decimal,
}

impl Fill {
    fn none(state: LedgerState) -> Self {
        Self {
            state,
            filled_amount: Decimal::ZERO,
            cost: Decimal::ZERO,
        }
    }
}

/// Pure bookkeeping over `LedgerState`.
///
/// Oversized orders are clamped, never rejected: a buy spends at most the
/// available cash and a sell gives up at most the holding, so neither field
/// can go negative. A buy whose notional overflows is clamped like any
/// other oversized buy; a sell whose proceeds cannot be represented is
/// skipped.
pub struct Ledger;

impl Ledger {
    pub fn execute(state: &LedgerState, decision: &Decision, price: Decimal) -> Fill {
        let amount = decision.amount;
        if price <= Decimal::ZERO || amount <= Decimal::ZERO {
            return Fill::none(*state);
        }

        match decision.action {
            TradeAction::Hold => Fill::none(*state),
            TradeAction::Buy => {
                if state.cash <= Decimal::ZERO {
                    return Fill::none(*state);
                }
                let (filled, cost) = match amount.checked_mul(price) {
                    Some(required) if required <= state.cash => (amount, required),
                    _ => match state.cash.checked_div(price) {
                        Some(affordable) => (affordable, state.cash),
                        None => return Fill::none(*state),
                    },
                };
                if filled.is_zero() {
                    return Fill::none(*state);
                }
                let Some(holding) = state.holding_amount.checked_add(filled) else {
                    return Fill::none(*state);
                };
                let basis = state
                    .holding_amount
                    .checked_mul(state.cost_basis)
                    .and_then(|spent| spent.checked_add(cost))
                    .and_then(|spent| spent.checked_div(holding))
                    .unwrap_or(state.cost_basis);
                Fill {
                    state: LedgerState {
                        cash: (state.cash - cost).max(Decimal::ZERO),
                        holding_amount: holding,
                        cost_basis: basis,
                    },
                    filled_amount: filled,
                    cost,
                }
            }
            TradeAction::Sell => {
                let filled = amount.min(state.holding_amount);
                if filled <= Decimal::ZERO {
                    return Fill::none(*state);
                }
                let Some((proceeds, cash)) = filled
                    .checked_mul(price)
                    .and_then(|proceeds| Some((proceeds, state.cash.checked_add(proceeds)?)))
                else {
                    return Fill::none(*state);
                };
                let holding = state.holding_amount - filled;
                Fill {
                    state: LedgerState {
                        cash,
                        holding_amount: holding,
                        cost_basis: if holding.is_zero() {
                            Decimal::ZERO
                        } else {
                            state.cost_basis
                        },
                    },
                    filled_amount: filled,
                    cost: proceeds,
                }
            }
        }
    }

    pub fn apply(state: &LedgerState, decision: &Decision, price: Decimal) -> LedgerState {
        Self::execute(state, decision, price).state
    }

    /// Re-apply `(decision, close)` steps from `initial`, returning the
    /// state and equity after each one.
    pub fn replay<'a>(
        initial: LedgerState,
        steps: impl IntoIterator<Item = (&'a Decision, Decimal)>,
    ) -> Vec<(LedgerState, Decimal)> {
        let mut state = initial;
        steps
            .into_iter()
            .map(|(decision, close)| {
                state = Self::apply(&state, decision, close);
                (state, state.equity(close))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn account(cash: Decimal, holding: Decimal) -> LedgerState {
        LedgerState::new(cash, holding)
    }

    #[test]
    fn buy_within_cash() {
        let fill = Ledger::execute(&account(dec!(1000), dec!(0)), &Decision::buy(dec!(0.01), "x"), dec!(50000));
        assert_eq!(fill.state.cash, dec!(500));
        assert_eq!(fill.state.holding_amount, dec!(0.01));
        assert_eq!(fill.state.cost_basis, dec!(50000));
        assert_eq!(fill.filled_amount, dec!(0.01));
        assert_eq!(fill.cost, dec!(500));
    }

    #[test]
    fn oversized_buy_is_clamped_to_cash() {
        let fill = Ledger::execute(&account(dec!(100), dec!(0)), &Decision::buy(dec!(5), "all in"), dec!(40));
        assert_eq!(fill.state.cash, Decimal::ZERO);
        assert_eq!(fill.state.holding_amount, dec!(2.5));
        assert_eq!(fill.cost, dec!(100));
    }

    #[test]
    fn overflowing_buy_is_clamped_to_cash() {
        let huge = Decimal::from_i128_with_scale(10i128.pow(25), 0);
        let fill = Ledger::execute(&account(dec!(1000), dec!(0)), &Decision::buy(huge, "x"), dec!(50000));
        assert_eq!(fill.state.cash, Decimal::ZERO);
        assert_eq!(fill.state.holding_amount, dec!(0.02));
        assert_eq!(fill.cost, dec!(1000));
    }

    #[test]
    fn unrepresentable_sell_is_skipped() {
        let start = account(Decimal::MAX, Decimal::MAX);
        let fill = Ledger::execute(&start, &Decision::sell(Decimal::MAX, "x"), dec!(2));
        assert_eq!(fill.state, start);
        assert_eq!(fill.filled_amount, Decimal::ZERO);
    }

    #[test]
    fn buy_with_no_cash_is_a_no_op() {
        let start = account(Decimal::ZERO, dec!(1));
        let fill = Ledger::execute(&start, &Decision::buy(dec!(1), "x"), dec!(10));
        assert_eq!(fill.state, start);
        assert_eq!(fill.filled_amount, Decimal::ZERO);
    }

    #[test]
    fn weighted_cost_basis() {
        let start = account(dec!(1000), dec!(1)).with_cost_basis(dec!(100));
        let after = Ledger::apply(&start, &Decision::buy(dec!(1), "x"), dec!(200));
        assert_eq!(after.cost_basis, dec!(150));
    }

    #[test]
    fn oversized_sell_is_clamped_to_holding() {
        let start = account(dec!(0), dec!(2)).with_cost_basis(dec!(10));
        let fill = Ledger::execute(&start, &Decision::sell(dec!(5), "exit"), dec!(30));
        assert_eq!(fill.filled_amount, dec!(2));
        assert_eq!(fill.state.cash, dec!(60));
        assert_eq!(fill.state.holding_amount, Decimal::ZERO);
        assert_eq!(fill.state.cost_basis, Decimal::ZERO);
    }

    #[test]
    fn partial_sell_keeps_basis() {
        let start = account(dec!(0), dec!(2)).with_cost_basis(dec!(10));
        let after = Ledger::apply(&start, &Decision::sell(dec!(1), "trim"), dec!(30));
        assert_eq!(after.cost_basis, dec!(10));
        assert_eq!(after.holding_amount, dec!(1));
    }

    #[test]
    fn hold_changes_nothing() {
        let start = account(dec!(10), dec!(1));
        assert_eq!(Ledger::apply(&start, &Decision::hold("wait"), dec!(5)), start);
    }

    #[test]
    fn apply_does_not_mutate_input() {
        let start = account(dec!(1000), dec!(0));
        let _ = Ledger::apply(&start, &Decision::buy(dec!(1), "x"), dec!(10));
        assert_eq!(start.cash, dec!(1000));
    }

    #[test]
    fn replay_reports_equity_per_step() {
        let decisions = [Decision::buy(dec!(0.01), "x"), Decision::hold("y")];
        let curve = Ledger::replay(
            account(dec!(1000), dec!(0)),
            decisions.iter().zip([dec!(50000), dec!(51000)]),
        );
        assert_eq!(curve[0].1, dec!(1000));
        assert_eq!(curve[1].1, dec!(1010));
        assert_eq!(curve[1].0.cash, dec!(500));
    }
}
