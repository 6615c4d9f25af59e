use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Cash and holdings of one simulated account. Both fields are never
/// negative.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerState {
    pub cash: Decimal,
    pub holding_amount: Decimal,
    /// Weighted average price paid per held unit. Zero when flat.
    pub cost_basis: Decimal,
}

impl LedgerState {
    pub fn new(cash: Decimal, holding_amount: Decimal) -> Self {
        Self {
            cash: cash.max(Decimal::ZERO),
            holding_amount: holding_amount.max(Decimal::ZERO),
            cost_basis: Decimal::ZERO,
        }
    }

    pub fn with_cost_basis(mut self, cost_basis: Decimal) -> Self {
        self.cost_basis = cost_basis.max(Decimal::ZERO);
        self
    }

    /// Value of the holding at `price`, saturating at `Decimal::MAX`.
    pub fn holding_value(&self, price: Decimal) -> Decimal {
        self.holding_amount.checked_mul(price).unwrap_or(Decimal::MAX)
    }

    /// Cash plus holding value, saturating at `Decimal::MAX`.
    pub fn equity(&self, price: Decimal) -> Decimal {
        self.cash
            .checked_add(self.holding_value(price))
            .unwrap_or(Decimal::MAX)
    }

    /// Share of equity held in the asset at `price`; zero for an empty account.
    pub fn position_ratio(&self, price: Decimal) -> Decimal {
        let equity = self.equity(price);
        if equity <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        self.holding_value(price)
            .checked_div(equity)
            .map(|ratio| ratio.min(Decimal::ONE).round_dp(4))
            .unwrap_or(Decimal::ONE)
    }
}
