//! Buy-and-hold baseline and curve statistics for finished runs.

use rust_decimal::Decimal;
use tradesage_models::record::{BacktestReport, CurveStats, EquityPoint};

use crate::simulator::BacktestRun;

const STAT_DP: u32 = 6;

/// Equity of `initial_capital` fully invested at the first close and held.
pub fn benchmark_curve(initial_capital: Decimal, closes: &[Decimal]) -> Vec<Decimal> {
    let Some(first) = closes.first().copied().filter(|c| *c > Decimal::ZERO) else {
        return vec![initial_capital; closes.len()];
    };
    let Some(units) = initial_capital.checked_div(first) else {
        return vec![initial_capital; closes.len()];
    };
    closes
        .iter()
        .map(|close| units.checked_mul(*close).unwrap_or(Decimal::MAX))
        .collect()
}

/// Total return and maximum drawdown of `curve` against `initial`.
/// The running peak starts at `initial`.
pub fn curve_stats(initial: Decimal, curve: &[Decimal]) -> CurveStats {
    let final_equity = curve.last().copied().unwrap_or(initial);
    let total_return = if initial > Decimal::ZERO {
        (final_equity - initial)
            .checked_div(initial)
            .unwrap_or(Decimal::MAX)
            .round_dp(STAT_DP)
    } else {
        Decimal::ZERO
    };

    let mut peak = initial;
    let mut max_drawdown = Decimal::ZERO;
    for equity in curve {
        if *equity > peak {
            peak = *equity;
        }
        if peak > Decimal::ZERO {
            let drawdown = (peak - equity) / peak;
            if drawdown > max_drawdown {
                max_drawdown = drawdown;
            }
        }
    }

    CurveStats {
        initial,
        final_equity,
        total_return,
        max_drawdown: max_drawdown.round_dp(STAT_DP),
    }
}

/// Align the run's equity with buy-and-hold over the same recorded days.
pub fn build_report(run: &BacktestRun) -> BacktestReport {
    let closes: Vec<Decimal> = run.records.iter().map(|r| r.price_close).collect();
    let initial_capital = match closes.first() {
        Some(first) => run.initial.equity(*first),
        None => run.initial.cash,
    };
    let benchmark = benchmark_curve(initial_capital, &closes);
    let ai: Vec<Decimal> = run.records.iter().map(|r| r.equity).collect();

    let series = run
        .records
        .iter()
        .zip(&benchmark)
        .map(|(record, bench)| EquityPoint {
            date: record.date,
            ai_equity: record.equity,
            benchmark_equity: *bench,
        })
        .collect();

    BacktestReport {
        run_id: run.run_id,
        symbol: run.symbol.clone(),
        status: run.status.clone(),
        series,
        ai: curve_stats(initial_capital, &ai),
        benchmark: curve_stats(initial_capital, &benchmark),
    }
}
