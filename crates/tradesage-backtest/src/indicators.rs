//! Latest-value technical indicators over daily closes (oldest first).
//! Each returns `None` until enough history exists.

use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use tradesage_agents::IndicatorReading;
use tradesage_models::market::PriceBar;

pub fn closes(bars: &[PriceBar]) -> Vec<f64> {
    bars.iter().filter_map(|b| b.close.to_f64()).collect()
}

/// Simple moving average of the last `period` closes.
pub fn sma(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }
    let window = &closes[closes.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Wilder's RSI. Needs `period + 1` closes.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() <= period {
        return None;
    }
    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    let (mut gain, mut loss) = changes[..period].iter().fold((0.0, 0.0), |(g, l), c| {
        if *c >= 0.0 {
            (g + c, l)
        } else {
            (g, l - c)
        }
    });
    gain /= period as f64;
    loss /= period as f64;

    let p = period as f64;
    for c in &changes[period..] {
        gain = (gain * (p - 1.0) + c.max(0.0)) / p;
        loss = (loss * (p - 1.0) + (-c).max(0.0)) / p;
    }

    if loss == 0.0 {
        return Some(if gain == 0.0 { 50.0 } else { 100.0 });
    }
    let rs = gain / loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Bollinger bands with population standard deviation.
pub fn bollinger(closes: &[f64], period: usize, std_factor: f64) -> Option<Bands> {
    let middle = sma(closes, period)?;
    let window = &closes[closes.len() - period..];
    let variance = window.iter().map(|x| (x - middle).powi(2)).sum::<f64>() / period as f64;
    let spread = std_factor * variance.sqrt();
    Some(Bands {
        upper: middle + spread,
        middle,
        lower: middle - spread,
    })
}

/// The readings every advisor prompt carries.
pub fn standard_readings(bars: &[PriceBar]) -> Vec<IndicatorReading> {
    let closes = closes(bars);
    vec![
        IndicatorReading::new("SMA5", sma(&closes, 5)),
        IndicatorReading::new("SMA20", sma(&closes, 20)),
        IndicatorReading::new("RSI14", rsi(&closes, 14)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn sma_uses_last_window() {
        assert!(approx(sma(&[1.0, 2.0, 3.0, 4.0], 2).unwrap(), 3.5));
        assert!(sma(&[1.0], 2).is_none());
        assert!(sma(&[1.0], 0).is_none());
    }

    #[test]
    fn rsi_extremes() {
        let rising: Vec<f64> = (1..=20).map(f64::from).collect();
        assert!(approx(rsi(&rising, 14).unwrap(), 100.0));
        let falling: Vec<f64> = rising.iter().rev().copied().collect();
        assert!(approx(rsi(&falling, 14).unwrap(), 0.0));
        assert!(approx(rsi(&[5.0; 16], 14).unwrap(), 50.0));
        assert!(rsi(&rising[..14], 14).is_none());
    }

    #[test]
    fn rsi_balanced_moves() {
        let zigzag: Vec<f64> = (0..30).map(|i| if i % 2 == 0 { 10.0 } else { 11.0 }).collect();
        let value = rsi(&zigzag, 14).unwrap();
        assert!(value > 40.0 && value < 60.0, "rsi {value}");
    }

    #[test]
    fn bollinger_bands_are_symmetric() {
        let bands = bollinger(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], 8, 2.0).unwrap();
        assert!(approx(bands.middle, 5.0));
        assert!(approx(bands.upper, 9.0));
        assert!(approx(bands.lower, 1.0));
        assert!(bollinger(&[1.0], 20, 2.0).is_none());
    }

    #[test]
    fn readings_report_missing_history() {
        use chrono::NaiveDate;
        use rust_decimal::Decimal;
        let d = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars: Vec<PriceBar> = (0..6)
            .map(|i| PriceBar::flat(d + chrono::Duration::days(i), Decimal::from(10 + i)))
            .collect();
        let readings = standard_readings(&bars);
        assert!(approx(readings[0].value.unwrap(), 13.0));
        assert_eq!(readings[1].value, None);
        assert_eq!(readings[2].value, None);
    }
}
