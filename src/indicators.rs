//! Technical indicators over daily price history
//!
//! Every series is aligned with the bars it was computed from. Positions
//! inside an indicator's warm-up window, and histories too short for it,
//! are `None`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::forecast::features::{ema, rsi, std_dev};
use crate::market::{PriceBar, PriceHistory};

pub const RSI_PERIOD: usize = 14;
pub const ATR_PERIOD: usize = 14;
pub const STOCHASTIC_PERIOD: usize = 14;
/// %D smoothing of the stochastic %K line
pub const STOCHASTIC_SMOOTHING: usize = 3;
pub const BOLLINGER_PERIOD: usize = 20;
pub const BOLLINGER_WIDTH: f64 = 2.0;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;

pub type Series = Vec<Option<f64>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Macd {
    pub macd: Series,
    pub signal: Series,
    pub histogram: Series,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bollinger {
    pub upper: Series,
    pub middle: Series,
    pub lower: Series,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stochastic {
    pub k: Series,
    pub d: Series,
}

/// Most recent reading of each indicator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestIndicators {
    pub date: NaiveDate,
    pub close: f64,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    /// Close relative to its SMA, in percent
    pub price_vs_sma20: Option<f64>,
    pub price_vs_sma50: Option<f64>,
    pub price_vs_sma200: Option<f64>,
    pub bollinger_upper: Option<f64>,
    pub bollinger_lower: Option<f64>,
    pub atr: Option<f64>,
    pub stochastic_k: Option<f64>,
    pub stochastic_d: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalIndicators {
    pub symbol: String,
    pub dates: Vec<NaiveDate>,
    pub sma_20: Series,
    pub sma_50: Series,
    pub sma_200: Series,
    pub ema_12: Series,
    pub ema_26: Series,
    pub rsi: Series,
    pub macd: Macd,
    pub bollinger: Bollinger,
    pub atr: Series,
    pub stochastic: Stochastic,
    pub latest: LatestIndicators,
}

impl TechnicalIndicators {
    /// Compute every indicator; `None` for an empty history.
    pub fn from_history(history: &PriceHistory) -> Option<Self> {
        let bars = &history.bars;
        let last = bars.last()?;
        let closes = history.closes();

        let sma_20 = sma(&closes, 20);
        let sma_50 = sma(&closes, 50);
        let sma_200 = sma(&closes, 200);
        let macd = macd(&closes);
        let bollinger = bollinger(&closes);
        let rsi = rsi_series(&closes);
        let atr = atr(bars);
        let stochastic = stochastic(bars);

        let latest = LatestIndicators {
            date: last.date,
            close: last.close,
            rsi: last_of(&rsi),
            macd: last_of(&macd.macd),
            macd_signal: last_of(&macd.signal),
            price_vs_sma20: versus(last.close, last_of(&sma_20)),
            price_vs_sma50: versus(last.close, last_of(&sma_50)),
            price_vs_sma200: versus(last.close, last_of(&sma_200)),
            bollinger_upper: last_of(&bollinger.upper),
            bollinger_lower: last_of(&bollinger.lower),
            atr: last_of(&atr),
            stochastic_k: last_of(&stochastic.k),
            stochastic_d: last_of(&stochastic.d),
        };

        Some(Self {
            symbol: history.symbol.clone(),
            dates: bars.iter().map(|b| b.date).collect(),
            sma_20,
            sma_50,
            sma_200,
            ema_12: ema_series(&closes, MACD_FAST),
            ema_26: ema_series(&closes, MACD_SLOW),
            rsi,
            macd,
            bollinger,
            atr,
            stochastic,
            latest,
        })
    }
}

/// Simple moving average over `period` closes
pub fn sma(values: &[f64], period: usize) -> Series {
    rolling(values, period, |w| w.iter().sum::<f64>() / w.len() as f64)
}

/// EMA seeded with the first close; all `None` when shorter than `period`
pub fn ema_series(values: &[f64], period: usize) -> Series {
    if period == 0 || values.len() < period {
        return vec![None; values.len()];
    }
    ema(values, period).into_iter().map(Some).collect()
}

/// RSI over the last `RSI_PERIOD` price changes; a flat window reads 50
pub fn rsi_series(closes: &[f64]) -> Series {
    (0..closes.len())
        .map(|i| (i >= RSI_PERIOD).then(|| rsi(&closes[i - RSI_PERIOD..=i])))
        .collect()
}

pub fn macd(closes: &[f64]) -> Macd {
    let n = closes.len();
    if n < MACD_SLOW {
        return Macd {
            macd: vec![None; n],
            signal: vec![None; n],
            histogram: vec![None; n],
        };
    }

    let fast = ema(closes, MACD_FAST);
    let slow = ema(closes, MACD_SLOW);
    let line: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
    let signal = ema(&line, MACD_SIGNAL);
    let histogram = line.iter().zip(&signal).map(|(m, s)| Some(m - s)).collect();

    Macd {
        macd: line.into_iter().map(Some).collect(),
        signal: signal.into_iter().map(Some).collect(),
        histogram,
    }
}

pub fn bollinger(closes: &[f64]) -> Bollinger {
    let middle = sma(closes, BOLLINGER_PERIOD);
    let deviation = rolling(closes, BOLLINGER_PERIOD, std_dev);
    let band = |sign: f64| -> Series {
        middle
            .iter()
            .zip(&deviation)
            .map(|(m, d)| Some((*m)? + sign * BOLLINGER_WIDTH * (*d)?))
            .collect()
    };

    Bollinger {
        upper: band(1.0),
        lower: band(-1.0),
        middle,
    }
}

/// Average true range; the first bar's range has no previous close
pub fn atr(bars: &[PriceBar]) -> Series {
    if bars.len() <= ATR_PERIOD {
        return vec![None; bars.len()];
    }
    let true_ranges: Vec<f64> = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let range = bar.high - bar.low;
            match i.checked_sub(1).map(|p| bars[p].close) {
                Some(prev) => range
                    .max((bar.high - prev).abs())
                    .max((bar.low - prev).abs()),
                None => range,
            }
        })
        .collect();
    rolling(&true_ranges, ATR_PERIOD, |w| {
        w.iter().sum::<f64>() / w.len() as f64
    })
}

/// %K and its moving average %D; undefined while the window has no range
pub fn stochastic(bars: &[PriceBar]) -> Stochastic {
    let n = bars.len();
    let k: Series = (0..n)
        .map(|i| {
            if i + 1 < STOCHASTIC_PERIOD {
                return None;
            }
            let window = &bars[i + 1 - STOCHASTIC_PERIOD..=i];
            let low = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
            let high = window.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
            let span = high - low;
            (span > 0.0).then(|| 100.0 * (bars[i].close - low) / span)
        })
        .collect();

    let d = (0..n)
        .map(|i| {
            if i + 1 < STOCHASTIC_SMOOTHING {
                return None;
            }
            let window = &k[i + 1 - STOCHASTIC_SMOOTHING..=i];
            let sum = window.iter().copied().sum::<Option<f64>>()?;
            Some(sum / STOCHASTIC_SMOOTHING as f64)
        })
        .collect();

    Stochastic { k, d }
}

/// `f` over each trailing window of `period` values
fn rolling(values: &[f64], period: usize, f: impl Fn(&[f64]) -> f64) -> Series {
    if period == 0 || values.len() < period {
        return vec![None; values.len()];
    }
    (0..values.len())
        .map(|i| (i + 1 >= period).then(|| f(&values[i + 1 - period..=i])))
        .collect()
}

fn last_of(series: &Series) -> Option<f64> {
    series.last().copied().flatten().filter(|v| v.is_finite())
}

fn versus(close: f64, average: Option<f64>) -> Option<f64> {
    average
        .filter(|a| *a != 0.0)
        .map(|a| (close / a - 1.0) * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::mock::synthetic_bars;
    use chrono::TimeDelta;

    fn flat_bars(count: usize, price: f64) -> Vec<PriceBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..count)
            .map(|i| PriceBar {
                date: start + TimeDelta::days(i as i64),
                open: price,
                high: price,
                low: price,
                close: price,
                volume: 1_000,
            })
            .collect()
    }

    fn history(bars: Vec<PriceBar>) -> PriceHistory {
        PriceHistory {
            symbol: "TCS.NS".to_string(),
            range: "1y".to_string(),
            bars,
        }
    }

    #[test]
    fn test_empty_history_has_no_indicators() {
        assert!(TechnicalIndicators::from_history(&history(vec![])).is_none());
    }

    #[test]
    fn test_sma_warm_up_positions_are_none() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(sma(&values, 3), vec![None, None, Some(2.0), Some(3.0), Some(4.0)]);
        assert_eq!(sma(&values, 6), vec![None; 5]);
    }

    #[test]
    fn test_short_history_leaves_long_windows_empty() {
        let ind = TechnicalIndicators::from_history(&history(synthetic_bars(30))).unwrap();

        assert_eq!(ind.dates.len(), 30);
        assert!(ind.sma_50.iter().all(Option::is_none));
        assert!(ind.sma_200.iter().all(Option::is_none));
        assert!(ind.ema_12.iter().all(Option::is_some));
        assert!(ind.macd.macd.iter().all(Option::is_some));
        assert_eq!(ind.rsi[RSI_PERIOD - 1], None);
        assert!(ind.rsi[RSI_PERIOD].is_some());
        assert_eq!(ind.atr[ATR_PERIOD - 2], None);
        assert!(ind.atr[ATR_PERIOD - 1].is_some());
        assert_eq!(ind.bollinger.upper[BOLLINGER_PERIOD - 2], None);
        assert!(ind.bollinger.upper[BOLLINGER_PERIOD - 1].is_some());

        assert_eq!(ind.latest.price_vs_sma50, None);
        assert_eq!(ind.latest.price_vs_sma200, None);
        assert!(ind.latest.price_vs_sma20.is_some());
    }

    #[test]
    fn test_too_short_for_macd() {
        let m = macd(&[1.0; 10]);
        assert!(m.macd.iter().chain(&m.signal).chain(&m.histogram).all(Option::is_none));
    }

    #[test]
    fn test_flat_series() {
        let ind = TechnicalIndicators::from_history(&history(flat_bars(60, 250.0))).unwrap();
        let latest = &ind.latest;

        assert_eq!(latest.rsi, Some(50.0));
        assert!(latest.macd.unwrap().abs() < 1e-9);
        assert!(latest.macd_signal.unwrap().abs() < 1e-9);
        assert_eq!(latest.price_vs_sma20, Some(0.0));
        assert_eq!(latest.price_vs_sma50, Some(0.0));
        assert_eq!(latest.bollinger_upper, Some(250.0));
        assert_eq!(latest.bollinger_lower, Some(250.0));
        assert_eq!(latest.atr, Some(0.0));
        // No high-low range, so %K is undefined
        assert_eq!(latest.stochastic_k, None);
        assert_eq!(latest.stochastic_d, None);
    }

    #[test]
    fn test_rising_series_reads_overbought() {
        let bars: Vec<PriceBar> = (0..40)
            .map(|i| {
                let close = 100.0 + i as f64;
                PriceBar {
                    date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + TimeDelta::days(i),
                    open: close - 0.5,
                    high: close,
                    low: close - 1.0,
                    close,
                    volume: 1_000,
                }
            })
            .collect();
        let ind = TechnicalIndicators::from_history(&history(bars)).unwrap();

        assert_eq!(ind.latest.rsi, Some(100.0));
        assert_eq!(ind.latest.stochastic_k, Some(100.0));
        assert_eq!(ind.latest.stochastic_d, Some(100.0));
        assert!(ind.latest.macd.unwrap() > 0.0);
        assert!(ind.latest.price_vs_sma20.unwrap() > 0.0);
        // Every true range reaches back to the previous close: 1.0
        assert!((ind.latest.atr.unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_stochastic_d_waits_for_three_k_values() {
        let s = stochastic(&synthetic_bars(20));
        let first_k = STOCHASTIC_PERIOD - 1;
        assert!(s.k[first_k].is_some());
        assert_eq!(s.d[first_k], None);
        assert_eq!(s.d[first_k + 1], None);
        assert!(s.d[first_k + 2].is_some());
    }
}
