//! Feature engineering from daily bars

use crate::market::PriceBar;

pub const FEATURE_NAMES: [&str; 12] = [
    "return_1d",
    "return_5d",
    "return_10d",
    "sma5_ratio",
    "sma20_ratio",
    "macd_spread",
    "rsi_14",
    "volatility_5",
    "volatility_20",
    "range",
    "gap",
    "volume_ratio",
];

/// Bars consumed before the first complete feature row (slow EMA span)
pub const WARMUP: usize = 26;

/// Feature rows aligned with next-day return targets
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub rows: Vec<Vec<f64>>,
    /// Next-day simple return for each row
    pub targets: Vec<f64>,
    /// Close on the row's own day
    pub closes: Vec<f64>,
    /// Features of the most recent bar, which has no target yet
    pub latest: Vec<f64>,
}

impl FeatureMatrix {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Build the feature matrix; `None` when there are too few bars.
pub fn build(bars: &[PriceBar]) -> Option<FeatureMatrix> {
    if bars.len() < WARMUP + 2 {
        return None;
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let returns = daily_returns(&closes);
    let ema_fast = ema(&closes, 12);
    let ema_slow = ema(&closes, 26);

    let row_at = |t: usize| -> Vec<f64> {
        let bar = &bars[t];
        let close = bar.close;
        let avg_volume = mean(bars[t + 1 - 20..=t].iter().map(|b| b.volume as f64));
        vec![
            pct(close, closes[t - 1]),
            pct(close, closes[t - 5]),
            pct(close, closes[t - 10]),
            ratio(close, mean(closes[t + 1 - 5..=t].iter().copied())),
            ratio(close, mean(closes[t + 1 - 20..=t].iter().copied())),
            safe_div(ema_fast[t] - ema_slow[t], close),
            rsi(&closes[t - 14..=t]) / 100.0,
            std_dev(&returns[t - 5..t]),
            std_dev(&returns[t - 20..t]),
            safe_div(bar.high - bar.low, close),
            safe_div(bar.close - bar.open, bar.open),
            if avg_volume > 0.0 {
                bar.volume as f64 / avg_volume
            } else {
                1.0
            },
        ]
    };

    let last = bars.len() - 1;
    let mut rows = Vec::with_capacity(last - WARMUP);
    let mut targets = Vec::with_capacity(last - WARMUP);
    let mut row_closes = Vec::with_capacity(last - WARMUP);
    for t in WARMUP..last {
        rows.push(row_at(t));
        targets.push(pct(closes[t + 1], closes[t]));
        row_closes.push(closes[t]);
    }

    Some(FeatureMatrix {
        rows,
        targets,
        closes: row_closes,
        latest: row_at(last),
    })
}

/// `returns[i]` is the return from close `i` to close `i + 1`.
pub fn daily_returns(closes: &[f64]) -> Vec<f64> {
    closes.windows(2).map(|w| pct(w[1], w[0])).collect()
}

/// Exponential moving average seeded with the first value
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev = match values.first() {
        Some(v) => *v,
        None => return out,
    };
    for v in values {
        prev = alpha * v + (1.0 - alpha) * prev;
        out.push(prev);
    }
    out
}

/// Relative strength index over consecutive closes (simple averages)
pub fn rsi(closes: &[f64]) -> f64 {
    let (gains, losses) = closes
        .windows(2)
        .map(|w| w[1] - w[0])
        .fold((0.0, 0.0), |(g, l), d| {
            if d > 0.0 { (g + d, l) } else { (g, l - d) }
        });
    if losses == 0.0 {
        return if gains == 0.0 { 50.0 } else { 100.0 };
    }
    100.0 - 100.0 / (1.0 + gains / losses)
}

/// Sample standard deviation; 0 for fewer than two values
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values.iter().copied());
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { 0.0 } else { sum / n as f64 }
}

fn pct(current: f64, previous: f64) -> f64 {
    safe_div(current - previous, previous)
}

fn ratio(value: f64, base: f64) -> f64 {
    safe_div(value, base) - 1.0
}

fn safe_div(a: f64, b: f64) -> f64 {
    if b == 0.0 { 0.0 } else { a / b }
}
