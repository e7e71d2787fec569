//! Technical indicator library.
//!
//! Every function returns a [`Series`] index-aligned with its input. Leading
//! entries are `None` until enough history accumulates, so "not yet
//! computable" is never confused with a computed zero.
//!
//! Smoothing conventions matter here and are not interchangeable:
//! - SMA, Bollinger, Stochastic, CMF use simple trailing windows.
//! - EMA uses `k = 2 / (period + 1)`, seeded with the SMA of the first
//!   `period` values (so it is defined from index `period - 1`).
//! - RSI, ATR, ADX use Wilder smoothing: `avg = (prev * (p - 1) + x) / p`,
//!   seeded with the simple mean of the first `period` observations.

use pat_core::market::Ohlcv;

/// Optional-valued series aligned with the input bars.
pub type Series = Vec<Option<f64>>;

/// Most recent value of a series, if defined.
pub fn latest(series: &[Option<f64>]) -> Option<f64> {
    series.last().copied().flatten()
}

/// Value one step before the most recent, if defined.
pub fn previous(series: &[Option<f64>]) -> Option<f64> {
    series
        .len()
        .checked_sub(2)
        .and_then(|i| series.get(i).copied().flatten())
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator). `None` below two values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

// --- Moving averages ---

/// Simple moving average. Undefined for index < period - 1.
pub fn sma(values: &[f64], period: usize) -> Series {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    for (i, window) in values.windows(period).enumerate() {
        out[i + period - 1] = Some(mean(window));
    }
    out
}

/// SMA over an optional series. A window containing any `None` is `None`.
pub fn sma_opt(values: &[Option<f64>], period: usize) -> Series {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    for (i, window) in values.windows(period).enumerate() {
        let defined: Option<Vec<f64>> = window.iter().copied().collect();
        out[i + period - 1] = defined.map(|w| mean(&w));
    }
    out
}

/// Rolling sample standard deviation over a trailing window.
pub fn rolling_std(values: &[f64], period: usize) -> Series {
    let mut out = vec![None; values.len()];
    if period < 2 || values.len() < period {
        return out;
    }
    for (i, window) in values.windows(period).enumerate() {
        out[i + period - 1] = sample_std(window);
    }
    out
}

/// Exponential moving average, SMA-seeded.
pub fn ema(values: &[f64], period: usize) -> Series {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    let k = 2.0 / (period as f64 + 1.0);
    let mut prev = mean(&values[..period]);
    out[period - 1] = Some(prev);
    for i in period..values.len() {
        prev = values[i] * k + prev * (1.0 - k);
        out[i] = Some(prev);
    }
    out
}

/// EMA over the first contiguous defined run of an optional series.
///
/// Leading `None`s are skipped; the EMA is seeded from the first `period`
/// defined values. A gap after the run starts ends the output.
pub fn ema_opt(values: &[Option<f64>], period: usize) -> Series {
    let mut out = vec![None; values.len()];
    let Some(start) = values.iter().position(Option::is_some) else {
        return out;
    };
    let run: Vec<f64> = values[start..].iter().map_while(|v| *v).collect();
    for (offset, v) in ema(&run, period).into_iter().enumerate() {
        out[start + offset] = v;
    }
    out
}

// --- Momentum ---

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
}

/// Relative Strength Index (0–100), Wilder-smoothed. Undefined for index < period.
///
/// A zero average loss yields exactly 100, including for a flat series.
pub fn rsi(close: &[f64], period: usize) -> Series {
    let mut out = vec![None; close.len()];
    if period == 0 || close.len() <= period {
        return out;
    }
    let p = period as f64;
    let (mut avg_gain, mut avg_loss) = (0.0, 0.0);
    for i in 1..=period {
        let delta = close[i] - close[i - 1];
        if delta > 0.0 {
            avg_gain += delta;
        } else {
            avg_loss -= delta;
        }
    }
    avg_gain /= p;
    avg_loss /= p;
    out[period] = Some(rsi_value(avg_gain, avg_loss));

    for i in (period + 1)..close.len() {
        let delta = close[i] - close[i - 1];
        let (gain, loss) = if delta > 0.0 { (delta, 0.0) } else { (0.0, -delta) };
        avg_gain = (avg_gain * (p - 1.0) + gain) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss) / p;
        out[i] = Some(rsi_value(avg_gain, avg_loss));
    }
    out
}

/// MACD line, signal line, and histogram.
#[derive(Debug, Clone)]
pub struct Macd {
    pub line: Series,
    pub signal: Series,
    pub histogram: Series,
}

/// MACD(fast, slow, signal). The signal line starts once `signal` MACD
/// values exist, i.e. at index `slow + signal - 2`.
pub fn macd(close: &[f64], fast: usize, slow: usize, signal: usize) -> Macd {
    let fast_ema = ema(close, fast);
    let slow_ema = ema(close, slow);
    let line: Series = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();
    let signal_line = ema_opt(&line, signal);
    let histogram = line
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| Some((*m)? - (*s)?))
        .collect();
    Macd {
        line,
        signal: signal_line,
        histogram,
    }
}

// --- Volatility ---

/// Bollinger bands and %B.
#[derive(Debug, Clone)]
pub struct Bollinger {
    pub upper: Series,
    pub middle: Series,
    pub lower: Series,
    /// `(price - lower) / (upper - lower)`. Not clamped: it leaves [0, 1]
    /// on closes outside the bands. `None` for a zero-width band.
    pub pct_b: Series,
}

/// Bollinger(period, k) with a sample standard deviation.
pub fn bollinger(close: &[f64], period: usize, num_std: f64) -> Bollinger {
    let middle = sma(close, period);
    let std = rolling_std(close, period);
    let n = close.len();
    let (mut upper, mut lower, mut pct_b) = (vec![None; n], vec![None; n], vec![None; n]);
    for i in 0..n {
        if let (Some(m), Some(s)) = (middle[i], std[i]) {
            let (u, l) = (m + num_std * s, m - num_std * s);
            upper[i] = Some(u);
            lower[i] = Some(l);
            if u > l {
                pct_b[i] = Some((close[i] - l) / (u - l));
            }
        }
    }
    Bollinger {
        upper,
        middle,
        lower,
        pct_b,
    }
}

/// True range; the first bar has no previous close and uses `high - low`.
pub fn true_range(bars: &Ohlcv) -> Vec<f64> {
    (0..bars.len())
        .map(|i| {
            let hl = bars.high[i] - bars.low[i];
            if i == 0 {
                return hl;
            }
            let prev = bars.close[i - 1];
            hl.max((bars.high[i] - prev).abs())
                .max((bars.low[i] - prev).abs())
        })
        .collect()
}

/// Average True Range, Wilder-smoothed. Undefined for index < period.
pub fn atr(bars: &Ohlcv, period: usize) -> Series {
    let n = bars.len();
    let mut out = vec![None; n];
    if period == 0 || n <= period {
        return out;
    }
    let tr = true_range(bars);
    let p = period as f64;
    let mut value = mean(&tr[1..=period]);
    out[period] = Some(value);
    for i in (period + 1)..n {
        value = (value * (p - 1.0) + tr[i]) / p;
        out[i] = Some(value);
    }
    out
}

// --- Volume ---

/// Cumulative VWAP over the whole supplied window (no session reset).
/// `None` while cumulative volume is zero.
pub fn vwap(bars: &Ohlcv) -> Series {
    let (mut cum_pv, mut cum_vol) = (0.0, 0.0);
    (0..bars.len())
        .map(|i| {
            let tp = bars.typical_price(i);
            cum_pv += tp * bars.volume[i];
            cum_vol += bars.volume[i];
            (cum_vol > 0.0).then(|| cum_pv / cum_vol)
        })
        .collect()
}

/// On-Balance Volume, starting at 0 on the first bar.
pub fn obv(bars: &Ohlcv) -> Series {
    let mut total = 0.0;
    (0..bars.len())
        .map(|i| {
            if i > 0 {
                let (c, prev) = (bars.close[i], bars.close[i - 1]);
                if c > prev {
                    total += bars.volume[i];
                } else if c < prev {
                    total -= bars.volume[i];
                }
            }
            Some(total)
        })
        .collect()
}

/// Money flow volume of one bar; 0 when high == low.
pub fn money_flow_volume(bars: &Ohlcv, i: usize) -> f64 {
    let (h, l, c) = (bars.high[i], bars.low[i], bars.close[i]);
    if h == l {
        return 0.0;
    }
    bars.volume[i] * ((c - l) - (h - c)) / (h - l)
}

/// Accumulation/Distribution line.
pub fn accumulation_distribution(bars: &Ohlcv) -> Series {
    let mut total = 0.0;
    (0..bars.len())
        .map(|i| {
            total += money_flow_volume(bars, i);
            Some(total)
        })
        .collect()
}

/// Chaikin Money Flow. `None` where the window's volume sums to zero.
pub fn chaikin_money_flow(bars: &Ohlcv, period: usize) -> Series {
    let n = bars.len();
    let mut out = vec![None; n];
    if period == 0 || n < period {
        return out;
    }
    let mfv: Vec<f64> = (0..n).map(|i| money_flow_volume(bars, i)).collect();
    for end in (period - 1)..n {
        let start = end + 1 - period;
        let vol: f64 = bars.volume[start..=end].iter().sum();
        if vol > 0.0 {
            out[end] = Some(mfv[start..=end].iter().sum::<f64>() / vol);
        }
    }
    out
}

// --- Trend strength ---

/// ADX with directional indicators.
#[derive(Debug, Clone)]
pub struct Adx {
    /// Defined from index `2 * period - 1`.
    pub adx: Series,
    /// Defined from index `period`.
    pub plus_di: Series,
    pub minus_di: Series,
}

/// Average Directional Index, Wilder-smoothed throughout.
pub fn adx(bars: &Ohlcv, period: usize) -> Adx {
    let n = bars.len();
    let mut result = Adx {
        adx: vec![None; n],
        plus_di: vec![None; n],
        minus_di: vec![None; n],
    };
    if period == 0 || n <= period {
        return result;
    }

    let tr = true_range(bars);
    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    for i in 1..n {
        let up = bars.high[i] - bars.high[i - 1];
        let down = bars.low[i - 1] - bars.low[i];
        if up > down && up > 0.0 {
            plus_dm[i] = up;
        }
        if down > up && down > 0.0 {
            minus_dm[i] = down;
        }
    }

    let p = period as f64;
    let mut s_tr: f64 = tr[1..=period].iter().sum();
    let mut s_plus: f64 = plus_dm[1..=period].iter().sum();
    let mut s_minus: f64 = minus_dm[1..=period].iter().sum();
    let mut dx = vec![0.0; n];

    for i in period..n {
        if i > period {
            s_tr = s_tr - s_tr / p + tr[i];
            s_plus = s_plus - s_plus / p + plus_dm[i];
            s_minus = s_minus - s_minus / p + minus_dm[i];
        }
        let (pdi, mdi) = if s_tr > 0.0 {
            (100.0 * s_plus / s_tr, 100.0 * s_minus / s_tr)
        } else {
            (0.0, 0.0)
        };
        result.plus_di[i] = Some(pdi);
        result.minus_di[i] = Some(mdi);
        dx[i] = if pdi + mdi > 0.0 {
            100.0 * (pdi - mdi).abs() / (pdi + mdi)
        } else {
            0.0
        };
    }

    let first = 2 * period - 1;
    if n > first {
        let mut value = mean(&dx[period..=first]);
        result.adx[first] = Some(value);
        for i in (first + 1)..n {
            value = (value * (p - 1.0) + dx[i]) / p;
            result.adx[i] = Some(value);
        }
    }
    result
}

/// Stochastic oscillator lines.
#[derive(Debug, Clone)]
pub struct Stochastic {
    pub k: Series,
    pub d: Series,
}

/// Stochastic(%K period, %D period). %K is `None` for a zero-range window.
pub fn stochastic(bars: &Ohlcv, k_period: usize, d_period: usize) -> Stochastic {
    let n = bars.len();
    let mut k = vec![None; n];
    if k_period > 0 && n >= k_period {
        for end in (k_period - 1)..n {
            let start = end + 1 - k_period;
            let hh = bars.high[start..=end]
                .iter()
                .copied()
                .fold(f64::NEG_INFINITY, f64::max);
            let ll = bars.low[start..=end]
                .iter()
                .copied()
                .fold(f64::INFINITY, f64::min);
            if hh > ll {
                k[end] = Some(100.0 * (bars.close[end] - ll) / (hh - ll));
            }
        }
    }
    let d = sma_opt(&k, d_period);
    Stochastic { k, d }
}

#[cfg(test)]
mod tests;
