use super::*;
use chrono::{Duration, NaiveDate};
use pat_core::market::PriceBar;

fn bars_from_closes(closes: &[f64]) -> Ohlcv {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let bars: Vec<PriceBar> = closes
        .iter()
        .enumerate()
        .map(|(i, &c)| PriceBar {
            date: start + Duration::days(i as i64),
            open: c,
            high: c + 1.0,
            low: c - 1.0,
            close: c,
            volume: 1_000.0 + i as f64,
        })
        .collect();
    Ohlcv::from_bars(&bars).unwrap()
}

fn leading_none(series: &[Option<f64>]) -> usize {
    series.iter().take_while(|v| v.is_none()).count()
}

const SCENARIO: [f64; 20] = [
    100.0, 102.0, 101.0, 105.0, 110.0, 108.0, 112.0, 115.0, 111.0, 109.0, 113.0, 116.0, 118.0,
    117.0, 120.0, 122.0, 119.0, 121.0, 124.0, 126.0,
];

#[test]
fn test_output_lengths_match_input() {
    let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.3).sin() * 5.0).collect();
    let bars = bars_from_closes(&closes);
    let n = closes.len();
    assert_eq!(sma(&closes, 20).len(), n);
    assert_eq!(ema(&closes, 20).len(), n);
    assert_eq!(rsi(&closes, 14).len(), n);
    let m = macd(&closes, 12, 26, 9);
    assert_eq!(m.line.len(), n);
    assert_eq!(m.signal.len(), n);
    assert_eq!(m.histogram.len(), n);
    assert_eq!(bollinger(&closes, 20, 2.0).pct_b.len(), n);
    assert_eq!(atr(&bars, 14).len(), n);
    assert_eq!(vwap(&bars).len(), n);
    assert_eq!(obv(&bars).len(), n);
    assert_eq!(accumulation_distribution(&bars).len(), n);
    assert_eq!(chaikin_money_flow(&bars, 20).len(), n);
    assert_eq!(adx(&bars, 14).adx.len(), n);
    assert_eq!(stochastic(&bars, 14, 3).d.len(), n);
}

#[test]
fn test_warmup_boundaries() {
    let closes: Vec<f64> = (0..80).map(|i| 50.0 + (i as f64 * 0.7).cos() * 3.0).collect();
    let bars = bars_from_closes(&closes);

    assert_eq!(leading_none(&sma(&closes, 20)), 19);
    assert_eq!(leading_none(&ema(&closes, 20)), 19);
    assert_eq!(leading_none(&rsi(&closes, 14)), 14);
    assert_eq!(leading_none(&atr(&bars, 14)), 14);
    let a = adx(&bars, 14);
    assert_eq!(leading_none(&a.plus_di), 14);
    assert_eq!(leading_none(&a.adx), 27);
    assert_eq!(leading_none(&macd(&closes, 12, 26, 9).line), 25);
    assert_eq!(leading_none(&macd(&closes, 12, 26, 9).signal), 33);

    // Once defined, always defined.
    for series in [sma(&closes, 20), ema(&closes, 20), rsi(&closes, 14), atr(&bars, 14)] {
        let start = leading_none(&series);
        assert!(series[start..].iter().all(Option::is_some));
    }
}

#[test]
fn test_constant_series_sma_ema_equal_constant() {
    let closes = vec![42.5; 40];
    for v in sma(&closes, 10).into_iter().flatten() {
        assert!((v - 42.5).abs() < 1e-9);
    }
    for v in ema(&closes, 10).into_iter().flatten() {
        assert!((v - 42.5).abs() < 1e-9);
    }
}

#[test]
fn test_scenario_sma_window_and_ema_responsiveness() {
    let sma5 = sma(&SCENARIO, 5);
    let ema5 = ema(&SCENARIO, 5);
    let expected = SCENARIO[15..=19].iter().sum::<f64>() / 5.0;
    let got = sma5[19].unwrap();
    assert!((got - expected).abs() < 1e-12, "SMA(5)[19] = {got}, want {expected}");
    let diff = (ema5[19].unwrap() - got).abs();
    assert!(diff > 1e-6, "EMA and SMA should differ, diff = {diff}");
}

#[test]
fn test_short_series_fully_undefined() {
    let closes: Vec<f64> = (0..150).map(|i| 10.0 + i as f64).collect();
    assert!(ema(&closes, 200).iter().all(Option::is_none));
    assert!(sma(&[], 5).is_empty());
    assert!(rsi(&[1.0, 2.0], 14).iter().all(Option::is_none));
}

#[test]
fn test_rsi_monotonic_extremes() {
    let up: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
    let down: Vec<f64> = (0..40).map(|i| 100.0 - i as f64).collect();
    assert_eq!(latest(&rsi(&up, 14)), Some(100.0));
    let low = latest(&rsi(&down, 14)).unwrap();
    assert!(low.abs() < 1e-9, "RSI of falling series = {low}");
}

#[test]
fn test_rsi_flat_series_is_exactly_100() {
    let flat = vec![50.0; 20];
    let r = rsi(&flat, 14);
    for v in &r[14..] {
        assert_eq!(*v, Some(100.0));
    }
}

#[test]
fn test_rsi_wilder_smoothing_differs_from_simple_mean() {
    // Gains early, then a single loss: Wilder keeps memory of the seed.
    let mut closes: Vec<f64> = (0..15).map(|i| 100.0 + i as f64).collect();
    closes.push(110.0);
    let r = rsi(&closes, 14);
    // avg_gain = 1 * 13/14, avg_loss = 4/14
    let expected = 100.0 - 100.0 / (1.0 + 13.0 / 4.0);
    assert!((r[15].unwrap() - expected).abs() < 1e-9);
}

#[test]
fn test_bollinger_pct_b_not_clamped() {
    let mut closes = vec![100.0, 101.0, 99.0, 100.5, 99.5].repeat(4);
    closes.push(130.0);
    let b = bollinger(&closes, 20, 2.0);
    let pct = latest(&b.pct_b).unwrap();
    assert!(pct > 1.0, "spike should push %B above 1, got {pct}");
}

#[test]
fn test_bollinger_zero_width_is_undefined() {
    let closes = vec![10.0; 25];
    let b = bollinger(&closes, 20, 2.0);
    assert!(b.middle[24].is_some());
    assert!(b.pct_b[24].is_none());
}

#[test]
fn test_atr_constant_range() {
    let bars = bars_from_closes(&[20.0; 30]);
    let a = atr(&bars, 14);
    assert!((a[14].unwrap() - 2.0).abs() < 1e-12);
    assert!((latest(&a).unwrap() - 2.0).abs() < 1e-12);
}

#[test]
fn test_obv_direction() {
    let bars = bars_from_closes(&[10.0, 11.0, 11.0, 10.0]);
    let o: Vec<f64> = obv(&bars).into_iter().flatten().collect();
    assert_eq!(o, vec![0.0, 1001.0, 1001.0, 1001.0 - 1003.0]);
}

#[test]
fn test_ad_line_zero_range_bar() {
    let bar = PriceBar {
        date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        open: 5.0,
        high: 5.0,
        low: 5.0,
        close: 5.0,
        volume: 10_000.0,
    };
    let bars = Ohlcv::from_bars(&[bar]).unwrap();
    assert_eq!(accumulation_distribution(&bars), vec![Some(0.0)]);
}

#[test]
fn test_cmf_close_at_high_is_positive_one() {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let bars: Vec<PriceBar> = (0..25)
        .map(|i| PriceBar {
            date: start + Duration::days(i),
            open: 10.0,
            high: 11.0,
            low: 9.0,
            close: 11.0,
            volume: 500.0,
        })
        .collect();
    let ohlcv = Ohlcv::from_bars(&bars).unwrap();
    let cmf = chaikin_money_flow(&ohlcv, 20);
    assert_eq!(leading_none(&cmf), 19);
    assert!((latest(&cmf).unwrap() - 1.0).abs() < 1e-12);
}

#[test]
fn test_cmf_zero_volume_undefined() {
    let mut ohlcv = bars_from_closes(&[10.0; 25]);
    ohlcv.volume = vec![0.0; 25];
    assert!(chaikin_money_flow(&ohlcv, 20).iter().all(Option::is_none));
    assert!(vwap(&ohlcv).iter().all(Option::is_none));
}

#[test]
fn test_vwap_constant_typical_price() {
    let bars = bars_from_closes(&[25.0; 10]);
    for v in vwap(&bars) {
        assert!((v.unwrap() - 25.0).abs() < 1e-12);
    }
}

#[test]
fn test_adx_strong_uptrend() {
    let closes: Vec<f64> = (0..60).map(|i| 100.0 + 2.0 * i as f64).collect();
    let bars = bars_from_closes(&closes);
    let a = adx(&bars, 14);
    let (pdi, mdi) = (latest(&a.plus_di).unwrap(), latest(&a.minus_di).unwrap());
    assert!(pdi > mdi, "+DI {pdi} should exceed -DI {mdi}");
    assert!(latest(&a.adx).unwrap() > 20.0);
}

#[test]
fn test_stochastic_bounds_and_flat_window() {
    let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
    let mut bars = bars_from_closes(&closes);
    // Close on the high of every bar of a rising market.
    bars.close = bars.high.clone();
    let s = stochastic(&bars, 14, 3);
    assert!((latest(&s.k).unwrap() - 100.0).abs() < 1e-9);
    assert!(s.d[15].is_some());
    assert!(s.d[14].is_none());

    let mut flat = bars_from_closes(&[10.0; 20]);
    flat.high = vec![10.0; 20];
    flat.low = vec![10.0; 20];
    assert!(stochastic(&flat, 14, 3).k.iter().all(Option::is_none));
}
