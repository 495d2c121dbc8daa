// Descriptive statistics over a 1-D dataset.
//
// Conventions follow the usual scientific defaults: sample std/variance
// (ddof 1), linearly interpolated percentiles, biased moment estimators
// for skewness and excess kurtosis, population std for z-scores.

use anyhow::{bail, Result};
use serde_json::{json, Map, Value};

use crate::expr::format_sig;
use crate::tools::handlers::Handled;
use crate::tools::types::{number_list, string_list};

pub(crate) fn statistics_compute(args: &Value) -> Result<Handled> {
    let data = number_list(args, "data")?;
    if data.is_empty() {
        bail!("data must not be empty");
    }

    let operations: Vec<String> = match string_list(args, "operations") {
        Ok(ops) if !ops.is_empty() => ops.iter().map(|o| o.to_lowercase()).collect(),
        _ => vec!["describe".to_string()],
    };
    let describe = operations.iter().any(|o| o == "describe");
    let wants = |name: &str| describe || operations.iter().any(|o| o == name);

    let mut results = Map::new();
    let mut add = |key: &str, value: Value| {
        results.insert(key.to_string(), value);
    };

    let n = data.len();
    let mean = mean(&data);

    if wants("mean") {
        add("mean", json!(mean));
    }
    if wants("median") {
        add("median", json!(median(&data)));
    }
    if wants("std") {
        add("std", json!(sample_std(&data)));
    }
    if wants("var") {
        add("variance", json!(sample_variance(&data)));
    }
    if wants("min") {
        add("min", json!(data.iter().copied().fold(f64::INFINITY, f64::min)));
    }
    if wants("max") {
        add("max", json!(data.iter().copied().fold(f64::NEG_INFINITY, f64::max)));
    }
    if wants("sum") {
        add("sum", json!(data.iter().sum::<f64>()));
    }
    if wants("skew") {
        add("skewness", json!(skewness(&data)));
    }
    if wants("kurtosis") {
        add("kurtosis", json!(kurtosis(&data)));
    }
    if wants("percentile_25") {
        add("Q1 (25%)", json!(percentile(&data, 25.0)));
    }
    if wants("percentile_75") {
        add("Q3 (75%)", json!(percentile(&data, 75.0)));
    }
    if wants("iqr") {
        add("IQR", json!(percentile(&data, 75.0) - percentile(&data, 25.0)));
    }
    if operations.iter().any(|o| o == "zscore") {
        let std = population_std(&data);
        if std == 0.0 {
            bail!("z-scores are undefined for constant data");
        }
        let scores: Vec<f64> = data.iter().map(|x| (x - mean) / std).collect();
        add("z-scores", json!(scores));
    }
    if describe {
        add("n", json!(n));
    }

    if results.is_empty() {
        bail!("no recognized operations requested");
    }

    let lines: Vec<String> = results
        .iter()
        .map(|(key, value)| match value.as_f64() {
            Some(v) => format!("- **{}**: {}", key, format_sig(v, 8)),
            None => format!("- **{}**: {}", key, value),
        })
        .collect();
    Ok((lines.join("\n"), Some(Value::Object(results))))
}

fn mean(data: &[f64]) -> f64 {
    data.iter().sum::<f64>() / data.len() as f64
}

fn median(data: &[f64]) -> f64 {
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        0.5 * (sorted[mid - 1] + sorted[mid])
    }
}

fn sample_variance(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let m = mean(data);
    data.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / (data.len() - 1) as f64
}

fn sample_std(data: &[f64]) -> f64 {
    sample_variance(data).sqrt()
}

fn population_std(data: &[f64]) -> f64 {
    let m = mean(data);
    (data.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / data.len() as f64).sqrt()
}

/// Linearly interpolated percentile over the sorted data.
fn percentile(data: &[f64], p: f64) -> f64 {
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let below = rank.floor() as usize;
    let above = rank.ceil() as usize;
    let fraction = rank - below as f64;
    sorted[below] + fraction * (sorted[above] - sorted[below])
}

fn central_moment(data: &[f64], order: i32) -> f64 {
    let m = mean(data);
    data.iter().map(|x| (x - m).powi(order)).sum::<f64>() / data.len() as f64
}

fn skewness(data: &[f64]) -> f64 {
    let m2 = central_moment(data, 2);
    if m2 == 0.0 {
        return 0.0;
    }
    central_moment(data, 3) / m2.powf(1.5)
}

/// Excess kurtosis (normal distribution = 0).
fn kurtosis(data: &[f64]) -> f64 {
    let m2 = central_moment(data, 2);
    if m2 == 0.0 {
        return 0.0;
    }
    central_moment(data, 4) / (m2 * m2) - 3.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_defaults() {
        let (display, raw) = statistics_compute(&json!({
            "data": [1.0, 2.0, 3.0, 4.0, 5.0]
        }))
        .unwrap();
        assert!(display.contains("**mean**: 3"));
        assert!(display.contains("**median**: 3"));
        let raw = raw.unwrap();
        assert_eq!(raw["n"].as_u64().unwrap(), 5);
        assert!((raw["std"].as_f64().unwrap() - 1.5811388).abs() < 1e-6);
    }

    #[test]
    fn test_selected_operations_only() {
        let (_, raw) = statistics_compute(&json!({
            "data": [1.0, 2.0, 3.0, 4.0],
            "operations": ["mean", "sum"]
        }))
        .unwrap();
        let raw = raw.unwrap();
        assert_eq!(raw["mean"].as_f64().unwrap(), 2.5);
        assert_eq!(raw["sum"].as_f64().unwrap(), 10.0);
        assert!(raw.get("median").is_none());
    }

    #[test]
    fn test_percentiles_interpolate() {
        assert_eq!(percentile(&[1.0, 2.0, 3.0, 4.0], 25.0), 1.75);
        assert_eq!(percentile(&[1.0, 2.0, 3.0, 4.0], 50.0), 2.5);
    }

    #[test]
    fn test_even_median() {
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn test_zscores() {
        let (_, raw) = statistics_compute(&json!({
            "data": [2.0, 4.0, 6.0],
            "operations": ["zscore"]
        }))
        .unwrap();
        let scores = raw.unwrap()["z-scores"].clone();
        assert!((scores[1].as_f64().unwrap()).abs() < 1e-12);
    }

    #[test]
    fn test_symmetric_data_has_zero_skewness() {
        let (_, raw) = statistics_compute(&json!({
            "data": [1.0, 2.0, 3.0],
            "operations": ["skew"]
        }))
        .unwrap();
        assert!(raw.unwrap()["skewness"].as_f64().unwrap().abs() < 1e-12);
    }

    #[test]
    fn test_empty_data_rejected() {
        assert!(statistics_compute(&json!({"data": []})).is_err());
    }
}
