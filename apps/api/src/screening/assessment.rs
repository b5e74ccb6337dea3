//! Normalisation of the model's screening JSON into a `ScreeningResult`.
//!
//! Models drift from the requested schema in predictable ways: fractional
//! scores, scores on another scale, numbers as strings, lists as one string.
//! Everything here is tolerant of those shapes and strict about the output.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Advance,
    Consider,
    Reject,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Advance => "advance",
            Recommendation::Consider => "consider",
            Recommendation::Reject => "reject",
        }
    }

    pub fn from_score(score: u8) -> Self {
        match score {
            75..=u8::MAX => Recommendation::Advance,
            50..=74 => Recommendation::Consider,
            _ => Recommendation::Reject,
        }
    }

    fn parse_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "advance" | "strong_yes" | "yes" | "hire" | "proceed" => Some(Recommendation::Advance),
            "consider" | "maybe" | "hold" => Some(Recommendation::Consider),
            "reject" | "no" | "strong_no" | "decline" => Some(Recommendation::Reject),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScreeningResult {
    pub score: u8,
    pub summary: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub recommendation: Recommendation,
}

/// Converts raw model output into a validated result.
pub fn normalize(raw: &Value) -> Result<ScreeningResult, String> {
    let obj = raw
        .as_object()
        .ok_or_else(|| "screening output is not a JSON object".to_string())?;

    let score_value = obj.get("score");
    let raw_score = score_value
        .and_then(number_like)
        .ok_or_else(|| "screening output has no numeric score".to_string())?;
    let scale = obj.get("out_of").and_then(number_like).filter(|s| *s > 0.0);
    let score = normalize_score(raw_score, scale, score_value.is_some_and(is_decimal));

    let summary = obj
        .get("summary")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "screening output has no summary".to_string())?
        .to_string();

    let recommendation = obj
        .get("recommendation")
        .and_then(Value::as_str)
        .and_then(Recommendation::parse_loose)
        .unwrap_or_else(|| Recommendation::from_score(score));

    Ok(ScreeningResult {
        score,
        summary,
        strengths: string_list(obj.get("strengths")),
        weaknesses: string_list(obj.get("weaknesses")),
        recommendation,
    })
}

/// Decimal scores in 0..=1 are fractions; integers are already percentages.
fn normalize_score(raw: f64, scale: Option<f64>, decimal: bool) -> u8 {
    let percent = match scale {
        Some(scale) => raw / scale * 100.0,
        None if decimal && (0.0..=1.0).contains(&raw) => raw * 100.0,
        None => raw,
    };
    percent.round().clamp(0.0, 100.0) as u8
}

/// Whether the score was written with a decimal point, e.g. `1.0` or `"0.5"`.
fn is_decimal(v: &Value) -> bool {
    match v {
        Value::Number(n) => n.is_f64(),
        Value::String(s) => s.contains('.'),
        _ => false,
    }
}

fn number_like(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }
    .filter(|n: &f64| n.is_finite())
}

fn string_list(v: Option<&Value>) -> Vec<String> {
    let items: Vec<String> = match v {
        Some(Value::Array(arr)) => arr
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(o) => o
                    .get("text")
                    .or_else(|| o.get("point"))
                    .and_then(Value::as_str)
                    .map(String::from),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => s.lines().map(String::from).collect(),
        _ => Vec::new(),
    };
    items
        .into_iter()
        .map(|s| s.trim().trim_start_matches(['-', '*', '•']).trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_well_formed_output() {
        let raw = json!({
            "score": 82,
            "summary": "Strong Rust background.",
            "strengths": ["Shipped a distributed cache"],
            "weaknesses": ["Limited frontend exposure"],
            "recommendation": "advance"
        });
        let result = normalize(&raw).unwrap();
        assert_eq!(result.score, 82);
        assert_eq!(result.recommendation, Recommendation::Advance);
        assert_eq!(result.strengths, vec!["Shipped a distributed cache"]);
    }

    #[test]
    fn test_fractional_score_scaled() {
        let raw = json!({"score": 0.64, "summary": "ok"});
        let result = normalize(&raw).unwrap();
        assert_eq!(result.score, 64);
        assert_eq!(result.recommendation, Recommendation::Consider);
    }

    #[test]
    fn test_decimal_one_is_full_marks() {
        let full = normalize(&json!({"score": 1.0, "summary": "ok"})).unwrap();
        assert_eq!(full.score, 100);
        assert_eq!(full.recommendation, Recommendation::Advance);

        let low = normalize(&json!({"score": 1, "summary": "ok"})).unwrap();
        assert_eq!(low.score, 1);
        assert_eq!(low.recommendation, Recommendation::Reject);

        assert_eq!(normalize(&json!({"score": "0.9", "summary": "ok"})).unwrap().score, 90);
    }

    #[test]
    fn test_explicit_scale_respected() {
        let raw = json!({"score": "7", "out_of": 10, "summary": "ok"});
        assert_eq!(normalize(&raw).unwrap().score, 70);
    }

    #[test]
    fn test_score_clamped() {
        assert_eq!(normalize(&json!({"score": 140, "summary": "x"})).unwrap().score, 100);
        assert_eq!(normalize(&json!({"score": -3, "summary": "x"})).unwrap().score, 0);
    }

    #[test]
    fn test_integer_one_is_not_a_fraction() {
        assert_eq!(normalize(&json!({"score": 1, "summary": "x"})).unwrap().score, 1);
    }

    #[test]
    fn test_string_lists_split_and_cleaned() {
        let raw = json!({
            "score": "55%",
            "summary": "mixed",
            "strengths": "- Clear communicator\n- Owns incidents\n",
            "weaknesses": [{"text": "No Kubernetes"}, 3, " "]
        });
        let result = normalize(&raw).unwrap();
        assert_eq!(result.score, 55);
        assert_eq!(result.strengths, vec!["Clear communicator", "Owns incidents"]);
        assert_eq!(result.weaknesses, vec!["No Kubernetes"]);
    }

    #[test]
    fn test_loose_recommendation_labels() {
        let raw = json!({"score": 90, "summary": "x", "recommendation": "Strong No"});
        assert_eq!(normalize(&raw).unwrap().recommendation, Recommendation::Reject);
    }

    #[test]
    fn test_missing_score_or_summary_is_error() {
        assert!(normalize(&json!({"summary": "x"})).is_err());
        assert!(normalize(&json!({"score": 50, "summary": "  "})).is_err());
        assert!(normalize(&json!([1, 2])).is_err());
    }
}
