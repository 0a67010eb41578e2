//! Symptom record model and the `issue.detected` payload boundary.
//!
//! Detector payloads are loosely typed JSON; every field is defaulted here so
//! downstream policy code only ever sees a well-formed record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Incident severity reported by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    /// Parses a detector-supplied label, defaulting to `Medium`.
    pub fn parse_or_default(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "critical" => Self::Critical,
            "high" => Self::High,
            "low" => Self::Low,
            _ => Self::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// User-facing blast radius reported by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    High,
    Medium,
    Low,
}

impl Impact {
    /// Parses a detector-supplied label, defaulting to `Medium`.
    pub fn parse_or_default(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "high" => Self::High,
            "low" => Self::Low,
            _ => Self::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// A single observed symptom: the ephemeral input to state abstraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymptomRecord {
    pub error_kind: String,
    pub service: String,
    pub severity: Severity,
    pub user_impact: Impact,
    #[serde(default)]
    pub details: Map<String, Value>,
    pub detected_at: DateTime<Utc>,
}

impl SymptomRecord {
    /// Creates a record with explicit core fields and empty details.
    pub fn new(error_kind: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            error_kind: error_kind.into(),
            service: service.into(),
            severity: Severity::Medium,
            user_impact: Impact::Medium,
            details: Map::new(),
            detected_at: Utc::now(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_impact(mut self, user_impact: Impact) -> Self {
        self.user_impact = user_impact;
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    /// Builds a record from a raw `issue.detected` payload.
    ///
    /// Total: missing or malformed fields fall back to defaults
    /// (`error_kind` → "unknown", `severity` → medium, `user_impact` →
    /// medium, `timestamp` → now) rather than failing.
    pub fn from_payload(payload: &Value) -> Self {
        let error_kind = payload
            .get("error_kind")
            .and_then(Value::as_str)
            .filter(|kind| !kind.trim().is_empty())
            .unwrap_or("unknown")
            .to_string();
        let service = payload
            .get("service")
            .and_then(Value::as_str)
            .filter(|service| !service.trim().is_empty())
            .unwrap_or("unknown")
            .to_string();
        let severity = payload
            .get("severity")
            .and_then(Value::as_str)
            .map(Severity::parse_or_default)
            .unwrap_or(Severity::Medium);
        let user_impact = payload
            .get("user_impact")
            .and_then(Value::as_str)
            .map(Impact::parse_or_default)
            .unwrap_or(Impact::Medium);
        let details = payload
            .get("details")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let detected_at = parse_detection_timestamp(payload.get("timestamp"));

        Self {
            error_kind,
            service,
            severity,
            user_impact,
            details,
            detected_at,
        }
    }

    /// Serializes the record back into the payload shape used on the bus.
    pub fn to_payload(&self) -> Value {
        serde_json::json!({
            "error_kind": self.error_kind,
            "service": self.service,
            "severity": self.severity.as_str(),
            "user_impact": self.user_impact.as_str(),
            "details": Value::Object(self.details.clone()),
            "timestamp": self.detected_at.to_rfc3339(),
        })
    }

    /// Lowercased rendering of the detail map used by substring rules.
    pub(crate) fn details_text(&self) -> String {
        Value::Object(self.details.clone())
            .to_string()
            .to_ascii_lowercase()
    }
}

fn parse_detection_timestamp(value: Option<&Value>) -> DateTime<Utc> {
    match value {
        Some(Value::String(text)) => DateTime::parse_from_rfc3339(text)
            .map(|parsed| parsed.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        Some(Value::Number(number)) => number
            .as_f64()
            .and_then(|seconds| {
                let millis = (seconds * 1_000.0) as i64;
                DateTime::<Utc>::from_timestamp_millis(millis)
            })
            .unwrap_or_else(Utc::now),
        _ => Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Impact, Severity, SymptomRecord};

    #[test]
    fn from_payload_fills_missing_fields_with_defaults() {
        let record = SymptomRecord::from_payload(&json!({}));
        assert_eq!(record.error_kind, "unknown");
        assert_eq!(record.service, "unknown");
        assert_eq!(record.severity, Severity::Medium);
        assert_eq!(record.user_impact, Impact::Medium);
        assert!(record.details.is_empty());
    }

    #[test]
    fn from_payload_reads_core_fields() {
        let record = SymptomRecord::from_payload(&json!({
            "error_kind": "service_down",
            "service": "api_gateway",
            "severity": "critical",
            "user_impact": "high",
            "details": {"status": "unreachable"},
        }));
        assert_eq!(record.error_kind, "service_down");
        assert_eq!(record.service, "api_gateway");
        assert_eq!(record.severity, Severity::Critical);
        assert_eq!(record.user_impact, Impact::High);
        assert_eq!(
            record.details.get("status").and_then(|v| v.as_str()),
            Some("unreachable")
        );
    }

    #[test]
    fn unrecognized_labels_fall_back_to_medium() {
        assert_eq!(Severity::parse_or_default("catastrophic"), Severity::Medium);
        assert_eq!(Impact::parse_or_default("severe"), Impact::Medium);
    }

    #[test]
    fn numeric_and_rfc3339_timestamps_both_parse() {
        let from_number = SymptomRecord::from_payload(&json!({"timestamp": 1_700_000_000.5}));
        assert_eq!(from_number.detected_at.timestamp(), 1_700_000_000);

        let from_text =
            SymptomRecord::from_payload(&json!({"timestamp": "2026-01-02T03:04:05Z"}));
        assert_eq!(from_text.detected_at.timestamp(), 1_767_323_045);
    }

    #[test]
    fn payload_round_trip_preserves_core_fields() {
        let record = SymptomRecord::new("service_down", "checkout")
            .with_severity(Severity::High)
            .with_impact(Impact::Low)
            .with_detail("status", json!("flapping"));
        let reparsed = SymptomRecord::from_payload(&record.to_payload());
        assert_eq!(reparsed.error_kind, record.error_kind);
        assert_eq!(reparsed.service, record.service);
        assert_eq!(reparsed.severity, record.severity);
        assert_eq!(reparsed.user_impact, record.user_impact);
        assert_eq!(reparsed.details, record.details);
    }
}
