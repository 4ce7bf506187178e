//! Training result payloads as returned by the training service.
//!
//! A result is immutable once received. Optional fields stay optional all
//! the way to the presenter, which renders them as "N/A".

use anyhow::{anyhow, Context, Result};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;

// =============================================================================
// Labels
// =============================================================================

/// A class or cluster label as it appeared in the payload.
///
/// Labels keep their JSON type: the string `"1"` and the number `1` are
/// different labels. Numbers are held by a canonical text of their value,
/// so `1`, `1.0` and `1e0` are the same label and labels can be hashed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Label {
    Text(String),
    Number(String),
    Bool(bool),
    Null,
}

impl Label {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(s) => Label::Text(s.clone()),
            Value::Number(n) => Label::Number(canonical_number(n)),
            Value::Bool(b) => Label::Bool(*b),
            Value::Null => Label::Null,
            other => Label::Text(other.to_string()),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Label::Text(s) => Value::String(s.clone()),
            Label::Number(n) => serde_json::from_str::<serde_json::Number>(n)
                .map(Value::Number)
                .unwrap_or_else(|_| Value::String(n.clone())),
            Label::Bool(b) => Value::Bool(*b),
            Label::Null => Value::Null,
        }
    }

    /// Equality that lets `"1"` match `1`, as the console's prediction
    /// table does when marking hits.
    pub fn loosely_eq(&self, other: &Label) -> bool {
        if self == other {
            return true;
        }
        match (self, other) {
            (Label::Null, _) | (_, Label::Null) => false,
            _ => match (coerce_number(&self.to_value()), coerce_number(&other.to_value())) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

/// Integral floats collapse to their integer text; `-0.0` is `0`.
fn canonical_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < MAX_SAFE_INTEGER => (f as i64).to_string(),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

/// 2^53: every integral float below this has an exact `i64` form.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Text(s) | Label::Number(s) => f.write_str(s),
            Label::Bool(b) => write!(f, "{}", b),
            Label::Null => f.write_str("null"),
        }
    }
}

impl<'de> Deserialize<'de> for Label {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(|v| Label::from_value(&v))
    }
}

impl Serialize for Label {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

// =============================================================================
// Numeric coercion
// =============================================================================

/// Coerce a loosely typed payload value to a finite number.
///
/// Numbers pass through; booleans are 1/0; null and blank strings are 0;
/// other strings are parsed after trimming. Arrays, objects, unparseable
/// strings and non-finite results yield `None`.
pub fn coerce_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Null => 0.0,
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                0.0
            } else {
                t.parse::<f64>().ok()?
            }
        }
        Value::Array(_) | Value::Object(_) => return None,
    };
    n.is_finite().then_some(n)
}

// =============================================================================
// Insertion-ordered string maps
// =============================================================================

/// JSON object that keeps the key order of the payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ordered<V>(pub Vec<(String, V)>);

impl<V> Ordered<V> {
    pub fn get(&self, key: &str) -> Option<&V> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

struct OrderedVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedVisitor<V> {
    type Value = Ordered<V>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((k, v)) = access.next_entry::<String, V>()? {
            entries.push((k, v));
        }
        Ok(Ordered(entries))
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for Ordered<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(OrderedVisitor(PhantomData))
    }
}

impl<V: Serialize> Serialize for Ordered<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

// =============================================================================
// Result payloads
// =============================================================================

/// Per-class scores from the service's classification report.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ReportRow {
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    #[serde(rename = "f1-score")]
    pub f1_score: Option<f64>,
    pub support: Option<f64>,
}

/// Classification report keyed by class label, plus the `accuracy`,
/// `macro avg` and `weighted avg` summary entries.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassificationReport(pub Ordered<Value>);

impl ClassificationReport {
    /// Rows in payload order, skipping the scalar `accuracy` entry and any
    /// entry that is not a score object.
    pub fn rows(&self) -> Vec<(&str, ReportRow)> {
        self.0
            .iter()
            .filter(|(k, _)| *k != "accuracy")
            .filter_map(|(k, v)| serde_json::from_value::<ReportRow>(v.clone()).ok().map(|r| (k, r)))
            .collect()
    }

    pub fn row(&self, key: &str) -> Option<ReportRow> {
        self.0.get(key).and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn weighted_avg(&self) -> Option<ReportRow> {
        self.row("weighted avg")
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationResult {
    pub accuracy: Option<f64>,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub f1_score: Option<f64>,
    pub report: Option<ClassificationReport>,
    /// Server-side matrix; display always recomputes from the label series.
    pub confusion_matrix: Option<Vec<Vec<u64>>>,
    pub predictions: Option<Vec<Label>>,
    pub actual: Option<Vec<Label>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegressionResult {
    pub mse: Option<f64>,
    pub rmse: Option<f64>,
    pub mae: Option<f64>,
    pub r2_score: Option<f64>,
    pub coefficients: Option<Vec<Value>>,
    pub intercept: Option<Value>,
    /// Loosely typed; see [`coerce_number`].
    pub predictions: Option<Vec<Value>>,
    pub actual: Option<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringResult {
    pub algorithm: Option<String>,
    pub n_clusters: Option<u64>,
    pub silhouette: Option<f64>,
    pub cluster_counts: Option<Ordered<u64>>,
    pub labels_preview: Option<Vec<Label>>,
    pub centers: Option<Vec<Vec<f64>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RawResult {
    Classification(ClassificationResult),
    Regression(RegressionResult),
    Clustering(ClusteringResult),
}

impl RawResult {
    pub fn kind(&self) -> &'static str {
        match self {
            RawResult::Classification(_) => "classification",
            RawResult::Regression(_) => "regression",
            RawResult::Clustering(_) => "clustering",
        }
    }

    pub fn task_label(&self) -> &'static str {
        match self {
            RawResult::Classification(_) => "Classification",
            RawResult::Regression(_) => "Regression",
            RawResult::Clustering(_) => "Clustering",
        }
    }

    /// Number of held-out samples the service scored, if it sent them.
    pub fn samples_used(&self) -> Option<usize> {
        let n = match self {
            RawResult::Classification(c) => c.actual.as_ref().map(Vec::len),
            RawResult::Regression(r) => r.actual.as_ref().map(Vec::len),
            RawResult::Clustering(_) => None,
        };
        n.filter(|n| *n > 0)
    }
}

// =============================================================================
// Response envelope
// =============================================================================

/// Body returned by the training endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrainResponse {
    Failure {
        error: String,
    },
    Success {
        #[serde(default)]
        status: Option<String>,
        results: RawResult,
    },
}

impl TrainResponse {
    pub fn into_result(self) -> Result<RawResult> {
        match self {
            TrainResponse::Failure { error } => Err(anyhow!("training failed: {}", error)),
            TrainResponse::Success { results, .. } => Ok(results),
        }
    }
}

/// Decode a saved response body: either the endpoint envelope or a bare
/// result object.
pub fn decode_payload(bytes: &[u8]) -> Result<RawResult> {
    let value: Value = serde_json::from_slice(bytes).context("payload is not valid JSON")?;
    if let Some(err) = value.get("error").filter(|e| !e.is_null()) {
        let msg = err.as_str().map(str::to_string).unwrap_or_else(|| err.to_string());
        return Err(anyhow!("training failed: {}", msg));
    }
    let body = match value.get("results") {
        Some(results) => results.clone(),
        None => value,
    };
    serde_json::from_value(body).context("payload is not a recognized training result")
}
