//! Store-neutral document values and upsert instructions.
//!
//! An [`UpsertOp`] carries four independent effect groups that a
//! [`DocumentStore`](crate::storage::DocumentStore) applies in one step:
//!
//! - `set_on_insert`: written only when the identity is new
//! - `set`: always overwritten
//! - `max`: replaced with `max(current, new)`
//! - `add_to_set`: appended to an array field unless already present

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// A single field value as seen by a collection store.
///
/// In JSON, times are written as `{"$date": "<RFC 3339>"}` so they never
/// collide with strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Time(#[serde(with = "tagged_date")] DateTime<Utc>),
    Array(Vec<FieldValue>),
}

mod tagged_date {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Tagged {
        #[serde(rename = "$date")]
        date: DateTime<Utc>,
    }

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        Tagged { date: *date }.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        Tagged::deserialize(d).map(|t| t.date)
    }
}

impl FieldValue {
    /// Ordering used by the `max` group. `None` when the kinds are not comparable.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        use FieldValue::*;
        match (self, other) {
            (Null, Null) => Some(Ordering::Equal),
            (Null, _) => Some(Ordering::Less),
            (_, Null) => Some(Ordering::Greater),
            (Int(a), Int(b)) => Some(a.cmp(b)),
            (Float(a), Float(b)) => a.partial_cmp(b),
            (Int(a), Float(b)) => (*a as f64).partial_cmp(b),
            (Float(a), Int(b)) => a.partial_cmp(&(*b as f64)),
            (Time(a), Time(b)) => Some(a.cmp(b)),
            (Str(a), Str(b)) => Some(a.cmp(b)),
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// True when this is an array holding `value`.
    pub fn contains(&self, value: &FieldValue) -> bool {
        match self {
            FieldValue::Array(items) => items.contains(value),
            _ => false,
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Time(v)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(FieldValue::Null, Into::into)
    }
}

/// A stored document keyed by field name.
pub type Document = BTreeMap<String, FieldValue>;

/// Ordered list of field assignments in one effect group.
pub type Fields = Vec<(&'static str, FieldValue)>;

/// Field holding the identity in every stored document.
pub const ID_FIELD: &str = "_id";

/// What a single upsert did to the target collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Identity was new; the document was created.
    Inserted,
    /// Identity existed; no field changed.
    Matched,
    /// Identity existed and at least one field changed.
    MatchedAndModified,
}

/// Aggregate counts of one bulk submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkWriteSummary {
    pub matched: u64,
    pub modified: u64,
    pub upserted: u64,
}

impl BulkWriteSummary {
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.upserted += 1,
            UpsertOutcome::Matched => self.matched += 1,
            UpsertOutcome::MatchedAndModified => {
                self.matched += 1;
                self.modified += 1;
            }
        }
    }
}

/// A conditional merge instruction that is safe whether or not the identity exists.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOp {
    pub id: String,
    pub set_on_insert: Fields,
    pub set: Fields,
    pub max: Fields,
    pub add_to_set: Fields,
}

impl UpsertOp {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            set_on_insert: Vec::new(),
            set: Vec::new(),
            max: Vec::new(),
            add_to_set: Vec::new(),
        }
    }

    /// Apply this instruction to an in-memory collection.
    ///
    /// The caller must hold whatever lock guards `collection` for the whole
    /// call; the four groups are applied together.
    pub fn apply(&self, collection: &mut BTreeMap<String, Document>) -> Result<UpsertOutcome> {
        let Some(doc) = collection.get_mut(&self.id) else {
            collection.insert(self.id.clone(), self.fresh_document());
            return Ok(UpsertOutcome::Inserted);
        };

        // Reject before touching anything so a failed instruction leaves no trace.
        for (field, _) in &self.add_to_set {
            if let Some(other) = doc.get(*field).filter(|v| !matches!(v, FieldValue::Array(_))) {
                return Err(AppError::store(format!(
                    "cannot add to non-array field '{}' ({:?}) of {}",
                    field, other, self.id
                )));
            }
        }

        let mut changed = false;

        for (field, value) in &self.set {
            if doc.get(*field) != Some(value) {
                doc.insert(field.to_string(), value.clone());
                changed = true;
            }
        }

        for (field, value) in &self.max {
            let replace = match doc.get(*field) {
                None => true,
                Some(current) => value.compare(current) == Some(Ordering::Greater),
            };
            if replace {
                doc.insert(field.to_string(), value.clone());
                changed = true;
            }
        }

        for (field, value) in &self.add_to_set {
            match doc.get_mut(*field) {
                None => {
                    doc.insert(field.to_string(), FieldValue::Array(vec![value.clone()]));
                    changed = true;
                }
                Some(FieldValue::Array(items)) => {
                    if !items.contains(value) {
                        items.push(value.clone());
                        changed = true;
                    }
                }
                Some(_) => {}
            }
        }

        Ok(if changed {
            UpsertOutcome::MatchedAndModified
        } else {
            UpsertOutcome::Matched
        })
    }

    fn fresh_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert(ID_FIELD.to_string(), FieldValue::Str(self.id.clone()));
        for (field, value) in self.set_on_insert.iter().chain(&self.set).chain(&self.max) {
            doc.insert(field.to_string(), value.clone());
        }
        for (field, value) in &self.add_to_set {
            doc.insert(field.to_string(), FieldValue::Array(vec![value.clone()]));
        }
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(score: i64, label: Option<&str>, created: i64) -> UpsertOp {
        let mut op = UpsertOp::new("abc123");
        op.set_on_insert.push(("created_utc", FieldValue::Int(created)));
        op.set.push(("score", FieldValue::Int(score)));
        op.max.push(("score_max", FieldValue::Int(score)));
        if let Some(label) = label {
            op.add_to_set.push(("seen_in", label.into()));
        }
        op
    }

    #[test]
    fn test_date_like_string_stays_a_string() {
        let title = FieldValue::Str("2024-01-01T00:00:00Z".into());
        let json = serde_json::to_string(&title).unwrap();
        assert_eq!(json, r#""2024-01-01T00:00:00Z""#);
        assert_eq!(serde_json::from_str::<FieldValue>(&json).unwrap(), title);

        let seen: FieldValue = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
            .into();
        let json = serde_json::to_string(&seen).unwrap();
        assert_eq!(json, r#"{"$date":"2024-01-01T00:00:00Z"}"#);
        assert_eq!(serde_json::from_str::<FieldValue>(&json).unwrap(), seen);
    }

    #[test]
    fn test_insert_then_reapply_is_noop() {
        let mut coll = BTreeMap::new();
        let first = op(10, Some("hot"), 100);

        assert_eq!(first.apply(&mut coll).unwrap(), UpsertOutcome::Inserted);
        let snapshot = coll.clone();
        assert_eq!(first.apply(&mut coll).unwrap(), UpsertOutcome::Matched);
        assert_eq!(coll, snapshot);
    }

    #[test]
    fn test_max_never_decreases() {
        let mut coll = BTreeMap::new();
        op(10, None, 1).apply(&mut coll).unwrap();
        op(5, None, 1).apply(&mut coll).unwrap();

        let doc = &coll["abc123"];
        assert_eq!(doc["score"], FieldValue::Int(5));
        assert_eq!(doc["score_max"], FieldValue::Int(10));
    }

    #[test]
    fn test_set_on_insert_is_immutable() {
        let mut coll = BTreeMap::new();
        op(1, None, 100).apply(&mut coll).unwrap();
        op(1, None, 999).apply(&mut coll).unwrap();
        assert_eq!(coll["abc123"]["created_utc"], FieldValue::Int(100));
    }

    #[test]
    fn test_add_to_set_dedupes() {
        let mut coll = BTreeMap::new();
        for label in ["hot", "new", "hot"] {
            op(1, Some(label), 1).apply(&mut coll).unwrap();
        }
        assert_eq!(
            coll["abc123"]["seen_in"],
            FieldValue::Array(vec!["hot".into(), "new".into()])
        );
    }

    #[test]
    fn test_add_to_set_rejects_scalar_field() {
        let mut coll = BTreeMap::new();
        let mut doc = Document::new();
        doc.insert("seen_in".into(), FieldValue::Str("hot".into()));
        coll.insert("abc123".to_string(), doc);

        assert!(op(1, Some("new"), 1).apply(&mut coll).is_err());
    }

    #[test]
    fn test_mixed_numeric_compare() {
        assert_eq!(
            FieldValue::Int(2).compare(&FieldValue::Float(1.5)),
            Some(Ordering::Greater)
        );
        assert_eq!(FieldValue::Str("a".into()).compare(&FieldValue::Int(1)), None);
    }

    #[test]
    fn test_untagged_json_shape() {
        let json = serde_json::to_value(FieldValue::Array(vec![
            FieldValue::Int(3),
            FieldValue::Null,
            FieldValue::Str("x".into()),
        ]))
        .unwrap();
        assert_eq!(json, serde_json::json!([3, null, "x"]));

        let back: FieldValue = serde_json::from_value(serde_json::json!(0.5)).unwrap();
        assert_eq!(back, FieldValue::Float(0.5));
    }

    #[test]
    fn test_summary_record() {
        let mut summary = BulkWriteSummary::default();
        summary.record(UpsertOutcome::Inserted);
        summary.record(UpsertOutcome::Matched);
        summary.record(UpsertOutcome::MatchedAndModified);
        assert_eq!(
            summary,
            BulkWriteSummary {
                matched: 2,
                modified: 1,
                upserted: 1
            }
        );
    }
}
