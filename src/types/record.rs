//! Feature record decoding.
//!
//! Clients send one tabular row as JSON. The shapes produced by the usual
//! dataframe serializers are accepted, as long as they describe exactly one
//! row of numeric fields:
//!
//! - flat object: `{"V1": -1.35, "V2": 0.07}`
//! - records: `[{"V1": -1.35, "V2": 0.07}]`
//! - columns: `{"V1": {"0": -1.35}, "V2": {"0": 0.07}}`
//! - split: `{"columns": ["V1", "V2"], "index": [0], "data": [[-1.35, 0.07]]}`
//!
//! Field order is the order in which fields appear in the document. No schema
//! is enforced here; the caller must send fields in the order the models expect.

use crate::error::RequestDecodeError;
use serde_json::{Map, Value};

/// One row of named numeric features, in document order
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    names: Vec<String>,
    values: Vec<f64>,
}

impl FeatureRecord {
    /// Build a record from (name, value) pairs.
    ///
    /// Fails if any value is not finite, or too large in magnitude to
    /// survive the conversion to `f32` the model runtimes take.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self, RequestDecodeError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut record = Self {
            names: Vec::new(),
            values: Vec::new(),
        };
        for (name, value) in pairs {
            let name = name.into();
            if !value.is_finite() {
                return Err(RequestDecodeError::NonFinite(name));
            }
            if value.abs() > f64::from(f32::MAX) {
                return Err(RequestDecodeError::OutOfRange(name));
            }
            record.names.push(name);
            record.values.push(value);
        }
        if record.values.is_empty() {
            return Err(RequestDecodeError::NoRows);
        }
        Ok(record)
    }

    /// Decode raw request bytes
    pub fn decode(bytes: &[u8]) -> Result<Self, RequestDecodeError> {
        let text = std::str::from_utf8(bytes).map_err(|_| RequestDecodeError::InvalidUtf8)?;
        let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
        if text.is_empty() {
            return Err(RequestDecodeError::Empty);
        }

        let document: Value = serde_json::from_str(text)
            .map_err(|e| RequestDecodeError::Malformed(e.to_string()))?;

        match document {
            Value::Array(rows) => decode_records(rows),
            Value::Object(map) if is_split(&map) => decode_split(map),
            Value::Object(map) => decode_object(map),
            other => Err(RequestDecodeError::Malformed(format!(
                "expected an object or an array, got {}",
                type_name(&other)
            ))),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Values as single precision, the input type of the model runtimes.
    /// Every value is within `f32` range, so none becomes infinite here.
    pub fn to_f32(&self) -> Vec<f32> {
        self.values.iter().map(|&v| v as f32).collect()
    }
}

/// `[{"a": 1, "b": 2}]`
fn decode_records(rows: Vec<Value>) -> Result<FeatureRecord, RequestDecodeError> {
    let row = single_row(rows)?;
    match row {
        Value::Object(fields) => decode_flat(fields),
        other => Err(RequestDecodeError::Malformed(format!(
            "row must be an object, got {}",
            type_name(&other)
        ))),
    }
}

/// `{"columns": [...], "index": [...], "data": [[...]]}`
fn decode_split(mut map: Map<String, Value>) -> Result<FeatureRecord, RequestDecodeError> {
    let columns = match map.remove("columns") {
        Some(Value::Array(columns)) => columns,
        _ => return Err(RequestDecodeError::Malformed("'columns' must be an array".into())),
    };
    let data = match map.remove("data") {
        Some(Value::Array(data)) => data,
        _ => return Err(RequestDecodeError::Malformed("'data' must be an array".into())),
    };

    let row = match single_row(data)? {
        Value::Array(row) => row,
        other => {
            return Err(RequestDecodeError::Malformed(format!(
                "data row must be an array, got {}",
                type_name(&other)
            )))
        }
    };
    if row.len() != columns.len() {
        return Err(RequestDecodeError::Malformed(format!(
            "{} columns but {} values",
            columns.len(),
            row.len()
        )));
    }

    let mut pairs = Vec::with_capacity(row.len());
    for (column, value) in columns.into_iter().zip(row) {
        let name = match column {
            Value::String(name) => name,
            other => other.to_string(),
        };
        let value = numeric(&name, &value)?;
        pairs.push((name, value));
    }
    FeatureRecord::from_pairs(pairs)
}

/// Either a flat object or a column-oriented one (`{"a": {"0": 1}}`)
fn decode_object(map: Map<String, Value>) -> Result<FeatureRecord, RequestDecodeError> {
    if map.is_empty() {
        return Err(RequestDecodeError::NoRows);
    }

    if !map.values().any(Value::is_object) {
        return decode_flat(map);
    }

    let mut pairs = Vec::with_capacity(map.len());
    let mut row_index: Option<String> = None;
    for (name, column) in map {
        let Value::Object(cells) = column else {
            return Err(RequestDecodeError::Malformed(
                "mix of scalar and column-oriented fields".into(),
            ));
        };
        let (index, cell) = single_row(cells.into_iter().collect())?;
        // Cells under different index keys belong to different rows
        if *row_index.get_or_insert_with(|| index.clone()) != index {
            return Err(RequestDecodeError::MultipleRows(2));
        }
        let value = numeric(&name, &cell)?;
        pairs.push((name, value));
    }
    FeatureRecord::from_pairs(pairs)
}

fn decode_flat(fields: Map<String, Value>) -> Result<FeatureRecord, RequestDecodeError> {
    if fields.is_empty() {
        return Err(RequestDecodeError::NoRows);
    }
    let mut pairs = Vec::with_capacity(fields.len());
    for (name, value) in fields {
        let value = numeric(&name, &value)?;
        pairs.push((name, value));
    }
    FeatureRecord::from_pairs(pairs)
}

fn single_row<T>(mut rows: Vec<T>) -> Result<T, RequestDecodeError> {
    match rows.len() {
        0 => Err(RequestDecodeError::NoRows),
        1 => Ok(rows.remove(0)),
        n => Err(RequestDecodeError::MultipleRows(n)),
    }
}

fn numeric(name: &str, value: &Value) -> Result<f64, RequestDecodeError> {
    let number = value
        .as_f64()
        .ok_or_else(|| RequestDecodeError::NonNumeric(name.to_string()))?;
    if !number.is_finite() {
        return Err(RequestDecodeError::NonFinite(name.to_string()));
    }
    Ok(number)
}

fn is_split(map: &Map<String, Value>) -> bool {
    map.contains_key("columns") && map.contains_key("data")
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_object_keeps_field_order() {
        let record = FeatureRecord::decode(br#"{"V2": 0.5, "V1": -1.25, "Amount": 149}"#).unwrap();
        assert_eq!(record.names(), &["V2", "V1", "Amount"]);
        assert_eq!(record.values(), &[0.5, -1.25, 149.0]);
    }

    #[test]
    fn test_records_orientation() {
        let record = FeatureRecord::decode(br#"[{"Time": 0, "V1": -1.3598}]"#).unwrap();
        assert_eq!(record.len(), 2);
        assert_eq!(record.values()[1], -1.3598);
    }

    #[test]
    fn test_columns_orientation() {
        let record =
            FeatureRecord::decode(br#"{"Time": {"0": 0.0}, "V1": {"0": -1.3598}, "V2": {"0": 0.07}}"#)
                .unwrap();
        assert_eq!(record.names(), &["Time", "V1", "V2"]);
        assert_eq!(record.values(), &[0.0, -1.3598, 0.07]);
        assert_eq!(record.to_f32().len(), 3);
    }

    #[test]
    fn test_split_orientation() {
        let record = FeatureRecord::decode(
            br#"{"columns": ["a", "b"], "index": [7], "data": [[1.5, 2.5]]}"#,
        )
        .unwrap();
        assert_eq!(record.names(), &["a", "b"]);
        assert_eq!(record.values(), &[1.5, 2.5]);
    }

    #[test]
    fn test_multiple_rows_rejected() {
        assert_eq!(
            FeatureRecord::decode(br#"[{"a": 1}, {"a": 2}]"#),
            Err(RequestDecodeError::MultipleRows(2))
        );
        assert_eq!(
            FeatureRecord::decode(br#"{"a": {"0": 1, "1": 2}}"#),
            Err(RequestDecodeError::MultipleRows(2))
        );
    }

    #[test]
    fn test_non_numeric_field_rejected() {
        assert_eq!(
            FeatureRecord::decode(br#"{"a": 1, "b": "high"}"#),
            Err(RequestDecodeError::NonNumeric("b".into()))
        );
        assert_eq!(
            FeatureRecord::decode(br#"{"a": null}"#),
            Err(RequestDecodeError::NonNumeric("a".into()))
        );
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        assert_eq!(
            FeatureRecord::decode(&[0xff, 0xfe, b'{', b'}']),
            Err(RequestDecodeError::InvalidUtf8)
        );
    }

    #[test]
    fn test_empty_and_malformed() {
        assert_eq!(FeatureRecord::decode(b"  \n"), Err(RequestDecodeError::Empty));
        assert_eq!(FeatureRecord::decode(b"{}"), Err(RequestDecodeError::NoRows));
        assert_eq!(FeatureRecord::decode(b"[]"), Err(RequestDecodeError::NoRows));
        assert!(matches!(
            FeatureRecord::decode(br#"{"a": 1"#),
            Err(RequestDecodeError::Malformed(_))
        ));
        assert!(matches!(FeatureRecord::decode(b"42"), Err(RequestDecodeError::Malformed(_))));
        assert!(matches!(
            FeatureRecord::decode(br#"{"a": 1, "b": {"0": 2}}"#),
            Err(RequestDecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_value_beyond_f32_range_rejected() {
        assert_eq!(
            FeatureRecord::decode(br#"{"V1": 1e300}"#),
            Err(RequestDecodeError::OutOfRange("V1".into()))
        );
        assert_eq!(
            FeatureRecord::decode(br#"{"V1": {"0": 0.5}, "V2": {"0": -1e39}}"#),
            Err(RequestDecodeError::OutOfRange("V2".into()))
        );

        let record = FeatureRecord::decode(br#"{"V1": 3.4e38, "V2": -3.4e38}"#).unwrap();
        assert!(record.to_f32().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_columns_with_different_row_index_rejected() {
        assert_eq!(
            FeatureRecord::decode(br#"{"a": {"0": 1}, "b": {"1": 2}}"#),
            Err(RequestDecodeError::MultipleRows(2))
        );
        let record = FeatureRecord::decode(br#"{"a": {"7": 1}, "b": {"7": 2}}"#).unwrap();
        assert_eq!(record.values(), &[1.0, 2.0]);
    }

    #[test]
    fn test_from_pairs_rejects_non_finite() {
        assert_eq!(
            FeatureRecord::from_pairs([("a", 1.0), ("b", f64::NAN)]),
            Err(RequestDecodeError::NonFinite("b".into()))
        );
    }
}
