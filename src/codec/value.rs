//! Indexed values and their document encoding.
//!
//! Every value shape writes to its own field so the term spaces of
//! different shapes never collide:
//!
//! | shape  | field     | term text                                   |
//! |--------|-----------|---------------------------------------------|
//! | number | `number`  | sortable hex, see [`numeric`]               |
//! | array  | `array`   | element type tag, then `element|` per item  |
//! | bool   | `bool`    | `true` / `false`                            |
//! | string | `string`  | the string itself                           |
//!
//! Strings also carry `string_rev`, the character-reversed string, so a
//! suffix query is a prefix query on that field. Arrays support equality
//! only. Substring and regex matching are not supported.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::codec::numeric;
use crate::error::{NodexError, Result};
use crate::lexical::core::document::Document;
use crate::lexical::core::term::Term;
use crate::lexical::query::{BooleanQuery, Query};

/// Entity id field, present on every property document.
pub const ID_FIELD: &str = "id";
pub const NUMBER_FIELD: &str = "number";
pub const ARRAY_FIELD: &str = "array";
pub const BOOL_FIELD: &str = "bool";
pub const STRING_FIELD: &str = "string";
pub const STRING_REVERSED_FIELD: &str = "string_rev";

/// Value fields in decode priority order.
pub const VALUE_FIELDS: [&str; 4] = [NUMBER_FIELD, ARRAY_FIELD, BOOL_FIELD, STRING_FIELD];

/// An array of primitives. Arrays are homogeneous.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ArrayValue {
    Numbers(Vec<f64>),
    Bools(Vec<bool>),
    Strings(Vec<String>),
}

/// A property value as it enters the index.
///
/// Numbers compare by bit pattern: `NaN` equals itself and `-0.0` differs
/// from `0.0`, mirroring how they are indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Number(f64),
    Array(ArrayValue),
    Bool(bool),
    String(String),
}

impl PartialEq for ArrayValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ArrayValue::Numbers(a), ArrayValue::Numbers(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
            }
            (ArrayValue::Bools(a), ArrayValue::Bools(b)) => a == b,
            (ArrayValue::Strings(a), ArrayValue::Strings(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ArrayValue {}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.to_bits() == b.to_bits(),
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Equal values share an encoding, and distinct shapes use distinct fields.
        let term = ValueCodec::value_term(self);
        term.hash(state);
    }
}

impl fmt::Display for ArrayValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let items: Vec<String> = match self {
            ArrayValue::Numbers(v) => v.iter().map(|n| n.to_string()).collect(),
            ArrayValue::Bools(v) => v.iter().map(|b| b.to_string()).collect(),
            ArrayValue::Strings(v) => v.iter().map(|s| format!("{s:?}")).collect(),
        };
        write!(f, "[{}]", items.join(", "))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Array(a) => write!(f, "{a}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::String(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(value as f64)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<f64>> for Value {
    fn from(value: Vec<f64>) -> Self {
        Value::Array(ArrayValue::Numbers(value))
    }
}

impl From<Vec<bool>> for Value {
    fn from(value: Vec<bool>) -> Self {
        Value::Array(ArrayValue::Bools(value))
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Value::Array(ArrayValue::Strings(value))
    }
}

const NUMBERS_TAG: char = 'D';
const BOOLS_TAG: char = 'Z';
const STRINGS_TAG: char = 'L';
const ELEMENT_END: char = '|';

/// Translates values to documents, terms and queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueCodec;

impl ValueCodec {
    /// The field a value is indexed under.
    pub fn field_name(value: &Value) -> &'static str {
        match value {
            Value::Number(_) => NUMBER_FIELD,
            Value::Array(_) => ARRAY_FIELD,
            Value::Bool(_) => BOOL_FIELD,
            Value::String(_) => STRING_FIELD,
        }
    }

    /// The primary term of a value.
    pub fn value_term(value: &Value) -> Term {
        let text = match value {
            Value::Number(n) => numeric::encode(*n),
            Value::Array(a) => encode_array(a),
            Value::Bool(b) => b.to_string(),
            Value::String(s) => s.clone(),
        };
        Term::new(Self::field_name(value), text)
    }

    pub fn id_term(entity_id: u64) -> Term {
        Term::long(ID_FIELD, entity_id as i64)
    }

    /// The document indexing `value` for `entity_id`.
    pub fn document(entity_id: u64, value: &Value) -> Document {
        let term = Self::value_term(value);
        let mut doc = Document::new()
            .with_long(ID_FIELD, entity_id as i64)
            .with_text(term.field, term.text);
        if let Value::String(s) = value {
            doc = doc.with_text(STRING_REVERSED_FIELD, reverse(s));
        }
        doc
    }

    pub fn entity_id(doc: &Document) -> Result<u64> {
        doc.get_long(ID_FIELD)
            .map(|id| id as u64)
            .ok_or_else(|| NodexError::corrupt("property document without an entity id"))
    }

    /// Recover the value a document was built from.
    pub fn decode(doc: &Document) -> Result<Value> {
        if let Some(text) = doc.get_text(NUMBER_FIELD) {
            return Ok(Value::Number(numeric::decode(text)?));
        }
        if let Some(text) = doc.get_text(ARRAY_FIELD) {
            return Ok(Value::Array(decode_array(text)?));
        }
        if let Some(text) = doc.get_text(BOOL_FIELD) {
            return match text {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                other => Err(NodexError::corrupt(format!("encoded bool {other:?}"))),
            };
        }
        if let Some(text) = doc.get_text(STRING_FIELD) {
            return Ok(Value::String(text.to_string()));
        }
        Err(NodexError::corrupt("property document without a value field"))
    }

    /// Documents holding exactly `value`.
    pub fn exact_query(value: &Value) -> Query {
        Query::Term(Self::value_term(value))
    }

    /// Documents of one entity holding exactly `value`.
    pub fn entity_value_query(entity_id: u64, value: &Value) -> Query {
        BooleanQuery::new()
            .must(Query::Term(Self::id_term(entity_id)))
            .must(Self::exact_query(value))
            .build()
    }

    /// Numbers inside the bounds. `None` leaves a side open up to the
    /// matching infinity.
    ///
    /// NaN encodes outside `[-inf, +inf]` whatever its sign bit, so it never
    /// matches a range or a negated range, only an exact lookup.
    pub fn number_range(
        lower: Option<f64>,
        upper: Option<f64>,
        include_lower: bool,
        include_upper: bool,
    ) -> Query {
        Query::range(
            NUMBER_FIELD,
            Some(numeric::encode(lower.unwrap_or(f64::NEG_INFINITY))),
            Some(numeric::encode(upper.unwrap_or(f64::INFINITY))),
            include_lower || lower.is_none(),
            include_upper || upper.is_none(),
        )
    }

    /// Numbers outside the bounds: the union of `[-inf, lower)` and
    /// `(upper, +inf]`, with inclusiveness flipped. NaN is never matched.
    pub fn not_number_range(
        lower: Option<f64>,
        upper: Option<f64>,
        include_lower: bool,
        include_upper: bool,
    ) -> Query {
        let mut query = BooleanQuery::new();
        if let Some(lower) = lower {
            query = query.should(Query::range(
                NUMBER_FIELD,
                Some(numeric::encode(f64::NEG_INFINITY)),
                Some(numeric::encode(lower)),
                true,
                !include_lower,
            ));
        }
        if let Some(upper) = upper {
            query = query.should(Query::range(
                NUMBER_FIELD,
                Some(numeric::encode(upper)),
                Some(numeric::encode(f64::INFINITY)),
                !include_upper,
                true,
            ));
        }
        if query.should.is_empty() {
            // The complement of an unbounded range is empty.
            query = query.must_not(Query::MatchAll);
        }
        query.build()
    }

    pub fn string_prefix(prefix: &str) -> Query {
        Query::prefix(STRING_FIELD, prefix)
    }

    pub fn string_suffix(suffix: &str) -> Query {
        Query::prefix(STRING_REVERSED_FIELD, reverse(suffix))
    }

    /// Every property document.
    pub fn all_query() -> Query {
        Query::exists(ID_FIELD)
    }
}

fn reverse(s: &str) -> String {
    s.chars().rev().collect()
}

fn encode_array(array: &ArrayValue) -> String {
    let mut out = String::new();
    match array {
        ArrayValue::Numbers(values) => {
            out.push(NUMBERS_TAG);
            for v in values {
                out.push_str(&numeric::encode(*v));
                out.push(ELEMENT_END);
            }
        }
        ArrayValue::Bools(values) => {
            out.push(BOOLS_TAG);
            for v in values {
                out.push(if *v { 't' } else { 'f' });
                out.push(ELEMENT_END);
            }
        }
        ArrayValue::Strings(values) => {
            out.push(STRINGS_TAG);
            for v in values {
                // Hex keeps the terminator out of element text.
                for byte in v.as_bytes() {
                    out.push_str(&format!("{byte:02x}"));
                }
                out.push(ELEMENT_END);
            }
        }
    }
    out
}

fn decode_array(text: &str) -> Result<ArrayValue> {
    let mut chars = text.chars();
    let tag = chars
        .next()
        .ok_or_else(|| NodexError::corrupt("empty encoded array"))?;
    let body = chars.as_str();
    let elements: Vec<&str> = match body.strip_suffix(ELEMENT_END) {
        Some(body) => body.split(ELEMENT_END).collect(),
        None if body.is_empty() => Vec::new(),
        None => {
            return Err(NodexError::corrupt(format!(
                "encoded array {text:?} is not terminated"
            )));
        }
    };

    match tag {
        NUMBERS_TAG => Ok(ArrayValue::Numbers(
            elements
                .into_iter()
                .map(numeric::decode)
                .collect::<Result<_>>()?,
        )),
        BOOLS_TAG => Ok(ArrayValue::Bools(
            elements
                .into_iter()
                .map(|e| match e {
                    "t" => Ok(true),
                    "f" => Ok(false),
                    other => Err(NodexError::corrupt(format!("array bool {other:?}"))),
                })
                .collect::<Result<_>>()?,
        )),
        STRINGS_TAG => Ok(ArrayValue::Strings(
            elements
                .into_iter()
                .map(decode_hex_string)
                .collect::<Result<_>>()?,
        )),
        other => Err(NodexError::corrupt(format!("unknown array tag {other:?}"))),
    }
}

fn decode_hex_string(hex: &str) -> Result<String> {
    if hex.len() % 2 != 0 {
        return Err(NodexError::corrupt(format!("odd-length hex {hex:?}")));
    }
    let bytes = (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
        .collect::<std::result::Result<Vec<u8>, _>>()
        .map_err(|e| NodexError::corrupt(format!("array string {hex:?}: {e}")))?;
    String::from_utf8(bytes).map_err(|e| NodexError::corrupt(format!("array string: {e}")))
}
