//! Item model shared by every storage backend
//!
//! Items are attribute maps addressed by a partition key (`pk`) and a sort
//! key (`sk`). Values follow a small typed model in which every number is an
//! arbitrary-precision [`Decimal`]; it is persisted as a string so no
//! precision is lost in the store.
//!
//! Conversion to JSON is where numbers leave the store: a whole-valued
//! decimal becomes a JSON integer and a fractional one becomes a float.

use crate::error::{Result, SessionError};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// Attribute name of the partition key
pub const PARTITION_KEY: &str = "pk";

/// Attribute name of the sort key
pub const SORT_KEY: &str = "sk";

/// A single attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// String
    #[serde(rename = "S")]
    S(String),
    /// Number
    #[serde(rename = "N")]
    N(Decimal),
    /// Boolean
    #[serde(rename = "BOOL")]
    Bool(bool),
    /// Explicit null
    #[serde(rename = "NULL")]
    Null,
    /// Ordered list
    #[serde(rename = "L")]
    L(Vec<AttributeValue>),
    /// Nested map
    #[serde(rename = "M")]
    M(BTreeMap<String, AttributeValue>),
}

impl AttributeValue {
    /// Converts a JSON value into an attribute value
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Validation` for numbers that cannot be
    /// represented as a decimal (out of range)
    ///
    /// # Examples
    ///
    /// ```
    /// use sessionkeep::storage::AttributeValue;
    /// use serde_json::json;
    ///
    /// let value = AttributeValue::from_json(&json!(5.5)).unwrap();
    /// assert_eq!(value.to_json(), json!(5.5));
    /// ```
    pub fn from_json(value: &Value) -> Result<Self> {
        Ok(match value {
            Value::Null => AttributeValue::Null,
            Value::Bool(b) => AttributeValue::Bool(*b),
            Value::Number(n) => AttributeValue::N(decimal_from_number(n)?),
            Value::String(s) => AttributeValue::S(s.clone()),
            Value::Array(items) => AttributeValue::L(
                items
                    .iter()
                    .map(AttributeValue::from_json)
                    .collect::<Result<Vec<_>>>()?,
            ),
            Value::Object(fields) => AttributeValue::M(
                fields
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), AttributeValue::from_json(v)?)))
                    .collect::<Result<BTreeMap<_, _>>>()?,
            ),
        })
    }

    /// Converts the attribute value into JSON
    pub fn to_json(&self) -> Value {
        match self {
            AttributeValue::S(s) => Value::String(s.clone()),
            AttributeValue::N(d) => decimal_to_json(d),
            AttributeValue::Bool(b) => Value::Bool(*b),
            AttributeValue::Null => Value::Null,
            AttributeValue::L(items) => {
                Value::Array(items.iter().map(AttributeValue::to_json).collect())
            }
            AttributeValue::M(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// String payload, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::S(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean payload, if this is a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer payload, if this is a whole-valued number that fits in `i64`
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::N(d) if d.fract().is_zero() => d.to_i64(),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::S(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::S(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::N(Decimal::from(value))
    }
}

impl From<Decimal> for AttributeValue {
    fn from(value: Decimal) -> Self {
        AttributeValue::N(value)
    }
}

fn decimal_from_number(n: &Number) -> Result<Decimal> {
    if let Some(i) = n.as_i64() {
        return Ok(Decimal::from(i));
    }
    if let Some(u) = n.as_u64() {
        return Ok(Decimal::from(u));
    }
    let text = n.to_string();
    text.parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| SessionError::Validation(format!("number {} is out of range", text)).into())
}

fn decimal_to_json(d: &Decimal) -> Value {
    if d.fract().is_zero() {
        if let Some(i) = d.to_i64() {
            return Value::from(i);
        }
        if let Some(u) = d.to_u64() {
            return Value::from(u);
        }
    }
    d.to_f64()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(d.to_string()))
}

/// Primary key of an item
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemKey {
    /// Partition key
    pub pk: String,
    /// Sort key
    pub sk: String,
}

impl ItemKey {
    /// Creates a key from its two parts
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
        }
    }
}

/// An attribute map stored under an [`ItemKey`]
///
/// The `pk` and `sk` attributes are part of the map, mirroring the
/// persisted shape.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Item {
    attributes: BTreeMap<String, AttributeValue>,
}

impl Item {
    /// Creates an item holding only its key attributes
    pub fn new(key: &ItemKey) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert(PARTITION_KEY.to_string(), AttributeValue::S(key.pk.clone()));
        attributes.insert(SORT_KEY.to_string(), AttributeValue::S(key.sk.clone()));
        Self { attributes }
    }

    /// Builder-style attribute setter
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets an attribute, replacing any previous value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Looks up an attribute
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Removes an attribute
    pub fn remove(&mut self, name: &str) -> Option<AttributeValue> {
        self.attributes.remove(name)
    }

    /// Iterates attributes in name order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
        self.attributes.iter()
    }

    /// Primary key of the item
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Validation` if `pk` or `sk` is missing or not a
    /// string
    pub fn key(&self) -> Result<ItemKey> {
        let pk = self.get(PARTITION_KEY).and_then(AttributeValue::as_str);
        let sk = self.get(SORT_KEY).and_then(AttributeValue::as_str);
        match (pk, sk) {
            (Some(pk), Some(sk)) => Ok(ItemKey::new(pk, sk)),
            _ => Err(SessionError::Validation("item requires string 'pk' and 'sk'".into()).into()),
        }
    }

    /// JSON view of the item, applying the number boundary encoding
    pub fn to_json(&self) -> Map<String, Value> {
        self.attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect()
    }
}

/// Predicate on the sort key used by `query`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKeyCondition {
    /// Every item in the partition
    Any,
    /// Exactly this sort key
    Equals(String),
    /// Sort keys starting with this prefix
    BeginsWith(String),
}

impl SortKeyCondition {
    /// Whether a sort key satisfies the condition
    pub fn matches(&self, sk: &str) -> bool {
        match self {
            SortKeyCondition::Any => true,
            SortKeyCondition::Equals(expected) => sk == expected,
            SortKeyCondition::BeginsWith(prefix) => sk.starts_with(prefix.as_str()),
        }
    }
}

/// One clause of a filter
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// The attribute exists and equals the value
    Equals(String, AttributeValue),
    /// The attribute exists
    Exists(String),
}

impl Condition {
    fn matches(&self, item: &Item) -> bool {
        match self {
            Condition::Equals(name, expected) => item.get(name) == Some(expected),
            Condition::Exists(name) => item.get(name).is_some(),
        }
    }
}

/// Conjunction of conditions; an empty filter matches every item
///
/// # Examples
///
/// ```
/// use sessionkeep::storage::{Filter, Item, ItemKey};
///
/// let item = Item::new(&ItemKey::new("SESSION#abc", "METADATA")).with("is_deleted", false);
/// assert!(Filter::new().equals("is_deleted", false).matches(&item));
/// assert!(!Filter::new().exists("title").matches(&item));
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    /// Creates a filter that matches everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an equality clause
    pub fn equals(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.conditions
            .push(Condition::Equals(name.into(), value.into()));
        self
    }

    /// Adds an existence clause
    pub fn exists(mut self, name: impl Into<String>) -> Self {
        self.conditions.push(Condition::Exists(name.into()));
        self
    }

    /// Whether every clause holds for the item
    pub fn matches(&self, item: &Item) -> bool {
        self.conditions.iter().all(|c| c.matches(item))
    }
}

/// Attribute-level SET: every entry becomes an attribute of the item
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttributePatch {
    values: BTreeMap<String, AttributeValue>,
}

impl AttributePatch {
    /// Creates an empty patch
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an attribute assignment
    pub fn set(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Whether the patch assigns nothing
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Applies the assignments to an item
    ///
    /// Key attributes are never overwritten.
    pub fn apply_to(&self, item: &mut Item) {
        for (name, value) in &self.values {
            if name == PARTITION_KEY || name == SORT_KEY {
                continue;
            }
            item.set(name.clone(), value.clone());
        }
    }
}
