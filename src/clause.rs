// used for the payloads that travel inside a Condition
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};

// used for date range filters
use chrono::NaiveDate;

use crate::error::Result;
use crate::filters::Condition;

// ------------- Meta -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Compare {
    #[default]
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "NOT LIKE")]
    NotLike,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "NOT IN")]
    NotIn,
    #[serde(rename = "EXISTS")]
    Exists,
    #[serde(rename = "NOT EXISTS")]
    NotExists,
}
impl Compare {
    pub fn as_str(&self) -> &'static str {
        match self {
            Compare::Equal => "=",
            Compare::NotEqual => "!=",
            Compare::Greater => ">",
            Compare::GreaterOrEqual => ">=",
            Compare::Less => "<",
            Compare::LessOrEqual => "<=",
            Compare::Like => "LIKE",
            Compare::NotLike => "NOT LIKE",
            Compare::In => "IN",
            Compare::NotIn => "NOT IN",
            Compare::Exists => "EXISTS",
            Compare::NotExists => "NOT EXISTS",
        }
    }
}

/// A condition on a post meta entry, shaped like a `meta_query` clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaClause {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default)]
    pub compare: Compare,
}
impl MetaClause {
    pub fn new(key: impl Into<String>, value: Option<Value>, compare: Compare) -> Self {
        Self { key: key.into(), value, compare }
    }
    pub fn equals(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(key, Some(value.into()), Compare::Equal)
    }
    pub fn exists(key: impl Into<String>) -> Self {
        Self::new(key, None, Compare::Exists)
    }
    pub fn from_condition(condition: &Condition) -> Result<Self> {
        Ok(serde_json::from_value(condition.payload().clone())?)
    }
}
impl From<MetaClause> for Condition {
    fn from(clause: MetaClause) -> Self {
        let mut payload = json!({ "key": clause.key, "compare": clause.compare.as_str() });
        if let Some(value) = clause.value {
            payload["value"] = value;
        }
        Condition::new(payload)
    }
}
impl From<MetaClause> for Value {
    fn from(clause: MetaClause) -> Self {
        Condition::from(clause).into_payload()
    }
}

// ------------- Taxonomy -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermField {
    #[default]
    TermId,
    Slug,
    Name,
}
impl TermField {
    pub fn as_str(&self) -> &'static str {
        match self {
            TermField::TermId => "term_id",
            TermField::Slug => "slug",
            TermField::Name => "name",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TaxOperator {
    #[default]
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "NOT IN")]
    NotIn,
    #[serde(rename = "AND")]
    And,
}
impl TaxOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxOperator::In => "IN",
            TaxOperator::NotIn => "NOT IN",
            TaxOperator::And => "AND",
        }
    }
}

/// A condition on assigned terms, shaped like a `tax_query` clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxClause {
    pub taxonomy: String,
    #[serde(default)]
    pub field: TermField,
    #[serde(deserialize_with = "one_or_many")]
    pub terms: Vec<Value>,
    #[serde(default)]
    pub operator: TaxOperator,
}
impl TaxClause {
    pub fn new(
        taxonomy: impl Into<String>,
        field: TermField,
        terms: Vec<Value>,
        operator: TaxOperator,
    ) -> Self {
        Self { taxonomy: taxonomy.into(), field, terms, operator }
    }
    pub fn slugs<S: Into<String>>(taxonomy: impl Into<String>, slugs: impl IntoIterator<Item = S>) -> Self {
        let terms = slugs.into_iter().map(|s| Value::String(s.into())).collect();
        Self::new(taxonomy, TermField::Slug, terms, TaxOperator::In)
    }
    pub fn with_operator(mut self, operator: TaxOperator) -> Self {
        self.operator = operator;
        self
    }
    pub fn from_condition(condition: &Condition) -> Result<Self> {
        Ok(serde_json::from_value(condition.payload().clone())?)
    }
}
impl From<TaxClause> for Condition {
    fn from(clause: TaxClause) -> Self {
        Condition::new(json!({
            "taxonomy": clause.taxonomy,
            "field": clause.field.as_str(),
            "terms": clause.terms,
            "operator": clause.operator.as_str(),
        }))
    }
}
impl From<TaxClause> for Value {
    fn from(clause: TaxClause) -> Self {
        Condition::from(clause).into_payload()
    }
}

// `terms` may be given as a single value
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Array(values) => Ok(values),
        single => Ok(vec![single]),
    }
}

// ------------- Date range -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<NaiveDate>,
    #[serde(default = "inclusive_by_default")]
    pub inclusive: bool,
}
fn inclusive_by_default() -> bool {
    true
}
impl DateRange {
    pub fn between(after: NaiveDate, before: NaiveDate) -> Self {
        Self { after: Some(after), before: Some(before), inclusive: true }
    }
    pub fn after(after: NaiveDate) -> Self {
        Self { after: Some(after), before: None, inclusive: true }
    }
    pub fn before(before: NaiveDate) -> Self {
        Self { after: None, before: Some(before), inclusive: true }
    }
    pub fn exclusive(mut self) -> Self {
        self.inclusive = false;
        self
    }
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }
}
impl From<DateRange> for Value {
    fn from(range: DateRange) -> Self {
        let mut payload = json!({ "inclusive": range.inclusive });
        if let Some(after) = range.after {
            payload["after"] = Value::String(after.format("%Y-%m-%d").to_string());
        }
        if let Some(before) = range.before {
            payload["before"] = Value::String(before.format("%Y-%m-%d").to_string());
        }
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_clause_uses_wordpress_shape() {
        let condition = Condition::from(MetaClause::equals("color", "red"));
        assert_eq!(
            condition.payload(),
            &json!({ "key": "color", "value": "red", "compare": "=" })
        );
        let decoded = MetaClause::from_condition(&condition).unwrap();
        assert_eq!(decoded, MetaClause::equals("color", "red"));
    }

    #[test]
    fn meta_clause_defaults_to_equality() {
        let condition = Condition::new(json!({ "key": "size", "value": 3 }));
        let decoded = MetaClause::from_condition(&condition).unwrap();
        assert_eq!(decoded.compare, Compare::Equal);
    }

    #[test]
    fn tax_clause_accepts_a_single_term() {
        let condition = Condition::new(json!({ "taxonomy": "genre", "field": "slug", "terms": "jazz" }));
        let decoded = TaxClause::from_condition(&condition).unwrap();
        assert_eq!(decoded.terms, vec![json!("jazz")]);
        assert_eq!(decoded.operator, TaxOperator::In);
    }

    #[test]
    fn malformed_condition_is_a_decode_error() {
        let condition = Condition::from("k1=v1");
        assert!(matches!(
            MetaClause::from_condition(&condition),
            Err(crate::QueryError::Decode { .. })
        ));
    }

    #[test]
    fn date_range_survives_the_json_trip() {
        let range = DateRange::between(
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2020, 12, 31).unwrap(),
        )
        .exclusive();
        let value = Value::from(range);
        assert_eq!(value["after"], json!("2020-01-01"));
        assert_eq!(DateRange::from_value(&value).unwrap(), range);
    }
}
