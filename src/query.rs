// used for filter values
use serde_json::Value;

// listings are indexed by the rendered key
use seahash::SeaHasher;
use std::collections::HashMap;
use std::hash::BuildHasherDefault;

use std::fmt;
use std::str::FromStr;

use crate::adapter::{Adapter, Execution, Record};
use crate::clause::DateRange;
use crate::error::{QueryError, Result};
use crate::filters::{
    DATE_QUERY, FilterSet, NOPAGING, ORDER, ORDERBY, POST_STATUS, POST_TYPE, POSTS_PER_PAGE,
    Relation, SUPPRESS_FILTERS, Target,
};
use crate::instrument::{Instrument, TracingInstrument};
use crate::resolve::{self, Request};
use crate::settings::Settings;

type KeyHasher = BuildHasherDefault<SeaHasher>;

// ------------- Direction -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}
impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}
impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
impl FromStr for Direction {
    type Err = QueryError;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "ASC" => Ok(Direction::Asc),
            "DESC" => Ok(Direction::Desc),
            _ => Err(QueryError::Decode { message: format!("Unknown direction: {}", s) }),
        }
    }
}

// ------------- Listing -------------
/// Key/label pairs in the order keys were first seen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
    entries: Vec<(Value, Value)>,
}
impl Listing {
    fn build(pairs: impl IntoIterator<Item = (Value, Value)>) -> Self {
        let mut positions: HashMap<String, usize, KeyHasher> = HashMap::default();
        let mut entries: Vec<(Value, Value)> = Vec::new();
        for (key, label) in pairs {
            match positions.get(&key.to_string()) {
                Some(&at) => entries[at].1 = label,
                None => {
                    positions.insert(key.to_string(), entries.len());
                    entries.push((key, label));
                }
            }
        }
        Self { entries }
    }
    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(k, _)| k)
    }
    pub fn iter(&self) -> impl Iterator<Item = &(Value, Value)> {
        self.entries.iter()
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ------------- Query -------------
/// Chainable query builder over an [`Adapter`].
pub struct Query<'a, A: Adapter> {
    filters: FilterSet,
    adapter: &'a A,
    instrument: Box<dyn Instrument + 'a>,
}
impl<'a, A: Adapter> Query<'a, A> {
    /// Published-or-not posts ordered by title, unpaginated.
    pub fn new(adapter: &'a A) -> Self {
        Self::with_settings(adapter, &Settings::default())
    }
    pub fn with_settings(adapter: &'a A, settings: &Settings) -> Self {
        let mut filters = FilterSet::new();
        filters
            .set_scalar(ORDERBY, settings.orderby.as_str())
            .set_scalar(ORDER, settings.order.as_str())
            .set_scalar(POST_STATUS, settings.post_status.as_str())
            .set_scalar(NOPAGING, settings.nopaging)
            .set_scalar(SUPPRESS_FILTERS, settings.suppress_filters);
        Self { filters, adapter, instrument: Box::new(TracingInstrument::new(settings)) }
    }
    pub fn instrument(mut self, instrument: impl Instrument + 'a) -> Self {
        self.instrument = Box::new(instrument);
        self
    }

    // chain
    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.filters.set_scalar(ORDERBY, field.into());
        self
    }
    pub fn direction(mut self, direction: Direction) -> Self {
        self.filters.set_scalar(ORDER, direction.as_str());
        self
    }
    /// `None` removes the status restriction entirely.
    pub fn status<V: Into<Value>>(mut self, status: Option<V>) -> Self {
        match status {
            Some(status) => self.filters.set_scalar(POST_STATUS, status),
            None => self.filters.unset_scalar(POST_STATUS),
        };
        self
    }
    /// `None` removes the type restriction entirely.
    pub fn post_type<V: Into<Value>>(mut self, post_type: Option<V>) -> Self {
        match post_type {
            Some(post_type) => self.filters.set_scalar(POST_TYPE, post_type),
            None => self.filters.unset_scalar(POST_TYPE),
        };
        self
    }
    pub fn date_range(mut self, range: DateRange) -> Self {
        self.filters.set_scalar(DATE_QUERY, range);
        self
    }
    pub fn limit(mut self, quantity: i64) -> Self {
        self.filters.set_scalar(POSTS_PER_PAGE, quantity).set_scalar(NOPAGING, false);
        self
    }
    pub fn and_where(self, target: impl Into<Target>, value: impl Into<Value>) -> Self {
        self.add_where(target.into(), value.into(), Relation::And)
    }
    /// On a plain field this overwrites the filter exactly like `and_where`;
    /// only condition families accumulate OR-groups.
    pub fn or_where(self, target: impl Into<Target>, value: impl Into<Value>) -> Self {
        self.add_where(target.into(), value.into(), Relation::Or)
    }
    fn add_where(mut self, target: Target, value: Value, relation: Relation) -> Self {
        match target {
            Target::Family(family) => {
                self.filters.add_condition(family, relation, value);
            }
            Target::Field(name) => {
                self.filters.set_scalar(name, value);
            }
        }
        self
    }
    pub fn apply_filters<K, V>(mut self, filters: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        for (name, value) in filters {
            self.filters.set_scalar(name, value);
        }
        self
    }

    // accessors
    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }
    pub fn filters_mut(&mut self) -> &mut FilterSet {
        &mut self.filters
    }

    // execution
    /// Resolves the filters into the request that `query` would run.
    /// Materialization sub-queries are executed along the way.
    pub fn request(&self) -> Result<Request> {
        resolve::resolve(self.filters.clone(), self.adapter, self.instrument.as_ref())
    }
    pub fn query(&self) -> Result<Execution<A::Row>> {
        let request = self.request()?;
        resolve::execute(&request, self.adapter, self.instrument.as_ref())
    }
    pub fn fetch(&self) -> Result<Vec<A::Row>> {
        Ok(self.query()?.rows)
    }
    pub fn first(&self) -> Result<Option<A::Row>> {
        Ok(self.fetch()?.into_iter().next())
    }
    /// Maps each row's `key` field to its `label` field. Rows missing either
    /// field contribute `null`.
    pub fn listing(&self, key: &str, label: &str) -> Result<Listing> {
        let rows = self.fetch()?;
        Ok(Listing::build(rows.iter().map(|row| {
            (
                row.field(key).unwrap_or(Value::Null),
                row.field(label).unwrap_or(Value::Null),
            )
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn listing_later_duplicates_overwrite_in_place() {
        let listing = Listing::build(vec![
            (json!(1), json!("a")),
            (json!(2), json!("b")),
            (json!(1), json!("c")),
        ]);
        assert_eq!(listing.len(), 2);
        assert_eq!(listing.get(&json!(1)), Some(&json!("c")));
        assert_eq!(listing.get(&json!(2)), Some(&json!("b")));
        assert_eq!(listing.keys().cloned().collect::<Vec<_>>(), vec![json!(1), json!(2)]);
    }

    #[test]
    fn direction_parses_any_case() {
        assert_eq!("desc".parse::<Direction>().unwrap(), Direction::Desc);
        assert_eq!("Asc".parse::<Direction>().unwrap(), Direction::Asc);
        assert!("sideways".parse::<Direction>().is_err());
    }
}
