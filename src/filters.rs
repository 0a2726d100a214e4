// used for scalar filter values and opaque condition payloads
use serde_json::Value;

// scalar filters are kept sorted so rendered requests are reproducible
use std::collections::BTreeMap;

// used to print out readable forms of families and relations
use std::fmt;
use std::str::FromStr;

use crate::error::QueryError;

// ------------- Identity -------------
pub type PostId = u64;

// ------------- Well-known scalar keys -------------
pub const ORDERBY: &str = "orderby";
pub const ORDER: &str = "order";
pub const POST_STATUS: &str = "post_status";
pub const POST_TYPE: &str = "post_type";
pub const NOPAGING: &str = "nopaging";
pub const POSTS_PER_PAGE: &str = "posts_per_page";
pub const SUPPRESS_FILTERS: &str = "suppress_filters";
pub const DATE_QUERY: &str = "date_query";
pub const POST_IN: &str = "post__in";

// ------------- Relation -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Relation {
    And,
    Or,
}
impl Relation {
    pub const ALL: [Relation; 2] = [Relation::And, Relation::Or];
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::And => "AND",
            Relation::Or => "OR",
        }
    }
}
impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ------------- Family -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Family {
    Meta,
    Taxonomy,
}
impl Family {
    /// Resolution order. Fixed so sub-queries are logged reproducibly.
    pub const ALL: [Family; 2] = [Family::Meta, Family::Taxonomy];
    /// The request key the family is known by in the WordPress vocabulary.
    pub fn key(&self) -> &'static str {
        match self {
            Family::Meta => "meta_query",
            Family::Taxonomy => "tax_query",
        }
    }
    /// True for every spelling `FromStr` accepts, in any case.
    pub fn is_family_key(name: &str) -> bool {
        name.parse::<Family>().is_ok()
    }
}
impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
impl FromStr for Family {
    type Err = QueryError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "meta_query" | "meta" => Ok(Family::Meta),
            "tax_query" | "taxonomy" => Ok(Family::Taxonomy),
            _ => Err(QueryError::UnknownFamily(s.to_string())),
        }
    }
}

// ------------- Condition -------------
/// Backend specific condition payload. The composer only moves these around.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition(Value);
impl Condition {
    pub fn new(payload: Value) -> Self {
        Self(payload)
    }
    pub fn payload(&self) -> &Value {
        &self.0
    }
    pub fn into_payload(self) -> Value {
        self.0
    }
}
impl From<Value> for Condition {
    fn from(payload: Value) -> Self {
        Self(payload)
    }
}
impl From<&str> for Condition {
    fn from(payload: &str) -> Self {
        Self(Value::from(payload))
    }
}

// ------------- Target -------------
/// What a `where` call is aimed at: a plain scalar filter or a condition family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Field(String),
    Family(Family),
}
impl From<Family> for Target {
    fn from(family: Family) -> Self {
        Target::Family(family)
    }
}
impl From<&str> for Target {
    fn from(name: &str) -> Self {
        match name.parse::<Family>() {
            Ok(family) => Target::Family(family),
            Err(_) => Target::Field(name.to_string()),
        }
    }
}
impl From<String> for Target {
    fn from(name: String) -> Self {
        Target::from(name.as_str())
    }
}

// ------------- Family state -------------
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FamilyState {
    and: Vec<Condition>,
    or: Vec<Condition>,
    resolved: Option<Relation>,
}
impl FamilyState {
    pub fn group(&self, relation: Relation) -> &[Condition] {
        match relation {
            Relation::And => &self.and,
            Relation::Or => &self.or,
        }
    }
    fn group_mut(&mut self, relation: Relation) -> &mut Vec<Condition> {
        match relation {
            Relation::And => &mut self.and,
            Relation::Or => &mut self.or,
        }
    }
    pub fn resolved(&self) -> Option<Relation> {
        self.resolved
    }
    pub fn is_conflicted(&self) -> bool {
        !self.and.is_empty() && !self.or.is_empty()
    }
    pub fn is_empty(&self) -> bool {
        self.and.is_empty() && self.or.is_empty()
    }
}

// ------------- Filter set -------------
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet {
    scalars: BTreeMap<String, Value>,
    meta: FamilyState,
    taxonomy: FamilyState,
}
impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    // scalars
    pub fn set_scalar(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let name = name.into();
        assert!(
            !Family::is_family_key(&name),
            "'{}' names a condition family and cannot be used as a scalar filter",
            name
        );
        self.scalars.insert(name, value.into());
        self
    }
    pub fn scalar(&self, name: &str) -> Option<&Value> {
        self.scalars.get(name)
    }
    pub fn unset_scalar(&mut self, name: &str) -> &mut Self {
        self.scalars.remove(name);
        self
    }
    pub fn scalars(&self) -> &BTreeMap<String, Value> {
        &self.scalars
    }

    // families
    pub fn family(&self, family: Family) -> &FamilyState {
        match family {
            Family::Meta => &self.meta,
            Family::Taxonomy => &self.taxonomy,
        }
    }
    fn family_mut(&mut self, family: Family) -> &mut FamilyState {
        match family {
            Family::Meta => &mut self.meta,
            Family::Taxonomy => &mut self.taxonomy,
        }
    }
    pub fn add_condition(
        &mut self,
        family: Family,
        relation: Relation,
        entry: impl Into<Condition>,
    ) -> &mut Self {
        self.family_mut(family).group_mut(relation).push(entry.into());
        self
    }
    pub fn has_conditions(&self, family: Family, relation: Relation) -> bool {
        !self.family(family).group(relation).is_empty()
    }
    pub fn conditions(&self, family: Family, relation: Relation) -> &[Condition] {
        self.family(family).group(relation)
    }
    pub fn reset_conditions(&mut self, family: Family, relation: Relation) -> &mut Self {
        self.family_mut(family).group_mut(relation).clear();
        self
    }
    pub(crate) fn take_conditions(&mut self, family: Family, relation: Relation) -> Vec<Condition> {
        std::mem::take(self.family_mut(family).group_mut(relation))
    }
    pub fn set_resolved_relation(&mut self, family: Family, relation: Relation) -> &mut Self {
        self.family_mut(family).resolved = Some(relation);
        self
    }
    pub fn resolved_relation(&self, family: Family) -> Option<Relation> {
        self.family(family).resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn family_names_parse_case_insensitively() {
        assert_eq!("META_QUERY".parse::<Family>().unwrap(), Family::Meta);
        assert_eq!("Tax_Query".parse::<Family>().unwrap(), Family::Taxonomy);
        assert_eq!("taxonomy".parse::<Family>().unwrap(), Family::Taxonomy);
        assert!(matches!(
            "post_query".parse::<Family>(),
            Err(QueryError::UnknownFamily(name)) if name == "post_query"
        ));
    }

    #[test]
    fn string_targets_route_to_families_or_fields() {
        assert_eq!(Target::from("Meta_Query"), Target::Family(Family::Meta));
        assert_eq!(Target::from("tax_query"), Target::Family(Family::Taxonomy));
        assert_eq!(Target::from("author"), Target::Field("author".to_string()));
    }

    #[test]
    fn scalar_last_write_wins_and_unset_removes() {
        let mut filters = FilterSet::new();
        filters.set_scalar("author", 1).set_scalar("author", 2);
        assert_eq!(filters.scalar("author"), Some(&json!(2)));
        filters.unset_scalar("author");
        assert!(filters.scalar("author").is_none());
    }

    #[test]
    #[should_panic(expected = "condition family")]
    fn scalar_cannot_shadow_a_family() {
        FilterSet::new().set_scalar("meta_query", json!([]));
    }

    #[test]
    #[should_panic(expected = "condition family")]
    fn scalar_cannot_shadow_a_family_by_short_name() {
        FilterSet::new().set_scalar("taxonomy", json!([]));
    }

    #[test]
    #[should_panic(expected = "condition family")]
    fn scalar_cannot_shadow_a_family_in_another_case() {
        FilterSet::new().set_scalar("META_QUERY", json!([]));
    }

    #[test]
    fn family_keys_cover_every_accepted_spelling() {
        for name in ["meta_query", "META_QUERY", "meta", "Tax_Query", "taxonomy"] {
            assert!(Family::is_family_key(name), "{}", name);
        }
        assert!(!Family::is_family_key("metadata"));
        assert!(!Family::is_family_key("post__in"));
    }

    #[test]
    fn condition_groups_are_kept_per_family_and_relation() {
        let mut filters = FilterSet::new();
        filters
            .add_condition(Family::Meta, Relation::And, "a1")
            .add_condition(Family::Meta, Relation::Or, "o1")
            .add_condition(Family::Meta, Relation::And, "a2");
        assert_eq!(
            filters.conditions(Family::Meta, Relation::And),
            &[Condition::from("a1"), Condition::from("a2")]
        );
        assert!(filters.has_conditions(Family::Meta, Relation::Or));
        assert!(!filters.has_conditions(Family::Taxonomy, Relation::And));
        assert!(filters.family(Family::Meta).is_conflicted());
        filters.reset_conditions(Family::Meta, Relation::Or);
        assert!(!filters.family(Family::Meta).is_conflicted());
        assert!(filters.family(Family::Taxonomy).is_empty());
    }
}
