//! Turns an accumulated [`FilterSet`] into a [`Request`] a backend can run.
//!
//! A backend request holds one relation per condition family. When a family
//! has both an AND-group and an OR-group, the AND-group is materialized: a
//! copy of the filter set without the OR-group is executed, the identifiers of
//! the matching posts become a `post__in` filter on the original, and the
//! AND-group is dropped. What remains of each family is then moved into the
//! request by [`finalize`], which never touches a backend.

use std::collections::BTreeMap;
use std::fmt;

// used to deduplicate materialized identifiers
use roaring::RoaringTreemap;
use serde_json::{Map, Value};
use tracing::debug;

use crate::adapter::{Adapter, Execution, Record};
use crate::error::{QueryError, Result};
use crate::filters::{Condition, Family, FilterSet, POST_IN, PostId, Relation};
use crate::instrument::Instrument;

// ------------- Request -------------
#[derive(Debug, Clone, PartialEq)]
pub struct RelationGroup {
    pub relation: Relation,
    pub entries: Vec<Condition>,
}

/// A fully resolved filter set. Each family carries at most one relation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Request {
    scalars: BTreeMap<String, Value>,
    meta: Option<RelationGroup>,
    taxonomy: Option<RelationGroup>,
}
impl Request {
    pub fn scalar(&self, name: &str) -> Option<&Value> {
        self.scalars.get(name)
    }
    pub fn scalars(&self) -> &BTreeMap<String, Value> {
        &self.scalars
    }
    pub fn group(&self, family: Family) -> Option<&RelationGroup> {
        match family {
            Family::Meta => self.meta.as_ref(),
            Family::Taxonomy => self.taxonomy.as_ref(),
        }
    }
    /// Identifier constraint produced by materialization, if any.
    pub fn post_in(&self) -> Option<Vec<PostId>> {
        let values = self.scalars.get(POST_IN)?.as_array()?;
        Some(values.iter().filter_map(Value::as_u64).collect())
    }
    /// The request as a single JSON object in the WordPress query vocabulary.
    pub fn to_value(&self) -> Value {
        let mut object: Map<String, Value> =
            self.scalars.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        for family in Family::ALL {
            if let Some(group) = self.group(family) {
                let entries: Vec<Value> =
                    group.entries.iter().map(|c| c.payload().clone()).collect();
                let mut clauses = Map::new();
                clauses.insert("relation".to_string(), Value::from(group.relation.as_str()));
                clauses.insert("clauses".to_string(), Value::Array(entries));
                object.insert(family.key().to_string(), Value::Object(clauses));
            }
        }
        Value::Object(object)
    }
}
impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

// a resolved request can be fed back through resolution unchanged
impl From<Request> for FilterSet {
    fn from(request: Request) -> Self {
        let mut filters = FilterSet::new();
        for (name, value) in request.scalars {
            filters.set_scalar(name, value);
        }
        for (family, group) in [(Family::Meta, request.meta), (Family::Taxonomy, request.taxonomy)] {
            if let Some(group) = group {
                for entry in group.entries {
                    filters.add_condition(family, group.relation, entry);
                }
                filters.set_resolved_relation(family, group.relation);
            }
        }
        filters
    }
}

// ------------- Resolution -------------
pub fn conflicts(filters: &FilterSet) -> Vec<Family> {
    Family::ALL
        .into_iter()
        .filter(|family| filters.family(*family).is_conflicted())
        .collect()
}

/// Resolves every conflicted family, then finalizes.
pub fn resolve<A: Adapter + ?Sized>(
    mut filters: FilterSet,
    adapter: &A,
    instrument: &dyn Instrument,
) -> Result<Request> {
    carry_over(&mut filters, adapter, instrument)?;
    finalize(filters)
}

/// Replaces the AND-group of each conflicted family with a `post__in` filter.
pub fn carry_over<A: Adapter + ?Sized>(
    filters: &mut FilterSet,
    adapter: &A,
    instrument: &dyn Instrument,
) -> Result<()> {
    for family in Family::ALL {
        if !filters.family(family).is_conflicted() {
            continue;
        }
        let ids = materialize(filters, family, adapter, instrument)?;
        debug!(family = %family, ids = ids.len(), "AND group materialized");
        filters.set_scalar(POST_IN, ids);
        filters.reset_conditions(family, Relation::And);
    }
    Ok(())
}

/// Runs `filters` without the OR-group of `family` and collects the
/// identifiers of the rows, in result order.
///
/// The copy cannot conflict on `family` again, so this recurses at most once
/// per family.
pub fn materialize<A: Adapter + ?Sized>(
    filters: &FilterSet,
    family: Family,
    adapter: &A,
    instrument: &dyn Instrument,
) -> Result<Vec<PostId>> {
    let mut narrowed = filters.clone();
    narrowed.reset_conditions(family, Relation::Or);
    let request = resolve(narrowed, adapter, instrument)?;
    let execution = execute(&request, adapter, instrument)?;
    let mut seen = RoaringTreemap::new();
    let ids = execution
        .rows
        .iter()
        .map(Record::id)
        .filter(|id| seen.insert(*id))
        .collect();
    Ok(ids)
}

/// Moves the remaining group of each family into the request. Pure.
pub fn finalize(mut filters: FilterSet) -> Result<Request> {
    let mut request = Request::default();
    for family in Family::ALL {
        if filters.family(family).is_conflicted() {
            return Err(QueryError::Invariant(format!(
                "{} still carries both an AND and an OR group",
                family
            )));
        }
        let mut group = None;
        for relation in Relation::ALL {
            if filters.has_conditions(family, relation) {
                filters.set_resolved_relation(family, relation);
                let entries = filters.take_conditions(family, relation);
                group = Some(RelationGroup { relation, entries });
            }
        }
        match family {
            Family::Meta => request.meta = group,
            Family::Taxonomy => request.taxonomy = group,
        }
    }
    request.scalars = filters.scalars().clone();
    Ok(request)
}

/// Executes a request, bracketed by the instrument.
pub fn execute<A: Adapter + ?Sized>(
    request: &Request,
    adapter: &A,
    instrument: &dyn Instrument,
) -> Result<Execution<A::Row>> {
    let ticket = instrument.on_start();
    let execution = adapter.execute(request)?;
    instrument.on_complete(ticket, &execution.statement);
    Ok(execution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::Silent;
    use serde_json::json;
    use std::cell::RefCell;

    struct Row(PostId);
    impl Record for Row {
        fn id(&self) -> PostId {
            self.0
        }
        fn field(&self, _name: &str) -> Option<Value> {
            None
        }
    }

    // answers every request with the same identifiers and remembers requests
    struct Canned {
        ids: Vec<PostId>,
        seen: RefCell<Vec<Request>>,
    }
    impl Canned {
        fn new(ids: Vec<PostId>) -> Self {
            Self { ids, seen: RefCell::new(Vec::new()) }
        }
    }
    impl Adapter for Canned {
        type Row = Row;
        fn execute(&self, request: &Request) -> Result<Execution<Row>> {
            self.seen.borrow_mut().push(request.clone());
            Ok(Execution::new(self.ids.iter().map(|id| Row(*id)).collect(), request.to_string()))
        }
    }

    fn conflicted() -> FilterSet {
        let mut filters = FilterSet::new();
        filters
            .set_scalar("orderby", "title")
            .add_condition(Family::Meta, Relation::And, "a1")
            .add_condition(Family::Meta, Relation::Or, "o1")
            .add_condition(Family::Meta, Relation::And, "a2");
        filters
    }

    #[test]
    fn finalize_passes_a_single_group_through() {
        let mut filters = FilterSet::new();
        filters
            .add_condition(Family::Taxonomy, Relation::Or, "t1")
            .add_condition(Family::Taxonomy, Relation::Or, "t2");
        let request = finalize(filters).unwrap();
        let group = request.group(Family::Taxonomy).unwrap();
        assert_eq!(group.relation, Relation::Or);
        assert_eq!(group.entries, vec![Condition::from("t1"), Condition::from("t2")]);
        assert!(request.group(Family::Meta).is_none());
    }

    #[test]
    fn finalize_refuses_an_unresolved_conflict() {
        assert!(matches!(finalize(conflicted()), Err(QueryError::Invariant(_))));
    }

    #[test]
    fn materialize_drops_the_or_group_and_keeps_scalars() {
        let adapter = Canned::new(vec![7, 9]);
        let ids = materialize(&conflicted(), Family::Meta, &adapter, &Silent).unwrap();
        assert_eq!(ids, vec![7, 9]);
        let seen = adapter.seen.borrow();
        assert_eq!(seen.len(), 1);
        let group = seen[0].group(Family::Meta).unwrap();
        assert_eq!(group.relation, Relation::And);
        assert_eq!(group.entries, vec![Condition::from("a1"), Condition::from("a2")]);
        assert_eq!(seen[0].scalar("orderby"), Some(&json!("title")));
    }

    #[test]
    fn materialize_keeps_first_occurrence_order() {
        let adapter = Canned::new(vec![9, 7, 9, 3]);
        let ids = materialize(&conflicted(), Family::Meta, &adapter, &Silent).unwrap();
        assert_eq!(ids, vec![9, 7, 3]);
    }

    #[test]
    fn conflict_becomes_post_in_plus_or_group() {
        let adapter = Canned::new(vec![7, 9]);
        let request = resolve(conflicted(), &adapter, &Silent).unwrap();
        assert_eq!(request.post_in(), Some(vec![7, 9]));
        let group = request.group(Family::Meta).unwrap();
        assert_eq!(group.relation, Relation::Or);
        assert_eq!(group.entries, vec![Condition::from("o1")]);
    }

    #[test]
    fn empty_materialization_is_an_empty_post_in() {
        let adapter = Canned::new(vec![]);
        let request = resolve(conflicted(), &adapter, &Silent).unwrap();
        assert_eq!(request.scalar(POST_IN), Some(&json!([])));
        assert_eq!(request.post_in(), Some(vec![]));
    }

    #[test]
    fn request_without_conflict_has_no_post_in() {
        let mut filters = FilterSet::new();
        filters.add_condition(Family::Meta, Relation::And, "a1");
        let adapter = Canned::new(vec![1]);
        let request = resolve(filters, &adapter, &Silent).unwrap();
        assert!(request.post_in().is_none());
        assert!(adapter.seen.borrow().is_empty());
    }

    #[test]
    fn resolving_twice_is_a_no_op() {
        let adapter = Canned::new(vec![7, 9]);
        let first = resolve(conflicted(), &adapter, &Silent).unwrap();
        let calls = adapter.seen.borrow().len();
        let again = resolve(FilterSet::from(first.clone()), &adapter, &Silent).unwrap();
        assert_eq!(first, again);
        assert_eq!(adapter.seen.borrow().len(), calls);
    }

    #[test]
    fn families_resolve_independently() {
        let mut filters = FilterSet::new();
        filters
            .add_condition(Family::Meta, Relation::And, "a1")
            .add_condition(Family::Taxonomy, Relation::And, "t1")
            .add_condition(Family::Taxonomy, Relation::Or, "t2");
        let adapter = Canned::new(vec![4]);
        let request = resolve(filters, &adapter, &Silent).unwrap();
        // the meta family is untouched by the taxonomy conflict
        let meta = request.group(Family::Meta).unwrap();
        assert_eq!(meta.relation, Relation::And);
        assert_eq!(meta.entries, vec![Condition::from("a1")]);
        let tax = request.group(Family::Taxonomy).unwrap();
        assert_eq!(tax.relation, Relation::Or);
        assert_eq!(tax.entries, vec![Condition::from("t2")]);
        // the sub-query still saw the meta conditions
        let seen = adapter.seen.borrow();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].group(Family::Meta).is_some());
    }

    #[test]
    fn two_conflicts_recurse_at_most_twice() {
        let mut filters = conflicted();
        filters
            .add_condition(Family::Taxonomy, Relation::And, "t1")
            .add_condition(Family::Taxonomy, Relation::Or, "t2");
        let adapter = Canned::new(vec![1, 2]);
        let request = resolve(filters, &adapter, &Silent).unwrap();
        // meta copy resolves its own taxonomy conflict, then taxonomy on the original
        assert_eq!(adapter.seen.borrow().len(), 3);
        assert_eq!(request.group(Family::Meta).unwrap().relation, Relation::Or);
        assert_eq!(request.group(Family::Taxonomy).unwrap().relation, Relation::Or);
        assert_eq!(request.post_in(), Some(vec![1, 2]));
    }
}
