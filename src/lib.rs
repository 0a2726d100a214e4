//! Postquery – a fluent filter-query composer for WordPress-shaped post stores.
//!
//! Postquery centers on the *filter set*: a bag of named scalar filters
//! (ordering, pagination, status, type, date range, arbitrary equality
//! filters) plus two *condition families*:
//! * [`filters::Family::Meta`] – conditions on post meta (`meta_query`).
//! * [`filters::Family::Taxonomy`] – conditions on assigned terms (`tax_query`).
//!
//! Each family accumulates an AND-group and an OR-group while a query is being
//! built. A backend request can only carry a single relation per family, so
//! when both groups are populated the [`resolve`] module *materializes* the
//! AND-group: it runs a narrower sub-query, collects the identifiers of the
//! matching posts and folds them back into the request as a `post__in`
//! filter. The OR-group then survives as the family's only relation.
//!
//! ## Modules
//! * [`filters`] – The [`filters::FilterSet`], families, relations and the
//!   opaque [`filters::Condition`] payload.
//! * [`clause`] – Typed constructors for meta and taxonomy conditions and the
//!   [`clause::DateRange`] filter.
//! * [`resolve`] – Conflict detection, materialization and the pure finalize
//!   step producing a [`resolve::Request`].
//! * [`query`] – The chainable [`query::Query`] builder.
//! * [`adapter`] – The [`adapter::Adapter`] trait every backend implements.
//! * [`instrument`] – Start/complete hooks bracketing each execution.
//! * [`sqlite`] – A SQLite backed adapter with a WordPress-like schema.
//! * [`settings`] – Builder defaults and logging configuration.
//!
//! ## Quick Start
//! ```
//! use postquery::{query::Query, sqlite::{SqliteStore, PersistenceMode, NewPost}};
//! use postquery::clause::MetaClause;
//! let store = SqliteStore::new(PersistenceMode::InMemory).unwrap();
//! let id = store.insert_post(&NewPost::new("Hello", "post")).unwrap();
//! store.add_meta(id, "color", "red").unwrap();
//! let posts = Query::new(&store)
//!     .and_where("meta_query", MetaClause::equals("color", "red"))
//!     .fetch()
//!     .unwrap();
//! assert_eq!(posts.len(), 1);
//! ```
//!
//! ## Conflict Resolution
//! ```text
//! where(meta, a1) orWhere(meta, o1) where(meta, a2)
//!   -> sub-query: meta AND [a1, a2]            => ids [7, 9]
//!   -> request:   post__in [7, 9], meta OR [o1]
//! ```
//! Resolution never recurses more than one level per family, so at most two
//! nested sub-queries run for a single `query()` call.

pub mod adapter;
pub mod clause;
pub mod error;
pub mod filters;
pub mod instrument;
pub mod query;
pub mod resolve;
pub mod settings;
pub mod sqlite;

pub use error::{QueryError, Result};
