//! SQLite execution adapter over a WordPress-shaped schema.
//!
//! Requests are rendered into a single `select` over `posts`. Meta and
//! taxonomy clauses become correlated `exists` sub-selects combined with the
//! family's relation; scalar filters become plain predicates. Scalar filters
//! the renderer does not know are ignored, the way WordPress ignores unknown
//! query vars.

// used for persistence
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, Row, params, params_from_iter};

// used for post dates
use chrono::{NaiveDateTime, Utc};

use serde_json::Value;
use tracing::debug;

use crate::adapter::{Adapter, Execution, Record};
use crate::clause::{Compare, DateRange, MetaClause, TaxClause, TaxOperator, TermField};
use crate::error::{QueryError, Result};
use crate::filters::{
    DATE_QUERY, Family, NOPAGING, ORDER, ORDERBY, POST_IN, POST_STATUS, POST_TYPE, POSTS_PER_PAGE,
    PostId, Relation, SUPPRESS_FILTERS,
};
use crate::resolve::{RelationGroup, Request};

pub type TermId = u64;

const DEFAULT_POSTS_PER_PAGE: i64 = 10;
const COLUMNS: &str = "p.ID, p.post_title, p.post_name, p.post_status, p.post_type, p.post_parent, p.menu_order, p.post_date, p.post_modified";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceMode {
    InMemory,
    File(String),
}

// ------------- Post -------------
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub name: String,
    pub status: String,
    pub post_type: String,
    pub parent: PostId,
    pub menu_order: i64,
    pub date: NaiveDateTime,
    pub modified: NaiveDateTime,
}
impl Post {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get::<_, i64>(0)? as PostId,
            title: row.get(1)?,
            name: row.get(2)?,
            status: row.get(3)?,
            post_type: row.get(4)?,
            parent: row.get::<_, i64>(5)? as PostId,
            menu_order: row.get(6)?,
            date: row.get(7)?,
            modified: row.get(8)?,
        })
    }
}
impl Record for Post {
    fn id(&self) -> PostId {
        self.id
    }
    fn field(&self, name: &str) -> Option<Value> {
        let value = match name {
            "ID" | "id" => Value::from(self.id),
            "post_title" | "title" => Value::from(self.title.as_str()),
            "post_name" | "name" => Value::from(self.name.as_str()),
            "post_status" | "status" => Value::from(self.status.as_str()),
            "post_type" | "type" => Value::from(self.post_type.as_str()),
            "post_parent" | "parent" => Value::from(self.parent),
            "menu_order" => Value::from(self.menu_order),
            "post_date" | "date" => Value::from(self.date.format("%Y-%m-%d %H:%M:%S").to_string()),
            "post_modified" | "modified" => {
                Value::from(self.modified.format("%Y-%m-%d %H:%M:%S").to_string())
            }
            _ => return None,
        };
        Some(value)
    }
}

#[derive(Debug, Clone)]
pub struct NewPost {
    title: String,
    name: String,
    status: String,
    post_type: String,
    parent: PostId,
    menu_order: i64,
    date: NaiveDateTime,
}
impl NewPost {
    pub fn new(title: impl Into<String>, post_type: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            name: slugify(&title),
            title,
            status: "publish".to_string(),
            post_type: post_type.into(),
            parent: 0,
            menu_order: 0,
            date: Utc::now().naive_utc(),
        }
    }
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }
    pub fn parent(mut self, parent: PostId) -> Self {
        self.parent = parent;
        self
    }
    pub fn menu_order(mut self, menu_order: i64) -> Self {
        self.menu_order = menu_order;
        self
    }
    pub fn date(mut self, date: NaiveDateTime) -> Self {
        self.date = date;
        self
    }
}

fn slugify(title: &str) -> String {
    let mut slug = String::new();
    for c in title.trim().chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

// ------------- Store -------------
pub struct SqliteStore {
    connection: Connection,
}
impl SqliteStore {
    pub fn new(mode: PersistenceMode) -> Result<Self> {
        let connection = match &mode {
            PersistenceMode::InMemory => Connection::open_in_memory()?,
            PersistenceMode::File(path) => Connection::open(path)?,
        };
        connection.execute_batch(
            "
            create table if not exists posts (
                ID integer primary key autoincrement,
                post_title text not null,
                post_name text not null,
                post_status text not null,
                post_type text not null,
                post_parent integer not null default 0,
                menu_order integer not null default 0,
                post_date text not null,
                post_modified text not null
            );
            create table if not exists postmeta (
                meta_id integer primary key autoincrement,
                post_id integer not null,
                meta_key text not null,
                meta_value text null,
                constraint postmeta_of_post foreign key (
                    post_id
                ) references posts(ID)
            );
            create index if not exists postmeta_by_key on postmeta (post_id, meta_key);
            create table if not exists terms (
                term_id integer primary key autoincrement,
                taxonomy text not null,
                slug text not null,
                name text not null,
                constraint unique_term unique (
                    taxonomy,
                    slug
                )
            );
            create table if not exists term_relationships (
                object_id integer not null,
                term_id integer not null,
                constraint relationship_of_post foreign key (
                    object_id
                ) references posts(ID),
                constraint relationship_of_term foreign key (
                    term_id
                ) references terms(term_id),
                constraint unique_relationship primary key (
                    object_id,
                    term_id
                )
            );
            ",
        )?;
        debug!(mode = ?mode, "store opened");
        Ok(Self { connection })
    }
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn insert_post(&self, post: &NewPost) -> Result<PostId> {
        self.connection.execute(
            "
            insert into posts (
                post_title,
                post_name,
                post_status,
                post_type,
                post_parent,
                menu_order,
                post_date,
                post_modified
            ) values (?, ?, ?, ?, ?, ?, ?, ?)
            ",
            params![
                &post.title,
                &post.name,
                &post.status,
                &post.post_type,
                post.parent as i64,
                &post.menu_order,
                &post.date,
                &post.date
            ],
        )?;
        Ok(self.connection.last_insert_rowid() as PostId)
    }
    pub fn add_meta(&self, post: PostId, key: &str, value: impl ToString) -> Result<()> {
        self.connection.execute(
            "insert into postmeta (post_id, meta_key, meta_value) values (?, ?, ?)",
            params![post as i64, key, value.to_string()],
        )?;
        Ok(())
    }
    /// Registers a term, returning the existing identifier for a known slug.
    pub fn add_term(&self, taxonomy: &str, slug: &str, name: &str) -> Result<TermId> {
        self.connection.execute(
            "insert or ignore into terms (taxonomy, slug, name) values (?, ?, ?)",
            params![taxonomy, slug, name],
        )?;
        let term: i64 = self.connection.query_row(
            "select term_id from terms where taxonomy = ? and slug = ?",
            params![taxonomy, slug],
            |r| r.get(0),
        )?;
        Ok(term as TermId)
    }
    pub fn assign_term(&self, post: PostId, term: TermId) -> Result<()> {
        self.connection.execute(
            "insert or ignore into term_relationships (object_id, term_id) values (?, ?)",
            params![post as i64, term as i64],
        )?;
        Ok(())
    }
    /// Whether a post with this identifier is stored, in any status. The
    /// identifier 0 refers to no post at all and always passes.
    pub fn post_exists(&self, post: PostId) -> Result<bool> {
        if post == 0 {
            return Ok(true);
        }
        let exists: bool = self.connection.query_row(
            "select exists (select 1 from posts where ID = ?)",
            params![post as i64],
            |r| r.get(0),
        )?;
        Ok(exists)
    }
}

impl Adapter for SqliteStore {
    type Row = Post;
    fn execute(&self, request: &Request) -> Result<Execution<Post>> {
        let statement = render(request)?;
        let mut prepared = self.connection.prepare(&statement.sql)?;
        let rows = prepared
            .query_map(params_from_iter(statement.params.iter()), Post::from_row)?
            .collect::<rusqlite::Result<Vec<Post>>>()?;
        Ok(Execution::new(rows, statement.describe()))
    }
}

// ------------- Rendering -------------
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}
impl Statement {
    /// The SQL with every placeholder replaced by its literal value.
    pub fn describe(&self) -> String {
        let mut described = String::with_capacity(self.sql.len());
        let mut params = self.params.iter();
        for c in self.sql.chars() {
            if c == '?' {
                match params.next() {
                    Some(param) => described.push_str(&literal(param)),
                    None => described.push(c),
                }
            } else {
                described.push(c);
            }
        }
        described
    }
}

fn literal(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Integer(i) => i.to_string(),
        SqlValue::Real(r) => r.to_string(),
        SqlValue::Text(t) => format!("'{}'", t.replace('\'', "''")),
        SqlValue::Blob(b) => format!("X'{}'", b.iter().map(|x| format!("{:02X}", x)).collect::<String>()),
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => SqlValue::Integer(i),
            (None, Some(f)) => SqlValue::Real(f),
            _ => SqlValue::Text(n.to_string()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

// a scalar or a list of scalars
fn values_of(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(values) => values.iter().collect(),
        single => vec![single],
    }
}

// a LIKE pattern matching `term` anywhere, with its own wildcards taken literally
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

#[derive(Default)]
struct Renderer {
    predicates: Vec<String>,
    params: Vec<SqlValue>,
}
impl Renderer {
    fn push(&mut self, predicate: impl Into<String>, params: Vec<SqlValue>) {
        self.predicates.push(predicate.into());
        self.params.extend(params);
    }
    fn list(&mut self, column: &str, negate: bool, value: &Value) {
        let values = values_of(value);
        if values.is_empty() {
            // an empty positive list matches nothing, an empty exclusion nothing to exclude
            if !negate {
                self.push("0 = 1", Vec::new());
            }
            return;
        }
        let op = if negate { "not in" } else { "in" };
        let predicate = format!("{} {} ({})", column, op, placeholders(values.len()));
        self.push(predicate, values.into_iter().map(to_sql).collect());
    }
}

pub fn render(request: &Request) -> Result<Statement> {
    let mut renderer = Renderer::default();
    for (name, value) in request.scalars() {
        match name.as_str() {
            POST_IN => renderer.list("p.ID", false, value),
            "post__not_in" => renderer.list("p.ID", true, value),
            "p" => renderer.push("p.ID = ?", vec![to_sql(value)]),
            "name" => renderer.push("p.post_name = ?", vec![to_sql(value)]),
            "post_parent" => renderer.push("p.post_parent = ?", vec![to_sql(value)]),
            "s" => {
                let term = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
                renderer.push("p.post_title like ? escape '\\'", vec![SqlValue::Text(like_pattern(&term))]);
            }
            POST_STATUS => render_status(&mut renderer, value),
            POST_TYPE => {
                if !values_of(value).iter().any(|v| v.as_str() == Some("any")) {
                    renderer.list("p.post_type", false, value);
                }
            }
            DATE_QUERY => render_dates(&mut renderer, &DateRange::from_value(value)?),
            ORDERBY | ORDER | NOPAGING | POSTS_PER_PAGE | "paged" | "offset" | SUPPRESS_FILTERS => (),
            unknown => debug!(var = unknown, "ignoring unsupported query var"),
        }
    }
    for family in Family::ALL {
        if let Some(group) = request.group(family) {
            render_group(&mut renderer, family, group)?;
        }
    }

    let mut sql = format!("\n            select {}\n                from posts p\n                where 1 = 1", COLUMNS);
    for predicate in &renderer.predicates {
        sql.push_str("\n                and ");
        sql.push_str(predicate);
    }
    sql.push_str(&order_clause(request));
    sql.push_str(&limit_clause(request)?);
    sql.push('\n');
    Ok(Statement { sql, params: renderer.params })
}

fn render_status(renderer: &mut Renderer, value: &Value) {
    if values_of(value).iter().any(|v| v.as_str() == Some("any")) {
        renderer.list("p.post_status", true, &serde_json::json!(["trash", "auto-draft"]));
    } else {
        renderer.list("p.post_status", false, value);
    }
}

fn render_dates(renderer: &mut Renderer, range: &DateRange) {
    let (lower, upper) = if range.inclusive { (">=", "<=") } else { (">", "<") };
    if let Some(after) = range.after {
        renderer.push(
            format!("date(p.post_date) {} ?", lower),
            vec![SqlValue::Text(after.format("%Y-%m-%d").to_string())],
        );
    }
    if let Some(before) = range.before {
        renderer.push(
            format!("date(p.post_date) {} ?", upper),
            vec![SqlValue::Text(before.format("%Y-%m-%d").to_string())],
        );
    }
}

fn render_group(renderer: &mut Renderer, family: Family, group: &RelationGroup) -> Result<()> {
    let mut clauses = Vec::new();
    for entry in &group.entries {
        let (predicate, params) = match family {
            Family::Meta => meta_predicate(&MetaClause::from_condition(entry)?)?,
            Family::Taxonomy => tax_predicate(&TaxClause::from_condition(entry)?),
        };
        clauses.push(predicate);
        renderer.params.extend(params);
    }
    if clauses.is_empty() {
        return Ok(());
    }
    let joiner = match group.relation {
        Relation::And => "\n                    and ",
        Relation::Or => "\n                    or ",
    };
    renderer.predicates.push(format!("(\n                    {}\n                )", clauses.join(joiner)));
    Ok(())
}

fn meta_predicate(clause: &MetaClause) -> Result<(String, Vec<SqlValue>)> {
    let exists = "exists (select 1 from postmeta m where m.post_id = p.ID and m.meta_key = ?";
    let mut params = vec![SqlValue::Text(clause.key.clone())];
    let predicate = match clause.compare {
        Compare::Exists => format!("{})", exists),
        Compare::NotExists => format!("not {})", exists),
        Compare::In | Compare::NotIn => {
            let values = clause.value.as_ref().map(values_of).unwrap_or_default();
            let negate = clause.compare == Compare::NotIn;
            if values.is_empty() {
                if negate { format!("{})", exists) } else { "0 = 1".to_string() }
            } else {
                let op = if negate { "not in" } else { "in" };
                params.extend(values.into_iter().map(meta_text));
                format!("{} and m.meta_value {} ({}))", exists, op, placeholders(params.len() - 1))
            }
        }
        Compare::Like | Compare::NotLike => {
            let value = required_value(clause)?;
            let pattern = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
            params.push(SqlValue::Text(like_pattern(&pattern)));
            format!("{} and m.meta_value {} ? escape '\\')", exists, clause.compare.as_str().to_lowercase())
        }
        _ => {
            let value = required_value(clause)?;
            // numbers compare numerically, everything else as text
            let column = if value.is_number() { "cast(m.meta_value as numeric)" } else { "m.meta_value" };
            params.push(if value.is_number() { to_sql(value) } else { meta_text(value) });
            format!("{} and {} {} ?)", exists, column, clause.compare.as_str())
        }
    };
    Ok((predicate, params))
}

fn required_value(clause: &MetaClause) -> Result<&Value> {
    clause.value.as_ref().ok_or_else(|| QueryError::Decode {
        message: format!("meta clause on '{}' needs a value for {}", clause.key, clause.compare.as_str()),
    })
}

// meta values are stored as text
fn meta_text(value: &Value) -> SqlValue {
    match value {
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn tax_predicate(clause: &TaxClause) -> (String, Vec<SqlValue>) {
    let column = match clause.field {
        TermField::TermId => "t.term_id",
        TermField::Slug => "t.slug",
        TermField::Name => "t.name",
    };
    if clause.terms.is_empty() {
        let predicate = match clause.operator {
            TaxOperator::In => "0 = 1",
            TaxOperator::NotIn | TaxOperator::And => "1 = 1",
        };
        return (predicate.to_string(), Vec::new());
    }
    let mut params = vec![SqlValue::Text(clause.taxonomy.clone())];
    params.extend(clause.terms.iter().map(to_sql));
    let matching = format!(
        "from term_relationships tr join terms t on t.term_id = tr.term_id where tr.object_id = p.ID and t.taxonomy = ? and {} in ({})",
        column,
        placeholders(clause.terms.len())
    );
    let predicate = match clause.operator {
        TaxOperator::In => format!("exists (select 1 {})", matching),
        TaxOperator::NotIn => format!("not exists (select 1 {})", matching),
        TaxOperator::And => {
            let mut distinct: Vec<String> = clause.terms.iter().map(Value::to_string).collect();
            distinct.sort();
            distinct.dedup();
            format!("(select count(distinct t.term_id) {}) = {}", matching, distinct.len())
        }
    };
    (predicate, params)
}

fn order_clause(request: &Request) -> String {
    let direction = match request.scalar(ORDER).and_then(Value::as_str) {
        Some(order) if order.eq_ignore_ascii_case("ASC") => "asc",
        _ => "desc",
    };
    let column = match request.scalar(ORDERBY).and_then(Value::as_str) {
        Some("none") => return String::new(),
        Some("rand") => return "\n                order by random()".to_string(),
        Some("title") | Some("post_title") => "p.post_title",
        Some("name") | Some("post_name") => "p.post_name",
        Some("ID") | Some("id") => "p.ID",
        Some("menu_order") => "p.menu_order",
        Some("type") | Some("post_type") => "p.post_type",
        Some("status") | Some("post_status") => "p.post_status",
        Some("modified") | Some("post_modified") => "p.post_modified",
        Some("parent") | Some("post_parent") => "p.post_parent",
        _ => "p.post_date",
    };
    if column == "p.ID" {
        format!("\n                order by p.ID {}", direction)
    } else {
        format!("\n                order by {} {}, p.ID asc", column, direction)
    }
}

fn limit_clause(request: &Request) -> Result<String> {
    if request.scalar(NOPAGING).and_then(Value::as_bool).unwrap_or(false) {
        return Ok(String::new());
    }
    let per_page = request
        .scalar(POSTS_PER_PAGE)
        .and_then(Value::as_i64)
        .unwrap_or(DEFAULT_POSTS_PER_PAGE);
    if per_page < 0 {
        return Ok(String::new());
    }
    let offset = match request.scalar("offset").and_then(Value::as_i64) {
        Some(offset) => offset.max(0),
        None => {
            let paged = request.scalar("paged").and_then(Value::as_i64).unwrap_or(1).max(1);
            (paged - 1).checked_mul(per_page).ok_or_else(|| QueryError::Decode {
                message: format!("page {} of {} posts is out of range", paged, per_page),
            })?
        }
    };
    Ok(format!("\n                limit {} offset {}", per_page, offset))
}
