use serde_json::Value;

use crate::error::Result;
use crate::filters::PostId;
use crate::resolve::Request;

/// A single row handed back by an adapter.
pub trait Record {
    /// The backend's primary identifier for the row.
    fn id(&self) -> PostId;
    /// Reads a named field, `None` when the row has no such field.
    fn field(&self, name: &str) -> Option<Value>;
}

/// Runs a finalized request against a backend.
///
/// Implementations take `&self` and must tolerate being called again while
/// a previous call is still on the stack: materializing an AND-group issues a
/// nested request before the outer one is executed.
pub trait Adapter {
    type Row: Record;
    fn execute(&self, request: &Request) -> Result<Execution<Self::Row>>;
}

/// The raw result of one execution: the rows plus a literal rendering of what
/// was executed, used for instrumentation.
#[derive(Debug, Clone)]
pub struct Execution<R> {
    pub rows: Vec<R>,
    pub statement: String,
}
impl<R> Execution<R> {
    pub fn new(rows: Vec<R>, statement: impl Into<String>) -> Self {
        Self { rows, statement: statement.into() }
    }
    pub fn len(&self) -> usize {
        self.rows.len()
    }
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
