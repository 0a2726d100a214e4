use std::time::{Duration, Instant};

use lazy_static::lazy_static;
use regex::Regex;
use tracing::info;

use crate::settings::Settings;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Opaque marker returned by [`Instrument::on_start`].
#[derive(Debug, Clone, Copy)]
pub struct Ticket {
    started: Instant,
}
impl Ticket {
    pub fn now() -> Self {
        Self { started: Instant::now() }
    }
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Brackets each execution. Neither callback can fail or touch the result.
pub trait Instrument {
    fn on_start(&self) -> Ticket {
        Ticket::now()
    }
    fn on_complete(&self, ticket: Ticket, statement: &str);
}

impl<T: Instrument + ?Sized> Instrument for &T {
    fn on_start(&self) -> Ticket {
        (**self).on_start()
    }
    fn on_complete(&self, ticket: Ticket, statement: &str) {
        (**self).on_complete(ticket, statement)
    }
}

/// Does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;
impl Instrument for Silent {
    fn on_complete(&self, _ticket: Ticket, _statement: &str) {}
}

/// Logs each executed statement on one line with its duration.
#[derive(Debug, Clone)]
pub struct TracingInstrument {
    enabled: bool,
    context: String,
}
impl TracingInstrument {
    pub fn new(settings: &Settings) -> Self {
        Self { enabled: settings.is_development(), context: "[Query]".to_string() }
    }
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }
}
impl Default for TracingInstrument {
    fn default() -> Self {
        Self::new(&Settings::default())
    }
}
impl Instrument for TracingInstrument {
    fn on_complete(&self, ticket: Ticket, statement: &str) {
        if !self.enabled {
            return;
        }
        let line = completion_line(statement, ticket.elapsed());
        info!("{} {}", self.context, line);
    }
}

pub fn one_line(statement: &str) -> String {
    WHITESPACE.replace_all(statement.trim(), " ").into_owned()
}

pub fn completion_line(statement: &str, elapsed: Duration) -> String {
    let seconds = (elapsed.as_secs_f64() * 10_000.0).round() / 10_000.0;
    format!("{} (Done in {} seconds)", one_line(statement), seconds)
}
