use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

const MAX_LOG_LINES: usize = 50;

macro_rules! debug_eprintln {
    ($($arg:tt)*) => {
        if std::env::var("MAIL_ORACLE_DEBUG").is_ok() {
            eprintln!($($arg)*);
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Info,
    Success,
    Warning,
    Error,
    Api,
    Auth,
}

impl Kind {
    pub fn label(self) -> &'static str {
        match self {
            Kind::Info => "INFO",
            Kind::Success => "SUCCESS",
            Kind::Warning => "WARNING",
            Kind::Error => "ERROR",
            Kind::Api => "API",
            Kind::Auth => "AUTH",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub text: String,
    pub kind: Kind,
    pub at: DateTime<Local>,
}

impl Entry {
    pub fn line(&self) -> String {
        format!("[{}] [{}] {}", self.at.format("%H:%M:%S"), self.kind.label(), self.text)
    }
}

static ACTIVITY_LOG: Lazy<Mutex<VecDeque<Entry>>> = Lazy::new(|| Mutex::new(VecDeque::with_capacity(MAX_LOG_LINES)));

pub fn log<T: Into<String>>(line: T) {
    log_with(Kind::Info, line);
}

pub fn log_with<T: Into<String>>(kind: Kind, line: T) {
    let entry = Entry { text: line.into(), kind, at: Local::now() };
    debug_eprintln!("{}", entry.line());

    // A panic while holding the lock must not silence later log lines.
    let mut ring = ACTIVITY_LOG.lock().unwrap_or_else(PoisonError::into_inner);
    while ring.len() >= MAX_LOG_LINES {
        ring.pop_front();
    }
    ring.push_back(entry);
}

/// The newest `n` entries, oldest first.
pub fn recent(n: usize) -> Vec<Entry> {
    let ring = ACTIVITY_LOG.lock().unwrap_or_else(PoisonError::into_inner);
    let from = ring.len().saturating_sub(n);
    ring.range(from..).cloned().collect()
}
