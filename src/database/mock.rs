//! In-memory session factory for tests.

use crate::database::result::QueryOutcome;
use crate::database::traits::{PlaceholderStyle, Session, SessionFactory};
use crate::error::{DatabaseError, DbResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Shared counters and failure switches behind every mock session.
#[derive(Debug, Default)]
pub struct MockState {
    opens: AtomicUsize,
    closes: AtomicUsize,
    executes: AtomicUsize,
    open_failures: AtomicUsize,
    execute_failures: AtomicUsize,
    execute_delay: Mutex<Option<Duration>>,
    close_delay: Mutex<Option<Duration>>,
    outcome: Mutex<Option<QueryOutcome>>,
    statements: Mutex<Vec<(String, Vec<String>)>>,
}

impl MockState {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn executes(&self) -> usize {
        self.executes.load(Ordering::SeqCst)
    }

    /// The next `n` opens fail.
    pub fn fail_opens(&self, n: usize) {
        self.open_failures.store(n, Ordering::SeqCst);
    }

    /// The next `n` statements fail.
    pub fn fail_executes(&self, n: usize) {
        self.execute_failures.store(n, Ordering::SeqCst);
    }

    pub fn set_execute_delay(&self, delay: Duration) {
        *self.execute_delay.lock() = Some(delay);
    }

    /// Backend close takes `delay`; the close is only counted once it completes.
    pub fn set_close_delay(&self, delay: Duration) {
        *self.close_delay.lock() = Some(delay);
    }

    pub fn set_outcome(&self, outcome: QueryOutcome) {
        *self.outcome.lock() = Some(outcome);
    }

    pub fn statements(&self) -> Vec<(String, Vec<String>)> {
        self.statements.lock().clone()
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

pub struct MockFactory {
    state: Arc<MockState>,
    style: PlaceholderStyle,
}

impl MockFactory {
    pub fn new(style: PlaceholderStyle) -> (Arc<Self>, Arc<MockState>) {
        let state = Arc::new(MockState::default());
        let factory = Arc::new(Self {
            state: Arc::clone(&state),
            style,
        });
        (factory, state)
    }
}

#[async_trait]
impl SessionFactory for MockFactory {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        self.style
    }

    async fn open(&self) -> DbResult<Box<dyn Session>> {
        if take_one(&self.state.open_failures) {
            return Err(DatabaseError::ConnectionFailed("mock refused login".into()));
        }
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }))
    }
}

struct MockSession {
    state: Arc<MockState>,
    closed: AtomicBool,
}

#[async_trait]
impl Session for MockSession {
    async fn execute(&self, sql: &str, params: &[String]) -> DbResult<QueryOutcome> {
        self.state.executes.fetch_add(1, Ordering::SeqCst);
        let delay = *self.state.execute_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(DatabaseError::QueryFailed("session is closed".into()));
        }
        if take_one(&self.state.execute_failures) {
            return Err(DatabaseError::QueryFailed("server closed the connection unexpectedly".into()));
        }

        self.state
            .statements
            .lock()
            .push((sql.to_string(), params.to_vec()));
        let outcome = self.state.outcome.lock().clone();
        Ok(outcome.unwrap_or_else(|| QueryOutcome::no_rows(Some(0))))
    }

    async fn close(&self) -> DbResult<()> {
        let delay = *self.state.close_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
