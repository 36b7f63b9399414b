//! In-process oracle for unit tests

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

use super::{Oracle, OracleRequest};

type Handler = Box<dyn Fn(&OracleRequest) -> Result<Value> + Send + Sync>;

/// Oracle whose replies come from a closure
pub(crate) struct FnOracle {
    handler: Handler,
    delay: Option<Duration>,
    calls: AtomicUsize,
    subjects: Mutex<Vec<String>>,
}

impl FnOracle {
    pub(crate) fn new(handler: impl Fn(&OracleRequest) -> Result<Value> + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            delay: None,
            calls: AtomicUsize::new(0),
            subjects: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn slow(
        delay: Duration,
        handler: impl Fn(&OracleRequest) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        let mut oracle = Self::new(handler);
        oracle.delay = Some(delay);
        oracle
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn subjects(&self) -> Vec<String> {
        self.subjects.lock().unwrap().clone()
    }
}

#[async_trait]
impl Oracle for FnOracle {
    async fn invoke(&self, request: &OracleRequest) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.subjects.lock().unwrap().push(request.subject.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.handler)(request)
    }
}
