// SPDX-License-Identifier: MIT
//
// QRNG Supply: Buffered Quantum Randomness for Impatient Consumers

//! Test doubles for the upstream API

use crate::upstream::{FetchResult, UpstreamSource};
use crate::{Error, UpstreamErrorKind};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

type Generator = Box<dyn FnMut(usize) -> FetchResult + Send>;

/// Upstream that replays scripted results, then falls back to a generator
pub(crate) struct ScriptedSource {
    steps: Mutex<VecDeque<FetchResult>>,
    generator: Mutex<Option<Generator>>,
    gate: Option<Arc<Semaphore>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub(crate) fn new(steps: Vec<FetchResult>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            generator: Mutex::new(None),
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Serve `generator(byte_count)` once the script runs out
    pub(crate) fn generating(generator: impl FnMut(usize) -> FetchResult + Send + 'static) -> Self {
        let source = Self::new(Vec::new());
        *source.generator.lock() = Some(Box::new(generator));
        source
    }

    /// Hold every fetch until a permit is added to `gate`
    pub(crate) fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_result(&self, byte_count: usize) -> FetchResult {
        if let Some(step) = self.steps.lock().pop_front() {
            return step;
        }
        match self.generator.lock().as_mut() {
            Some(generate) => generate(byte_count),
            None => Err(Error::upstream(UpstreamErrorKind::Network, "script exhausted")),
        }
    }
}

#[async_trait]
impl UpstreamSource for ScriptedSource {
    async fn fetch(&self, byte_count: usize) -> FetchResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.map_err(|_| {
                Error::upstream(UpstreamErrorKind::Network, "gate closed")
            })?;
        }
        self.next_result(byte_count)
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

pub(crate) fn network_failure() -> Error {
    Error::upstream(UpstreamErrorKind::Network, "connection reset")
}

/// Poll `condition` until it holds or `within` elapses
pub(crate) fn wait_for(within: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + within;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
