// SPDX-License-Identifier: MIT
//
// QRNG Supply: Buffered Quantum Randomness for Impatient Consumers

//! Bounded entropy buffer with FIFO semantics and timed, blocking takes
//!
//! This module implements the synchronization point between the single refill
//! producer and any number of consumer threads.

use crate::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Thread-safe queue of random bytes
///
/// # Design
///
/// - `parking_lot::Mutex` guards the queue, a `Condvar` parks waiting consumers
/// - Producers never block: bytes beyond capacity are dropped, newest first
/// - Consumers block up to an explicit timeout
/// - Closing the buffer wakes every waiter with [`Error::InterruptedWait`]
#[derive(Clone)]
pub struct EntropyBuffer {
    inner: Arc<Shared>,
}

struct Shared {
    state: Mutex<BufferState>,
    available: Condvar,
}

struct BufferState {
    bytes: VecDeque<u8>,
    capacity: usize,
    closed: bool,
}

impl EntropyBuffer {
    /// Create a new buffer with specified capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Shared {
                state: Mutex::new(BufferState {
                    bytes: VecDeque::with_capacity(capacity.min(crate::MAX_FETCH_SIZE)),
                    capacity,
                    closed: false,
                }),
                available: Condvar::new(),
            }),
        }
    }

    /// Append bytes in order and wake waiting consumers.
    ///
    /// Bytes that would exceed capacity are dropped. Returns the number of bytes
    /// actually stored; a closed buffer stores nothing.
    pub fn put_all(&self, data: &[u8]) -> usize {
        if data.is_empty() {
            return 0;
        }

        let mut state = self.inner.state.lock();
        if state.closed {
            return 0;
        }

        let room = state.capacity - state.bytes.len();
        let accepted = data.len().min(room);
        state.bytes.extend(&data[..accepted]);
        drop(state);

        if accepted > 0 {
            self.inner.available.notify_all();
        }
        accepted
    }

    /// Remove and return the oldest byte, waiting up to `timeout` for one to arrive.
    pub fn take(&self, timeout: Duration) -> Result<u8> {
        let [byte] = self.take_exact::<1>(timeout)?;
        Ok(byte)
    }

    /// Remove the `N` oldest bytes in one step, waiting up to `timeout` until `N` are present.
    ///
    /// Either all `N` bytes are taken or none are, so concurrent consumers never
    /// observe a partially consumed group. A timeout too large to express as an
    /// instant waits until bytes arrive or the buffer is closed.
    pub fn take_exact<const N: usize>(&self, timeout: Duration) -> Result<[u8; N]> {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.inner.state.lock();
        let mut timed_out = false;

        loop {
            if state.closed {
                return Err(Error::InterruptedWait);
            }
            if state.bytes.len() >= N {
                let mut out = [0u8; N];
                for (slot, byte) in out.iter_mut().zip(state.bytes.drain(..N)) {
                    *slot = byte;
                }
                return Ok(out);
            }
            if timed_out {
                return Err(Error::Timeout);
            }
            match deadline {
                Some(deadline) => {
                    timed_out = self
                        .inner
                        .available
                        .wait_until(&mut state, deadline)
                        .timed_out();
                }
                None => self.inner.available.wait(&mut state),
            }
        }
    }

    /// Get current number of buffered bytes.
    ///
    /// Only a scheduling hint: the value may be stale by the time it is used.
    pub fn len(&self) -> usize {
        self.inner.state.lock().bytes.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get buffer capacity (bytes)
    pub fn capacity(&self) -> usize {
        self.inner.state.lock().capacity
    }

    /// Close the buffer, waking every waiting consumer
    pub fn close(&self) {
        self.inner.state.lock().closed = true;
        self.inner.available.notify_all();
    }

}
