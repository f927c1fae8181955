//! FIFO counting semaphore bounding concurrent render operations.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::Error;
use crate::stats::AdmissionStats;

struct Waiter {
    ticket: u64,
    waker: Option<Waker>,
}

struct State {
    outstanding: usize,
    next_ticket: u64,
    total_granted: u64,
    queue: VecDeque<Waiter>,

    // tickets popped off the queue whose future has not picked up the permit yet
    granted: Vec<u64>,
}

struct Inner {
    limit: usize,
    state: Mutex<State>,
}

impl Inner {
    /// Hands one unit of capacity back: to the oldest waiter if there is one,
    /// otherwise to the free pool.
    fn release_one(&self) {
        let waker = {
            let mut state = self.state.lock();
            match state.queue.pop_front() {
                Some(waiter) => {
                    state.granted.push(waiter.ticket);
                    waiter.waker
                }
                None => {
                    debug_assert!(state.outstanding > 0);
                    state.outstanding -= 1;
                    None
                }
            }
        };

        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

/// Bounds the number of concurrently held [`Permit`]s.
///
/// Callers that find the controller saturated are queued and resumed strictly
/// in arrival order. Capacity freed by a release goes straight to the oldest
/// waiter, so a newcomer can never overtake somebody already queued.
#[derive(Clone)]
pub struct AdmissionController {
    inner: Arc<Inner>,
}

impl AdmissionController {
    pub fn new(max_concurrent: usize) -> Self {
        let limit = if max_concurrent == 0 {
            log::warn!("max_concurrent of 0 would never admit anything, using 1");
            1
        } else {
            max_concurrent
        };

        Self {
            inner: Arc::new(Inner {
                limit,
                state: Mutex::new(State {
                    outstanding: 0,
                    next_ticket: 0,
                    total_granted: 0,
                    queue: VecDeque::new(),
                    granted: Vec::new(),
                }),
            }),
        }
    }

    /// Waits for a permit. The caller joins the queue the first time the
    /// returned future is polled.
    pub fn acquire(&self) -> Acquire {
        Acquire {
            inner: self.inner.clone(),
            ticket: None,
        }
    }

    /// Like [`acquire`](Self::acquire) but gives up after `timeout`, leaving
    /// the queue as if the caller had never joined it.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<Permit, Error> {
        tokio::time::timeout(timeout, self.acquire())
            .await
            .map_err(|_| Error::Timeout(timeout))
    }

    /// Takes a permit only if one is free and nobody is waiting for it.
    pub fn try_acquire(&self) -> Option<Permit> {
        let mut state = self.inner.state.lock();
        if state.queue.is_empty()
            && state.granted.is_empty()
            && state.outstanding < self.inner.limit
        {
            state.outstanding += 1;
            state.total_granted += 1;
            drop(state);

            Some(Permit::new(self.inner.clone()))
        } else {
            None
        }
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.inner.limit
    }

    #[inline]
    pub fn outstanding(&self) -> usize {
        self.inner.state.lock().outstanding
    }

    #[inline]
    pub fn queued(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn stats(&self) -> AdmissionStats {
        let state = self.inner.state.lock();

        AdmissionStats {
            limit: self.inner.limit,
            outstanding: state.outstanding,
            queued: state.queue.len(),
            total_granted: state.total_granted,
        }
    }
}

impl fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionController")
            .field("stats", &self.stats())
            .finish()
    }
}

/// Future returned by [`AdmissionController::acquire`].
///
/// Dropping it while queued removes the waiter; dropping it after capacity was
/// handed to it but before it was polled passes that capacity on.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Acquire {
    inner: Arc<Inner>,
    ticket: Option<u64>,
}

impl Future for Acquire {
    type Output = Permit;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut state = this.inner.state.lock();

        let ticket = match this.ticket {
            Some(ticket) => ticket,
            None => {
                if state.queue.is_empty()
                    && state.granted.is_empty()
                    && state.outstanding < this.inner.limit
                {
                    state.outstanding += 1;
                    state.total_granted += 1;
                    drop(state);

                    return Poll::Ready(Permit::new(this.inner.clone()));
                }

                let ticket = state.next_ticket;
                state.next_ticket += 1;
                state.queue.push_back(Waiter {
                    ticket,
                    waker: Some(cx.waker().clone()),
                });

                this.ticket = Some(ticket);
                return Poll::Pending;
            }
        };

        if let Some(pos) = state.granted.iter().position(|t| *t == ticket) {
            state.granted.swap_remove(pos);
            state.total_granted += 1;
            drop(state);

            this.ticket = None;
            return Poll::Ready(Permit::new(this.inner.clone()));
        }

        if let Some(waiter) = state.queue.iter_mut().find(|w| w.ticket == ticket) {
            match &waiter.waker {
                Some(waker) if waker.will_wake(cx.waker()) => (),
                _ => waiter.waker = Some(cx.waker().clone()),
            }
        }

        Poll::Pending
    }
}

impl Drop for Acquire {
    fn drop(&mut self) {
        let ticket = match self.ticket.take() {
            Some(ticket) => ticket,
            None => return,
        };

        let mut state = self.inner.state.lock();
        if let Some(pos) = state.granted.iter().position(|t| *t == ticket) {
            state.granted.swap_remove(pos);
            drop(state);

            self.inner.release_one();
        } else if let Some(pos) = state.queue.iter().position(|w| w.ticket == ticket) {
            state.queue.remove(pos);
        }
    }
}

/// One unit of granted concurrency.
///
/// Released exactly once: by [`release`](Permit::release) or, failing that,
/// when dropped.
pub struct Permit {
    inner: Option<Arc<Inner>>,
}

impl Permit {
    fn new(inner: Arc<Inner>) -> Self {
        Self { inner: Some(inner) }
    }

    /// Gives the permit back. Calling it again is a no-op.
    pub fn release(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.release_one();
        }
    }

    #[inline]
    pub fn is_released(&self) -> bool {
        self.inner.is_none()
    }

    pub fn belongs_to(&self, controller: &AdmissionController) -> bool {
        self.inner
            .as_ref()
            .map_or(false, |inner| Arc::ptr_eq(inner, &controller.inner))
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Permit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Permit")
            .field("released", &self.is_released())
            .finish()
    }
}
