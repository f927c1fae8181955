//! Owner of the one shared handle to the external rendering process.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;

use crate::error::{BoxError, Error};
use crate::stats::PoolStats;

/// Knows how to start and stop the external process behind a handle.
#[async_trait]
pub trait HandleFactory: Send + Sync + 'static {
    type Handle: Send + Sync + 'static;

    async fn create(&self) -> Result<Self::Handle, BoxError>;

    /// Terminates the process. Other holders of the `Arc` may still be using
    /// it; they will see their operations fail.
    async fn close(&self, handle: Arc<Self::Handle>) -> Result<(), BoxError>;

    /// Cheap synchronous liveness check done before a cached handle is
    /// handed out. Not a health probe.
    fn is_alive(&self, _handle: &Self::Handle) -> bool {
        true
    }
}

type Creation<H> = Shared<BoxFuture<'static, Result<Arc<H>, Error>>>;

enum Slot<H> {
    Empty,
    Creating { generation: u64, creation: Creation<H> },
    Ready { generation: u64, handle: Arc<H> },
    Closed,
}

struct PoolState<H> {
    slot: Slot<H>,
    generation: u64,
}

/// Lazily creates a single shared handle and recreates it once it has been
/// reported dead.
///
/// Concurrent [`get_handle`](ResourcePool::get_handle) calls made while a
/// creation is running all wait on that same creation; a second process is
/// never spawned because of a race.
pub struct ResourcePool<F: HandleFactory> {
    factory: Arc<F>,
    state: Mutex<PoolState<F::Handle>>,
    creations: AtomicU64,
}

impl<F: HandleFactory> ResourcePool<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory: Arc::new(factory),
            state: Mutex::new(PoolState {
                slot: Slot::Empty,
                generation: 0,
            }),
            creations: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub async fn get_handle(&self) -> Result<Arc<F::Handle>, Error> {
        loop {
            let (generation, creation, stale) = {
                let mut state = self.state.lock();
                let mut stale = None;

                let joined = match &state.slot {
                    Slot::Closed => return Err(Error::Closed),
                    Slot::Ready { handle, .. } if self.factory.is_alive(handle) => {
                        return Ok(handle.clone());
                    }
                    Slot::Ready { handle, generation } => {
                        log::warn!("handle #{} is no longer alive, recreating", generation);
                        stale = Some(handle.clone());
                        None
                    }
                    Slot::Creating {
                        generation,
                        creation,
                    } => Some((*generation, creation.clone())),
                    Slot::Empty => None,
                };

                let (generation, creation) = match joined {
                    Some(joined) => joined,
                    None => self.begin_creation(&mut state),
                };

                (generation, creation, stale)
            };

            if let Some(stale) = stale {
                self.close_in_background(stale);
            }

            let result = creation.await;

            let settled = {
                let mut state = self.state.lock();
                let settling = matches!(
                    &state.slot,
                    Slot::Creating { generation: current, .. } if *current == generation
                );

                if settling {
                    state.slot = match &result {
                        Ok(handle) => {
                            log::info!("handle #{} ready", generation);
                            Slot::Ready {
                                generation,
                                handle: handle.clone(),
                            }
                        }
                        Err(err) => {
                            log::warn!("handle #{} creation failed: {}", generation, err);
                            Slot::Empty
                        }
                    };

                    true
                } else if matches!(state.slot, Slot::Closed) {
                    // shutdown took over this creation and closes whatever it yields
                    return Err(Error::Closed);
                } else {
                    // a joined caller settled it first; the handle only counts
                    // if nobody has invalidated it since
                    result.is_err()
                        || matches!(
                            &state.slot,
                            Slot::Ready { generation: current, .. } if *current == generation
                        )
                }
            };

            if settled {
                return result;
            }

            log::debug!("handle #{} was invalidated while waiting, retrying", generation);
        }
    }

    /// Forgets the current handle so the next [`get_handle`](Self::get_handle)
    /// creates a fresh one. The old handle is closed in the background.
    ///
    /// Does nothing while a creation is in flight: no caller can have seen
    /// that handle yet.
    pub fn invalidate(&self) {
        let stale = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut state.slot, Slot::Empty) {
                Slot::Ready { generation, handle } => {
                    log::info!("handle #{} invalidated", generation);
                    Some(handle)
                }
                other => {
                    state.slot = other;
                    None
                }
            }
        };

        if let Some(stale) = stale {
            self.close_in_background(stale);
        }
    }

    /// Invalidates only if `handle` is still the current one. Returns whether
    /// it was. A late report about an already replaced handle is ignored.
    pub fn invalidate_handle(&self, handle: &Arc<F::Handle>) -> bool {
        let stale = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut state.slot, Slot::Empty) {
                Slot::Ready {
                    generation,
                    handle: current,
                } if Arc::ptr_eq(&current, handle) => {
                    log::info!("handle #{} invalidated", generation);
                    Some(current)
                }
                other => {
                    state.slot = other;
                    None
                }
            }
        };

        match stale {
            Some(stale) => {
                self.close_in_background(stale);
                true
            }
            None => false,
        }
    }

    /// Closes the handle, if any, and refuses further [`get_handle`](Self::get_handle)
    /// calls with [`Error::Closed`]. Safe to call more than once.
    ///
    /// Outstanding permits are not revoked; holders just see their work fail.
    pub async fn shutdown(&self) -> Result<(), Error> {
        let previous = std::mem::replace(&mut self.state.lock().slot, Slot::Closed);

        match previous {
            Slot::Ready { generation, handle } => {
                log::info!("shutting down handle #{}", generation);
                self.close_handle(handle).await
            }

            Slot::Creating {
                generation,
                creation,
            } => {
                log::info!("shutting down while handle #{} is being created", generation);
                let factory = self.factory.clone();
                spawn_close(async move {
                    if let Ok(handle) = creation.await {
                        if let Err(err) = factory.close(handle).await {
                            log::warn!("failed to close handle #{}: {}", generation, err);
                        }
                    }
                });

                Ok(())
            }

            Slot::Empty | Slot::Closed => Ok(()),
        }
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        matches!(self.state.lock().slot, Slot::Ready { .. })
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        matches!(self.state.lock().slot, Slot::Closed)
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Number of creation attempts started so far.
    #[inline]
    pub fn creations(&self) -> u64 {
        self.creations.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();

        PoolStats {
            generation: state.generation,
            creations: self.creations(),
            ready: matches!(state.slot, Slot::Ready { .. }),
            creating: matches!(state.slot, Slot::Creating { .. }),
            closed: matches!(state.slot, Slot::Closed),
        }
    }

    fn begin_creation(&self, state: &mut PoolState<F::Handle>) -> (u64, Creation<F::Handle>) {
        state.generation += 1;
        let generation = state.generation;
        self.creations.fetch_add(1, Ordering::SeqCst);

        log::info!("creating handle #{}", generation);

        let factory = self.factory.clone();
        let creation = async move {
            factory
                .create()
                .await
                .map(Arc::new)
                .map_err(Error::unavailable)
        }
        .boxed()
        .shared();

        state.slot = Slot::Creating {
            generation,
            creation: creation.clone(),
        };

        (generation, creation)
    }

    async fn close_handle(&self, handle: Arc<F::Handle>) -> Result<(), Error> {
        self.factory.close(handle).await.map_err(|err| {
            log::warn!("failed to close handle: {}", err);
            Error::CloseFailed(err.to_string())
        })
    }

    fn close_in_background(&self, handle: Arc<F::Handle>) {
        let factory = self.factory.clone();
        spawn_close(async move {
            if let Err(err) = factory.close(handle).await {
                log::warn!("failed to close discarded handle: {}", err);
            }
        });
    }
}

fn spawn_close<Fut>(fut: Fut)
where
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(fut);
        }
        Err(_) => log::warn!("no tokio runtime, discarded handle is dropped without closing"),
    }
}

impl<F: HandleFactory> fmt::Debug for ResourcePool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePool")
            .field("stats", &self.stats())
            .finish()
    }
}
