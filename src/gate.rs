use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::admission::{AdmissionController, Permit};
use crate::config::Config;
use crate::error::Error;
use crate::pool::{HandleFactory, ResourcePool};
use crate::render::{check_document, DocumentRenderer};

/// Admission controller and handle pool composed into the per-request flow:
/// permit, then handle, then work, then release no matter what.
pub struct Gate<F: HandleFactory> {
    admission: AdmissionController,
    pool: ResourcePool<F>,
    acquire_timeout: Option<Duration>,
}

impl<F: HandleFactory> Gate<F> {
    pub fn new(factory: F, max_concurrent: usize) -> Self {
        Self {
            admission: AdmissionController::new(max_concurrent),
            pool: ResourcePool::new(factory),
            acquire_timeout: None,
        }
    }

    pub fn from_config(factory: F, config: &Config) -> Self {
        Self::new(factory, config.max_concurrent).with_acquire_timeout(config.acquire_timeout())
    }

    pub fn with_acquire_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    #[inline]
    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    #[inline]
    pub fn pool(&self) -> &ResourcePool<F> {
        &self.pool
    }

    async fn permit(&self) -> Result<Permit, Error> {
        match self.acquire_timeout {
            Some(timeout) => self.admission.acquire_timeout(timeout).await,
            None => Ok(self.admission.acquire().await),
        }
    }

    /// Runs `work` against the shared handle while holding a permit.
    ///
    /// If `work` fails with an error that marks the handle dead, that handle
    /// is invalidated before the error is returned.
    pub async fn run<T, W, Fut>(&self, work: W) -> Result<T, Error>
    where
        W: FnOnce(Arc<F::Handle>) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut permit = self.permit().await?;

        let result = async {
            let handle = self.pool.get_handle().await?;
            let result = work(handle.clone()).await;

            if let Err(err) = &result {
                if err.is_handle_dead() && self.pool.invalidate_handle(&handle) {
                    log::warn!("handle reported dead, it will be recreated: {}", err);
                }
            }

            result
        }
        .await;

        permit.release();
        result
    }

    /// Renders `html` to a document, rejecting undersized output.
    pub async fn render<R>(&self, renderer: &R, html: &str) -> Result<Vec<u8>, Error>
    where
        R: DocumentRenderer<F::Handle>,
    {
        self.run(|handle| async move {
            let bytes = renderer.render(&handle, html).await?;
            Ok(check_document(bytes)?)
        })
        .await
    }

    /// Shuts the pool down. Permits still held are left to their owners.
    pub async fn shutdown(&self) -> Result<(), Error> {
        self.pool.shutdown().await
    }
}
