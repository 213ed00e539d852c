//! A single swappable resource shared by concurrent users.
//!
//! `Coldswap` holds zero or one live instance of a resource built by a
//! [`ResourceFactory`]. Users borrow the live instance through [`Coldswap::opened`]
//! and may do so concurrently. [`Coldswap::swap`] retires the current instance
//! and installs a fresh one; it waits for every outstanding borrow to be dropped
//! first and holds new borrowers back until the replacement is ready, so a user
//! only ever sees a fully constructed instance that is not being released.
//!
//! The slot is a fair `tokio::sync::RwLock`: borrowers are readers, swaps and
//! the first open are writers. A queued writer blocks later readers, which is
//! what makes users wait while a swap is in progress.

use async_trait::async_trait;
use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::sync::{Mutex, RwLock, RwLockReadGuard};
use tracing::{debug, info};

/// Builds and releases the instances a [`Coldswap`] manages.
#[async_trait]
pub trait ResourceFactory: Send + Sync {
    type Resource: Send + Sync + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    async fn open(&self) -> Result<Self::Resource, Self::Error>;

    /// Releases an instance. Called exactly once for every opened instance
    /// that gets retired; failures must be handled (logged) by the factory.
    async fn release(&self, resource: Self::Resource);
}

#[async_trait]
impl<T> ResourceFactory for Arc<T>
where
    T: ResourceFactory + ?Sized,
{
    type Resource = T::Resource;
    type Error = T::Error;

    async fn open(&self) -> Result<Self::Resource, Self::Error> {
        (**self).open().await
    }

    async fn release(&self, resource: Self::Resource) {
        (**self).release(resource).await
    }
}

/// Observable state of the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    Live,
    /// A writer holds or waits for the slot: a swap, the first open or a close.
    Swapping,
}

/// Borrow of the live instance. The instance cannot be retired while it exists.
pub type Opened<'a, R> = RwLockReadGuard<'a, R>;

pub struct Coldswap<F: ResourceFactory> {
    factory: F,
    slot: RwLock<Option<F::Resource>>,
    swap_lock: Mutex<()>,
    opened_count: AtomicU64,
}

impl<F: ResourceFactory> Coldswap<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            slot: RwLock::new(None),
            swap_lock: Mutex::new(()),
            opened_count: AtomicU64::new(0),
        }
    }

    /// Borrows the live instance, opening one first if the slot is empty and
    /// waiting for an in-flight swap to finish.
    ///
    /// The returned guard must be dropped before calling [`Coldswap::swap`] from
    /// the same task, otherwise the swap waits on itself.
    pub fn opened(
        &self,
    ) -> impl Future<Output = Result<Opened<'_, F::Resource>, F::Error>> + Send + '_ {
        async move {
            loop {
                let guard = self.slot.read().await;
                if let Ok(opened) = RwLockReadGuard::try_map(guard, |slot| slot.as_ref()) {
                    return Ok(opened);
                }

                let mut slot = self.slot.write().await;
                if slot.is_none() {
                    *slot = Some(self.open_fresh().await?);
                }

                if let Ok(opened) = RwLockReadGuard::try_map(slot.downgrade(), |slot| slot.as_ref())
                {
                    return Ok(opened);
                }
            }
        }
    }

    /// Retires the current instance (if any) and installs a freshly opened one.
    ///
    /// Swaps are serialized and never merged: a call made while another swap
    /// is running waits for it and then performs its own. If opening the new
    /// instance fails the slot is left empty and the error is returned.
    pub fn swap(&self) -> impl Future<Output = Result<(), F::Error>> + Send + '_ {
        async move {
            let _serial = self.swap_lock.lock().await;
            let mut slot = self.slot.write().await;

            if let Some(previous) = slot.take() {
                debug!("Releasing retired resource");
                self.factory.release(previous).await;
            }

            *slot = Some(self.open_fresh().await?);
            info!(
                generation = self.opened_count.load(Ordering::Relaxed),
                "Resource swapped"
            );
            Ok(())
        }
    }

    /// Releases the live instance once every borrower is done with it.
    pub fn close(&self) -> impl Future<Output = ()> + Send + '_ {
        async move {
            let _serial = self.swap_lock.lock().await;
            let mut slot = self.slot.write().await;
            if let Some(previous) = slot.take() {
                self.factory.release(previous).await;
                info!("Resource released");
            }
        }
    }

    pub fn state(&self) -> SlotState {
        match self.slot.try_read() {
            Ok(slot) if slot.is_some() => SlotState::Live,
            Ok(_) => SlotState::Empty,
            Err(_) => SlotState::Swapping,
        }
    }

    /// Number of instances opened so far.
    pub fn opened_count(&self) -> u64 {
        self.opened_count.load(Ordering::Relaxed)
    }

    fn open_fresh(&self) -> impl Future<Output = Result<F::Resource, F::Error>> + Send + '_ {
        async move {
            let resource = self.factory.open().await?;
            self.opened_count.fetch_add(1, Ordering::Relaxed);
            Ok(resource)
        }
    }
}
