//! An in-memory file store.
//!
//! This store is useful for testing in isolation from Google Drive. It records every upload, can
//! be made to fail for particular file names, and tracks how many uploads run concurrently.

use super::Drive;
use anyhow::Error;
use async_std::{
    sync::{Arc, Mutex},
    task::sleep,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// An image stored in a [`MemoryDrive`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Upload {
    pub name: String,
    pub png: Vec<u8>,
}

/// An in-memory file store.
///
/// Clones share the same storage.
#[derive(Clone, Debug, Default)]
pub struct MemoryDrive {
    uploads: Arc<Mutex<Vec<Upload>>>,
    fail: Arc<HashSet<String>>,
    delay: Duration,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MemoryDrive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every upload of a file called `name`.
    pub fn fail_on(mut self, name: impl Into<String>) -> Self {
        let mut fail = (*self.fail).clone();
        fail.insert(name.into());
        self.fail = Arc::new(fail);
        self
    }

    /// Make every upload take at least `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// All successful uploads, in order of completion.
    pub async fn uploads(&self) -> Vec<Upload> {
        self.uploads.lock().await.clone()
    }

    /// The largest number of uploads which were ever in progress at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Drive for MemoryDrive {
    async fn upload(&self, name: &str, png: Vec<u8>) -> Result<String, Error> {
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail.contains(name) {
            return Err(Error::msg(format!("injected failure uploading {name}")));
        }
        self.uploads.lock().await.push(Upload {
            name: name.into(),
            png,
        });
        Ok(format!("memory://drive/{name}"))
    }
}
