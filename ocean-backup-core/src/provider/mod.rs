/*!
Provider clients for snapshot operations.

This module defines the provider abstraction (port) and the concrete
DigitalOcean adapter. The retention policy and the backup runner only ever talk
to [`SnapshotProvider`], so they can be exercised against an in-memory provider
in tests.
*/

#[cfg(feature = "digitalocean")]
pub mod digitalocean;

use crate::{Resource, Result, Snapshot};
use async_trait::async_trait;

#[cfg(feature = "async-rt")]
use once_cell::sync::Lazy;
#[cfg(feature = "async-rt")]
use tokio::runtime::Runtime;

#[cfg(feature = "async-rt")]
static GLOBAL_RT: Lazy<Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to create provider runtime")
});

/// Blocking snapshot operations against a cloud provider
///
/// Every call is synchronous and is made once; callers decide how failures
/// are reported.
#[cfg_attr(test, mockall::automock)]
pub trait SnapshotProvider {
    /// Request a new snapshot of `resource` named `name`
    fn create_snapshot(&self, resource: &Resource, name: &str) -> Result<()>;

    /// List every snapshot of `resource`, in provider order
    fn list_snapshots(&self, resource: &Resource) -> Result<Vec<Snapshot>>;

    /// Delete a snapshot by provider identifier
    fn delete_snapshot(&self, snapshot_id: &str) -> Result<()>;

    /// Copy a snapshot to `region`
    fn transfer_snapshot(&self, snapshot_id: &str, region: &str) -> Result<()>;
}

impl<P: SnapshotProvider + ?Sized> SnapshotProvider for &P {
    fn create_snapshot(&self, resource: &Resource, name: &str) -> Result<()> {
        (**self).create_snapshot(resource, name)
    }

    fn list_snapshots(&self, resource: &Resource) -> Result<Vec<Snapshot>> {
        (**self).list_snapshots(resource)
    }

    fn delete_snapshot(&self, snapshot_id: &str) -> Result<()> {
        (**self).delete_snapshot(snapshot_id)
    }

    fn transfer_snapshot(&self, snapshot_id: &str, region: &str) -> Result<()> {
        (**self).transfer_snapshot(snapshot_id, region)
    }
}

/// Async counterpart of [`SnapshotProvider`] implemented by HTTP clients
#[async_trait]
pub trait AsyncSnapshotProvider: Send + Sync {
    async fn create_snapshot(&self, resource: &Resource, name: &str) -> Result<()>;

    async fn list_snapshots(&self, resource: &Resource) -> Result<Vec<Snapshot>>;

    async fn delete_snapshot(&self, snapshot_id: &str) -> Result<()>;

    async fn transfer_snapshot(&self, snapshot_id: &str, region: &str) -> Result<()>;
}

/// Blocking wrapper for async providers
///
/// Drives each call to completion on a shared single-threaded runtime, so the
/// backup pass stays strictly sequential.
#[cfg(feature = "async-rt")]
pub struct BlockingProvider<A: AsyncSnapshotProvider> {
    inner: A,
}

#[cfg(feature = "async-rt")]
impl<A: AsyncSnapshotProvider> BlockingProvider<A> {
    pub fn new(provider: A) -> Self {
        Self { inner: provider }
    }
}

#[cfg(feature = "async-rt")]
impl<A: AsyncSnapshotProvider> SnapshotProvider for BlockingProvider<A> {
    fn create_snapshot(&self, resource: &Resource, name: &str) -> Result<()> {
        GLOBAL_RT.block_on(self.inner.create_snapshot(resource, name))
    }

    fn list_snapshots(&self, resource: &Resource) -> Result<Vec<Snapshot>> {
        GLOBAL_RT.block_on(self.inner.list_snapshots(resource))
    }

    fn delete_snapshot(&self, snapshot_id: &str) -> Result<()> {
        GLOBAL_RT.block_on(self.inner.delete_snapshot(snapshot_id))
    }

    fn transfer_snapshot(&self, snapshot_id: &str, region: &str) -> Result<()> {
        GLOBAL_RT.block_on(self.inner.transfer_snapshot(snapshot_id, region))
    }
}

// Re-export types for convenience
#[cfg(feature = "digitalocean")]
pub use digitalocean::{create_digitalocean_provider, DigitalOceanClient, DigitalOceanProvider};

/// Memory-based provider for testing
///
/// Holds snapshots per resource, applies deletes and transfers to that state,
/// and records every call. Individual operations can be made to fail.
#[cfg(test)]
pub struct MemoryProvider {
    state: std::sync::Mutex<MemoryState>,
}

#[cfg(test)]
#[derive(Default)]
struct MemoryState {
    snapshots: std::collections::HashMap<Resource, Vec<Snapshot>>,
    failing_creates: std::collections::HashSet<Resource>,
    failing_lists: std::collections::HashSet<Resource>,
    failing_snapshots: std::collections::HashSet<String>,
    calls: Vec<String>,
}

#[cfg(test)]
impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl MemoryProvider {
    pub fn new() -> Self {
        Self {
            state: std::sync::Mutex::new(MemoryState::default()),
        }
    }

    pub fn with_snapshots(self, resource: &Resource, snapshots: Vec<Snapshot>) -> Self {
        self.state
            .lock()
            .unwrap()
            .snapshots
            .insert(resource.clone(), snapshots);
        self
    }

    pub fn fail_create(self, resource: &Resource) -> Self {
        self.state.lock().unwrap().failing_creates.insert(resource.clone());
        self
    }

    pub fn fail_list(self, resource: &Resource) -> Self {
        self.state.lock().unwrap().failing_lists.insert(resource.clone());
        self
    }

    /// Make delete and transfer fail for one snapshot
    pub fn fail_snapshot(self, snapshot_id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_snapshots
            .insert(snapshot_id.to_string());
        self
    }

    pub fn snapshots(&self, resource: &Resource) -> Vec<Snapshot> {
        let state = self.state.lock().unwrap();
        state.snapshots.get(resource).cloned().unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }
}

#[cfg(test)]
impl SnapshotProvider for MemoryProvider {
    fn create_snapshot(&self, resource: &Resource, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("create {} {name}", resource.id));
        if state.failing_creates.contains(resource) {
            return Err(crate::BackupError::api(422, "Droplet already has a pending event."));
        }
        let entry = state.snapshots.entry(resource.clone()).or_default();
        let id = format!("{}-{}", resource.id, entry.len() + 1);
        entry.push(Snapshot::new(id, name, chrono::Utc::now()).with_regions(["nyc3"]));
        Ok(())
    }

    fn list_snapshots(&self, resource: &Resource) -> Result<Vec<Snapshot>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("list {}", resource.id));
        if state.failing_lists.contains(resource) {
            return Err(crate::BackupError::http("connection reset by peer"));
        }
        Ok(state.snapshots.get(resource).cloned().unwrap_or_default())
    }

    fn delete_snapshot(&self, snapshot_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("delete {snapshot_id}"));
        if state.failing_snapshots.contains(snapshot_id) {
            return Err(crate::BackupError::api(500, "Server Error"));
        }
        for snapshots in state.snapshots.values_mut() {
            snapshots.retain(|s| s.id != snapshot_id);
        }
        Ok(())
    }

    fn transfer_snapshot(&self, snapshot_id: &str, region: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("transfer {snapshot_id} {region}"));
        if state.failing_snapshots.contains(snapshot_id) {
            return Err(crate::BackupError::api(422, "Image is already being transferred"));
        }
        for snapshot in state.snapshots.values_mut().flatten() {
            if snapshot.id == snapshot_id && !snapshot.is_in_region(region) {
                snapshot.regions.push(region.to_string());
            }
        }
        Ok(())
    }
}
