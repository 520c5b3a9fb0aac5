//! Snapshot repository inspection and pruning.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use esprit_core::Connection;
use serde_json::Value;

use crate::dao::Clock;
use crate::transport::{Request, Transport};
use crate::{Client, Result};

/// Snapshot listing and deletion can be slow on object-store backed repos.
const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Error creating snapshot object: {0}")]
    BadMeta(String),

    #[error("Snapshot appears to be missing for {0}")]
    TodayMissing(NaiveDate),

    #[error("Snapshot for {0} has failed")]
    Failed(NaiveDate),

    #[error("Not all snapshots were deleted successfully ({failed} failed)")]
    DeleteFailed { failed: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub name: String,
    pub state: String,
    pub datetime: DateTime<Utc>,
    pub data: Value,
}

impl Snapshot {
    pub fn from_json(data: Value) -> std::result::Result<Self, SnapshotError> {
        let name = data
            .get("snapshot")
            .and_then(Value::as_str)
            .ok_or_else(|| SnapshotError::BadMeta("missing 'snapshot'".into()))?
            .to_string();
        let state = data
            .get("state")
            .and_then(Value::as_str)
            .ok_or_else(|| SnapshotError::BadMeta(format!("{}: missing 'state'", name)))?
            .to_string();
        let millis = data
            .get("start_time_in_millis")
            .and_then(Value::as_i64)
            .ok_or_else(|| SnapshotError::BadMeta(format!("{}: missing 'start_time_in_millis'", name)))?;
        let datetime = Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| SnapshotError::BadMeta(format!("{}: bad start time {}", name, millis)))?;
        Ok(Self {
            name,
            state,
            datetime,
            data,
        })
    }
}

/// Client for one snapshot repository.
pub struct SnapshotClient {
    client: Client,
    url: String,
    snapshots: Vec<Snapshot>,
}

impl SnapshotClient {
    /// Takes the connection by value: it is repointed at `_snapshot`.
    pub fn new(mut conn: Connection, transport: Arc<dyn Transport>, repository: &str) -> Self {
        conn.repoint_index("_snapshot");
        let conn = conn.with_index_per_type(false);
        let url = conn.url().doc_type(repository).build();
        Self {
            client: Client::with_transport(conn, transport),
            url,
            snapshots: Vec::new(),
        }
    }

    pub fn from_client(client: &Client, repository: &str) -> Self {
        let mut snapshots = Self::new(client.connection().clone(), client.transport(), repository);
        snapshots.client = snapshots.client.with_clock(client.clock.clone());
        snapshots
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.client = self.client.with_clock(clock);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// All snapshots in the repository, oldest first. Cached after the first
    /// successful call.
    pub async fn list_snapshots(&mut self) -> Result<&[Snapshot]> {
        if self.snapshots.is_empty() {
            let request = Request::get(format!("{}/_all", self.url)).with_timeout(SNAPSHOT_TIMEOUT);
            let value = self.client.send(request).await?.value()?;
            if let Some(list) = value.get("snapshots").and_then(Value::as_array) {
                let mut snapshots = list
                    .iter()
                    .cloned()
                    .map(Snapshot::from_json)
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                snapshots.sort_by_key(|s| s.datetime);
                self.snapshots = snapshots;
            }
        }
        Ok(&self.snapshots)
    }

    /// Fail unless the newest snapshot is from today and succeeded.
    pub async fn check_today_snapshot(&mut self) -> Result<()> {
        let today = self.client.clock.now().date_naive();
        let latest = self.list_snapshots().await?.last();
        match latest {
            Some(s) if s.datetime.date_naive() != today => Err(SnapshotError::TodayMissing(today).into()),
            None => Err(SnapshotError::TodayMissing(today).into()),
            Some(s) if s.state != "SUCCESS" => Err(SnapshotError::Failed(today).into()),
            Some(_) => Ok(()),
        }
    }

    /// `true` when the server accepted the delete.
    pub async fn delete_snapshot(&self, snapshot: &Snapshot) -> Result<bool> {
        let request = Request::delete(format!("{}/{}", self.url, snapshot.name))
            .with_timeout(SNAPSHOT_TIMEOUT);
        Ok(self.client.send(request).await?.is_success())
    }

    /// Delete every snapshot older than `ttl_days`.
    ///
    /// `on_delete` sees each attempted snapshot and whether its delete
    /// succeeded. The cached listing is dropped afterwards.
    #[tracing::instrument(skip(self, on_delete))]
    pub async fn prune_snapshots(
        &mut self,
        ttl_days: i64,
        mut on_delete: Option<&mut dyn FnMut(&Snapshot, bool)>,
    ) -> Result<()> {
        let cutoff = self.client.clock.now() - chrono::Duration::days(ttl_days);
        let expired: Vec<Snapshot> = self
            .list_snapshots()
            .await?
            .iter()
            .filter(|s| s.datetime < cutoff)
            .cloned()
            .collect();

        let mut results = Vec::with_capacity(expired.len());
        for snapshot in &expired {
            let ok = self.delete_snapshot(snapshot).await?;
            if let Some(callback) = on_delete.as_deref_mut() {
                callback(snapshot, ok);
            }
            results.push(ok);
        }
        self.snapshots.clear();

        tracing::info!(?results, "snapshots prune results");
        let failed = results.iter().filter(|ok| !**ok).count();
        if failed > 0 {
            return Err(SnapshotError::DeleteFailed { failed }.into());
        }
        Ok(())
    }
}
