//! Document lifecycle: stamping, saving, visibility polling and deletes.
//!
//! A blocking save only waits until a search by identity observes the
//! `last_updated` value just written. It takes no lock. Two writers saving
//! the same identity at once can each observe the other's stamp, and
//! whichever polls last wins; callers that need stronger guarantees must
//! serialise their writes themselves.

use std::time::Duration;

use chrono::{DateTime, Utc};
use esprit_core::envelope::{unpack_get, unpack_hits};
use esprit_core::models::{format_timestamp, CREATED_FIELD, ID_FIELD, UPDATED_FIELD};
use esprit_core::query::{build_query, QueryParams};
use esprit_core::config::SaveConfig;
use esprit_core::{Dao, Record};
use futures::{Stream, TryStreamExt};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::client::SearchMethod;
use crate::paging::PageOptions;
use crate::scroll::ScrollOptions;
use crate::{Client, ClientError, Result};

/// Gap between visibility checks during a blocking save.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Resolution of stored timestamps.
const TIMESTAMP_RESOLUTION: Duration = Duration::from_secs(1);

/// Source of the current time for timestamp stamping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone)]
pub struct SaveOptions {
    /// Assign a fresh identity when the record has none.
    pub makeid: bool,
    /// Stamp `created_date` when absent.
    pub created: bool,
    /// Stamp `last_updated` on every save.
    pub updated: bool,
    /// Wait until the write is visible to search.
    pub blocking: bool,
    /// Upper bound on the blocking wait; `None` waits indefinitely.
    pub max_wait: Option<Duration>,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            makeid: true,
            created: true,
            updated: true,
            blocking: false,
            max_wait: None,
        }
    }
}

impl SaveOptions {
    pub fn blocking(mut self, max_wait: Option<Duration>) -> Self {
        self.blocking = true;
        self.max_wait = max_wait;
        self
    }

    /// Blocking save bounded by the configured `max_wait_secs`.
    pub fn from_config(config: &SaveConfig) -> Self {
        Self::default().blocking(config.max_wait())
    }
}

/// Where a record to be deleted lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteStrategy {
    /// The type is known; delete there without looking.
    Direct(String),
    /// The record may live in any of these types. Each is probed with a
    /// GET first, and the delete is issued only where the record exists.
    ProbeCandidates(Vec<String>),
}

impl DeleteStrategy {
    pub fn for_types<S: AsRef<str>>(types: &[S]) -> Self {
        match types {
            [only] => Self::Direct(only.as_ref().to_string()),
            _ => Self::ProbeCandidates(types.iter().map(|t| t.as_ref().to_string()).collect()),
        }
    }
}

/// One entry of an action queue, as accepted by [`Client::actions`].
///
/// `index` names the type the action is applied to.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Store {
        index: Option<String>,
        id: Option<String>,
        record: Option<Record>,
    },
    Remove {
        index: Option<String>,
        id: Option<String>,
        query: Option<Value>,
    },
}

/// A typed view over a [`Dao`] bound to a default type.
///
/// Override the `dynamic_*` hooks when the types to read or write depend on
/// runtime state.
pub trait DomainObject: Sized {
    const TYPE: &'static str;

    fn dao(&self) -> &Dao;
    fn dao_mut(&mut self) -> &mut Dao;
    fn from_dao(dao: Dao) -> Self;

    fn dynamic_read_types() -> Option<Vec<String>> {
        None
    }

    fn dynamic_write_type() -> Option<String> {
        None
    }

    fn read_types() -> Vec<String> {
        Self::dynamic_read_types().unwrap_or_else(|| vec![Self::TYPE.to_string()])
    }

    fn write_type() -> String {
        Self::dynamic_write_type().unwrap_or_else(|| Self::TYPE.to_string())
    }
}

impl Client {
    /// Stamp and store a record, optionally waiting until search sees it.
    ///
    /// When `max_wait` runs out the call returns normally; visibility is best
    /// effort.
    #[tracing::instrument(skip(self, dao, options))]
    pub async fn save(&self, dao: &mut Dao, doc_type: &str, options: SaveOptions) -> Result<()> {
        if options.blocking && !options.updated {
            return Err(ClientError::InvalidSaveOptions(
                "blocking save needs last_updated stamping".to_string(),
            ));
        }

        let mut now = format_timestamp(self.clock.now());
        if options.blocking && dao.last_updated() == Some(now.as_str()) {
            // same second as the previous save; the poll could not tell them apart
            tokio::time::sleep(TIMESTAMP_RESOLUTION).await;
            now = format_timestamp(self.clock.now());
        }

        if options.makeid && !dao.has(ID_FIELD) {
            dao.set_id(Dao::makeid());
        }
        if options.created && !dao.has(CREATED_FIELD) {
            dao.set_created_date(now.clone());
        }
        if options.updated {
            dao.set_last_updated(now.clone());
        }

        let id = dao.id().map(str::to_string);
        let response = self.store(doc_type, dao.data(), id.as_deref(), &[]).await?;
        if !response.is_accepted() {
            return Err(response.into_server_error());
        }

        if options.blocking {
            match id {
                Some(id) => self.await_visible(doc_type, &id, &now, options.max_wait).await?,
                None => tracing::warn!("record has no identity to poll for, not waiting"),
            }
        }
        Ok(())
    }

    async fn await_visible(
        &self,
        doc_type: &str,
        id: &str,
        stamp: &str,
        max_wait: Option<Duration>,
    ) -> Result<()> {
        let fields_shape = self.connection().version().fields_query();
        let query = if fields_shape {
            json!({ "query": { "term": { "id.exact": id } }, "fields": [UPDATED_FIELD] })
        } else {
            json!({ "query": { "term": { "id": id } }, "_source": [UPDATED_FIELD] })
        };

        let mut waited = Duration::ZERO;
        loop {
            if matches!(max_wait, Some(max) if waited >= max) {
                tracing::warn!(id, waited_ms = waited.as_millis() as u64, "gave up waiting for save to become visible");
                return Ok(());
            }

            let response = self
                .search(&[doc_type], Some(&query), SearchMethod::Post, &[])
                .await?;
            let hits = if response.is_success() {
                unpack_hits(&response.value()?)
            } else {
                tracing::debug!(status = response.status, "visibility search failed, retrying");
                Vec::new()
            };

            if hits.len() > 1 {
                return Err(ClientError::Consistency(format!(
                    "more than one record with id {}",
                    id
                )));
            }
            if let Some(hit) = hits.first() {
                let observed = hit.get(UPDATED_FIELD).and_then(|v| match v {
                    Value::Array(values) => values.first(),
                    other => Some(other),
                });
                if observed.and_then(Value::as_str) == Some(stamp) {
                    return Ok(());
                }
            }

            tokio::time::sleep(POLL_INTERVAL).await;
            waited += POLL_INTERVAL;
        }
    }

    /// Delete a record by identity; returns the types it was deleted from.
    pub async fn delete_record(&self, id: &str, strategy: &DeleteStrategy) -> Result<Vec<String>> {
        let candidates = match strategy {
            DeleteStrategy::Direct(doc_type) => {
                return Ok(if self.delete_in(doc_type, id).await? {
                    vec![doc_type.clone()]
                } else {
                    Vec::new()
                });
            }
            DeleteStrategy::ProbeCandidates(types) => types,
        };

        let mut deleted = Vec::new();
        for doc_type in candidates {
            if self.get(doc_type, id).await?.status != 200 {
                continue;
            }
            if self.delete_in(doc_type, id).await? {
                deleted.push(doc_type.clone());
            }
        }
        tracing::debug!(id, ?deleted, "probed delete finished");
        Ok(deleted)
    }

    /// `false` when the record was not there.
    async fn delete_in(&self, doc_type: &str, id: &str) -> Result<bool> {
        let response = self.delete(Some(doc_type), Some(id)).await?;
        match response.status {
            404 => Ok(false),
            _ if response.is_accepted() => Ok(true),
            _ => Err(response.into_server_error()),
        }
    }

    /// Fetch a record from the first of `types` that holds it.
    pub async fn pull<S: AsRef<str>>(&self, id: &str, types: &[S]) -> Result<Option<Dao>> {
        for doc_type in types {
            let response = self.get(doc_type.as_ref(), id).await?;
            if response.status == 404 {
                continue;
            }
            if !response.is_success() {
                return Err(response.into_server_error());
            }
            return Ok(unpack_get(&response.value()?).map(Dao::from_record));
        }
        Ok(None)
    }

    /// Build a `bool.must` query from `params` and run it.
    pub async fn query<S: AsRef<str>>(&self, params: &QueryParams, types: &[S]) -> Result<Value> {
        let query = build_query(params)?;
        self.search_value(types, &query).await
    }

    /// Like [`Client::query`], unpacked into records.
    pub async fn object_query<S: AsRef<str>>(&self, params: &QueryParams, types: &[S]) -> Result<Vec<Dao>> {
        let value = self.query(params, types).await?;
        Ok(unpack_hits(&value).into_iter().map(Dao::from_record).collect())
    }

    /// Run a queue of store and remove actions in order.
    ///
    /// Every action is validated before it runs; the first malformed one
    /// stops the queue.
    pub async fn actions(&self, queue: &[Action]) -> Result<()> {
        for action in queue {
            match action {
                Action::Store { index, id, record } => {
                    let doc_type = index
                        .as_deref()
                        .ok_or_else(|| ClientError::InvalidAction("no index provided for store action".into()))?;
                    let record = record
                        .as_ref()
                        .ok_or_else(|| ClientError::InvalidAction("no record provided for store action".into()))?;
                    let response = self.store(doc_type, record, id.as_deref(), &[]).await?;
                    if !response.is_accepted() {
                        return Err(response.into_server_error());
                    }
                }
                Action::Remove { index, id, query } => {
                    let doc_type = index
                        .as_deref()
                        .ok_or_else(|| ClientError::InvalidAction("no index provided for remove action".into()))?;
                    match (id, query) {
                        (Some(id), _) => {
                            self.delete_in(doc_type, id).await?;
                        }
                        (None, Some(query)) => {
                            let response = self.delete_by_query(doc_type, query).await?;
                            if !response.is_accepted() {
                                return Err(response.into_server_error());
                            }
                        }
                        (None, None) => {
                            return Err(ClientError::InvalidAction(
                                "no id or query provided for remove action".into(),
                            ))
                        }
                    }
                }
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Typed helpers

    pub async fn save_object<T: DomainObject>(&self, object: &mut T, options: SaveOptions) -> Result<()> {
        self.save(object.dao_mut(), &T::write_type(), options).await
    }

    pub async fn pull_object<T: DomainObject>(&self, id: &str) -> Result<Option<T>> {
        Ok(self.pull(id, &T::read_types()).await?.map(T::from_dao))
    }

    pub async fn delete_object<T: DomainObject>(&self, object: &T) -> Result<Vec<String>> {
        let Some(id) = object.dao().id() else {
            return Ok(Vec::new());
        };
        self.delete_record(id, &DeleteStrategy::for_types(&T::read_types()))
            .await
    }

    pub async fn query_objects<T: DomainObject>(&self, params: &QueryParams) -> Result<Vec<T>> {
        Ok(self
            .object_query(params, &T::read_types())
            .await?
            .into_iter()
            .map(T::from_dao)
            .collect())
    }

    pub async fn count_objects<T: DomainObject>(&self, query: &Value) -> Result<u64> {
        self.count(&T::read_types(), query).await
    }

    /// Every object of `T`'s read types, paged by offset.
    pub fn iterall<T: DomainObject + 'static>(
        &self,
        options: PageOptions,
    ) -> impl Stream<Item = Result<T>> + '_ {
        self.iterate(&T::read_types(), None, options)
            .into_stream()
            .map_ok(|record| T::from_dao(Dao::from_record(record)))
    }

    pub fn scroll_objects<T: DomainObject + 'static>(
        &self,
        query: Option<&Value>,
        options: ScrollOptions,
    ) -> impl Stream<Item = Result<T>> + '_ {
        self.scroll(&T::read_types(), query, options)
            .into_stream()
            .map_ok(|record| T::from_dao(Dao::from_record(record)))
    }
}
