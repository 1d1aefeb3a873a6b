use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::entry::LogIndex;
use crate::error::{Error, Result};
use crate::methods::{Status, StateMethods};
use crate::options::{ReadOptions, WriteOptions};
use crate::LogId;

/// Resolves the current leader's base URL for a log instance. Backed by
/// whatever cluster membership/directory service a deployment runs; out
/// of scope for this crate beyond this narrow contract.
#[async_trait]
pub trait LeaderLocator: Send + Sync {
    async fn leader_base_url(&self, log_id: LogId) -> Result<String>;
}

/// Forwards every call over HTTP to the log's current leader, following
/// the exact route table of [`crate::rpc::router`]. Used by a server that
/// does not itself host the participant for a given log id.
pub struct ForwardingStateMethods {
    client: reqwest::Client,
    locator: Box<dyn LeaderLocator>,
}

impl ForwardingStateMethods {
    pub fn new(locator: Box<dyn LeaderLocator>) -> Self {
        Self { client: reqwest::Client::new(), locator }
    }

    async fn base_url(&self, log_id: LogId) -> Result<String> {
        self.locator.leader_base_url(log_id).await
    }

    fn map_transport_error(err: reqwest::Error) -> Error {
        Error::Other(anyhow::anyhow!("forwarding request failed: {err}"))
    }
}

#[derive(Debug, Deserialize)]
struct IndexResponse {
    index: u64,
}

#[derive(Debug, Deserialize)]
struct ResultResponse<T> {
    result: T,
}

#[derive(Debug, Serialize)]
struct CasValue<'a> {
    #[serde(rename = "oldValue")]
    old_value: &'a str,
    #[serde(rename = "newValue")]
    new_value: &'a str,
}

fn write_query(options: WriteOptions) -> Vec<(&'static str, &'static str)> {
    vec![
        ("waitForApplied", if options.wait_for_applied { "1" } else { "0" }),
        ("waitForSync", if options.wait_for_sync { "1" } else { "0" }),
        ("waitForCommit", if options.wait_for_commit { "1" } else { "0" }),
    ]
}

fn read_query(options: &ReadOptions) -> Vec<(&'static str, String)> {
    let mut params = vec![(
        "allowDirtyRead",
        if options.allow_dirty_read { "1" } else { "0" }.to_string(),
    )];
    if let Some(index) = options.wait_for_applied {
        params.push(("waitForIndex", index.value().to_string()));
    }
    if let Some(participant) = options.read_from {
        params.push(("readFrom", participant.0.to_string()));
    }
    params
}

/// Maps the forwarding HTTP error-code contract (spec.md §6) back onto
/// `Error`, preserving `PreconditionFailed`'s distinction from a plain
/// transport failure.
fn map_response_status(status: reqwest::StatusCode) -> Error {
    match status {
        reqwest::StatusCode::SERVICE_UNAVAILABLE => Error::NotLeader { leader_hint: None },
        reqwest::StatusCode::PRECONDITION_FAILED => Error::PreconditionFailed,
        reqwest::StatusCode::NOT_FOUND => Error::NotFound,
        other => Error::Other(anyhow::anyhow!("unexpected forwarding response status: {other}")),
    }
}

#[async_trait]
impl StateMethods for ForwardingStateMethods {
    async fn insert(&self, log_id: LogId, map: HashMap<String, String>, options: WriteOptions) -> Result<LogIndex> {
        let base = self.base_url(log_id).await?;
        let response = self
            .client
            .post(format!("{base}/_api/prototype-state/{log_id}/insert"))
            .query(&write_query(options))
            .json(&map)
            .send()
            .await
            .map_err(Self::map_transport_error)?;
        if !response.status().is_success() {
            return Err(map_response_status(response.status()));
        }
        let body: IndexResponse = response.json().await.map_err(Self::map_transport_error)?;
        Ok(LogIndex(body.index))
    }

    async fn remove(&self, log_id: LogId, keys: Vec<String>, options: WriteOptions) -> Result<LogIndex> {
        let base = self.base_url(log_id).await?;

        let response = if let [key] = keys.as_slice() {
            self.client
                .delete(format!("{base}/_api/prototype-state/{log_id}/entry/{key}"))
                .query(&write_query(options))
                .send()
                .await
                .map_err(Self::map_transport_error)?
        } else {
            self.client
                .delete(format!("{base}/_api/prototype-state/{log_id}/multi-remove"))
                .query(&write_query(options))
                .json(&keys)
                .send()
                .await
                .map_err(Self::map_transport_error)?
        };

        if !response.status().is_success() {
            return Err(map_response_status(response.status()));
        }
        let body: IndexResponse = response.json().await.map_err(Self::map_transport_error)?;
        Ok(LogIndex(body.index))
    }

    async fn compare_exchange(
        &self,
        log_id: LogId,
        key: String,
        old_value: String,
        new_value: String,
        options: WriteOptions,
    ) -> Result<LogIndex> {
        let base = self.base_url(log_id).await?;
        let body = HashMap::from([(key, CasValue { old_value: &old_value, new_value: &new_value })]);
        let response = self
            .client
            .put(format!("{base}/_api/prototype-state/{log_id}/cmp-ex"))
            .query(&write_query(options))
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport_error)?;
        if !response.status().is_success() {
            return Err(map_response_status(response.status()));
        }
        let body: IndexResponse = response.json().await.map_err(Self::map_transport_error)?;
        Ok(LogIndex(body.index))
    }

    async fn get(&self, log_id: LogId, key: String, options: ReadOptions) -> Result<Option<String>> {
        let mut result = self.get_many(log_id, vec![key.clone()], options).await?;
        Ok(result.remove(&key))
    }

    async fn get_many(&self, log_id: LogId, keys: Vec<String>, options: ReadOptions) -> Result<HashMap<String, String>> {
        let base = self.base_url(log_id).await?;
        let response = self
            .client
            .post(format!("{base}/_api/prototype-state/{log_id}/multi-get"))
            .query(&read_query(&options))
            .json(&keys)
            .send()
            .await
            .map_err(Self::map_transport_error)?;
        if !response.status().is_success() {
            return Err(map_response_status(response.status()));
        }
        let body: ResultResponse<HashMap<String, String>> =
            response.json().await.map_err(Self::map_transport_error)?;
        Ok(body.result)
    }

    async fn get_snapshot(&self, log_id: LogId, wait_for_index: LogIndex) -> Result<HashMap<String, String>> {
        let base = self.base_url(log_id).await?;
        let response = self
            .client
            .get(format!("{base}/_api/prototype-state/{log_id}/snapshot"))
            .query(&[("waitForIndex", wait_for_index.value().to_string())])
            .send()
            .await
            .map_err(Self::map_transport_error)?;
        if !response.status().is_success() {
            return Err(map_response_status(response.status()));
        }
        let body: ResultResponse<HashMap<String, String>> =
            response.json().await.map_err(Self::map_transport_error)?;
        Ok(body.result)
    }

    async fn wait_for_applied(&self, log_id: LogId, index: LogIndex) -> Result<()> {
        let base = self.base_url(log_id).await?;
        let response = self
            .client
            .get(format!(
                "{base}/_api/prototype-state/{log_id}/wait-for-applied/{}",
                index.value()
            ))
            .send()
            .await
            .map_err(Self::map_transport_error)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(map_response_status(response.status()))
        }
    }

    async fn create_state(&self, _log_id: LogId) -> Result<()> {
        Err(Error::Other(anyhow::anyhow!(
            "createState must be issued against the cluster's database lifecycle API, not forwarded per-log"
        )))
    }

    async fn drop(&self, _log_id: LogId) -> Result<()> {
        Err(Error::Other(anyhow::anyhow!(
            "drop must be issued against the cluster's database lifecycle API, not forwarded per-log"
        )))
    }

    async fn status(&self, log_id: LogId) -> Result<Status> {
        let base = self.base_url(log_id).await?;
        let response = self
            .client
            .get(format!("{base}/_api/prototype-state/{log_id}"))
            .send()
            .await
            .map_err(Self::map_transport_error)?;
        if !response.status().is_success() {
            return Err(map_response_status(response.status()));
        }
        Ok(Status { log_id, is_leader: false })
    }
}
