//! [`CoordinationStore`] on a ZooKeeper ensemble.
//!
//! The session is opened lazily and shared by every lookup; the client keeps
//! it alive with its own heartbeats. A request failing for any reason other
//! than a missing node drops the session so the next lookup starts over.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, warn};
use zookeeper_client::{Client, Error as ZkError};

use crate::store::{CoordinationStore, StoreError};

pub struct ZooKeeperStore {
    cluster: String,
    connect_timeout: Duration,
    client: Mutex<Option<Client>>,
}

impl ZooKeeperStore {
    pub fn new(cluster: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            cluster: cluster.into(),
            connect_timeout,
            client: Mutex::new(None),
        }
    }

    /// Cached client, connecting first when there is none.
    async fn client(&self) -> Result<Client, StoreError> {
        let mut slot = self.client.lock().await;
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let connect_error = |message: String| StoreError::Connect {
            endpoint: self.cluster.clone(),
            message,
        };
        let client = timeout(self.connect_timeout, Client::connect(&self.cluster))
            .await
            .map_err(|_| connect_error(format!("no session within {}ms", self.connect_timeout.as_millis())))?
            .map_err(|error| connect_error(error.to_string()))?;
        debug!(endpoint = %self.cluster, "zookeeper session established");
        *slot = Some(client.clone());
        Ok(client)
    }

    async fn discard(&self, path: &str, error: &ZkError) {
        warn!(endpoint = %self.cluster, path = %path, error = %error, "dropping zookeeper session");
        self.client.lock().await.take();
    }
}

#[async_trait]
impl CoordinationStore for ZooKeeperStore {
    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        let client = self.client().await?;
        match client.check_stat(path).await {
            Ok(stat) => Ok(stat.is_some()),
            Err(error) => {
                self.discard(path, &error).await;
                Err(StoreError::Request {
                    path: path.to_string(),
                    source: error,
                })
            }
        }
    }

    async fn children(&self, path: &str) -> Result<Option<Vec<String>>, StoreError> {
        let client = self.client().await?;
        match client.list_children(path).await {
            Ok(children) => Ok(Some(children)),
            Err(ZkError::NoNode) => Ok(None),
            Err(error) => {
                self.discard(path, &error).await;
                Err(StoreError::Request {
                    path: path.to_string(),
                    source: error,
                })
            }
        }
    }
}
