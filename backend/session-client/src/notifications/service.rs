//! Notification feature glue.
//!
//! Owns the cache, the REST calls and the realtime connection for one session.
//! User actions update the cache first and roll back if the server refuses.

use super::api::NotificationApi;
use super::store::{NotificationSnapshot, NotificationStore};
use crate::auth::TokenStore;
use crate::config::{Config, RealtimeConfig};
use crate::error::Result;
use crate::http::RequestPipeline;
use crate::realtime::{ChannelConnector, ConnectionManager, ConnectionStatus};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct NotificationService {
    store: NotificationStore,
    api: NotificationApi,
    connection: ConnectionManager,
    tokens: TokenStore,
    realtime: RealtimeConfig,
    page_size: u32,
    pump: JoinHandle<()>,
}

impl NotificationService {
    /// Must be called inside a tokio runtime; the push pump is spawned here.
    pub fn new(
        config: &Config,
        pipeline: Arc<RequestPipeline>,
        connector: Arc<dyn ChannelConnector>,
    ) -> Self {
        let tokens = pipeline.tokens().clone();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let connection = ConnectionManager::new(config, tokens.clone(), connector, tx);
        let store = NotificationStore::new();

        let pump_store = store.clone();
        let pump = tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                let id = notification.id.clone();
                if !pump_store.apply_pushed(notification) {
                    debug!(%id, "duplicate pushed notification ignored");
                }
            }
        });

        Self {
            store,
            api: NotificationApi::new(pipeline),
            connection,
            tokens,
            realtime: config.realtime.clone(),
            page_size: config.notifications.page_size,
            pump,
        }
    }

    pub fn store(&self) -> &NotificationStore {
        &self.store
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn api(&self) -> &NotificationApi {
        &self.api
    }

    pub fn subscribe(&self) -> watch::Receiver<NotificationSnapshot> {
        self.store.subscribe()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.connection.subscribe()
    }

    /// Whether the current session's role gets the notification feed at all
    pub fn is_available(&self) -> bool {
        self.realtime.allows_role(self.tokens.role().as_deref())
    }

    /// Enable the channel for qualifying roles and load the first page
    pub async fn start(&self) -> Result<()> {
        let available = self.is_available();
        self.connection.set_enabled(available);
        if !available {
            info!(role = ?self.tokens.role(), "notifications not available for this role");
            return Ok(());
        }
        self.fetch(1, self.page_size).await
    }

    pub async fn fetch(&self, page: u32, page_size: u32) -> Result<()> {
        if !self.is_available() {
            return Ok(());
        }
        let page = self.api.list(page, page_size, false).await?;
        debug!(
            count = page.notifications.len(),
            total = page.total,
            unread = page.unread_count,
            "notification page loaded"
        );
        self.store.load_snapshot(page.notifications, page.unread_count);
        Ok(())
    }

    pub async fn refresh_unread_count(&self) -> Result<u64> {
        let count = self.api.unread_count().await?;
        self.store.set_unread_count(count);
        Ok(count)
    }

    pub async fn mark_read(&self, id: &str) -> Result<()> {
        if !self.store.mark_read(id) {
            return Ok(());
        }
        if let Err(e) = self.api.mark_read(id).await {
            warn!(%id, error = %e, "mark read failed, reverting");
            self.store.mark_unread(id);
            return Err(e);
        }
        Ok(())
    }

    pub async fn mark_all_read(&self) -> Result<()> {
        let previous_unread = self.store.unread_count();
        let changed = self.store.mark_all_read();
        if let Err(e) = self.api.mark_all_read().await {
            warn!(count = changed.len(), error = %e, "mark all read failed, reverting");
            for id in &changed {
                self.store.mark_unread(id);
            }
            // Server counter also covers pages that are not cached
            self.store.set_unread_count(previous_unread);
            return Err(e);
        }
        Ok(())
    }

    pub async fn remove(&self, id: &str) -> Result<()> {
        let Some((index, removed)) = self.store.remove(id) else {
            return Ok(());
        };
        if let Err(e) = self.api.delete(id).await {
            warn!(%id, error = %e, "delete failed, restoring");
            self.store.restore(index, removed);
            return Err(e);
        }
        Ok(())
    }

    /// Close the channel and drop cached notifications
    pub fn stop(&self) {
        self.connection.set_enabled(false);
        self.store.clear();
    }
}

impl Drop for NotificationService {
    fn drop(&mut self) {
        self.connection.disconnect();
        self.pump.abort();
    }
}
