use std::{sync::Arc, time::Duration};

use bridge_core::ClientError;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::ProtocolClient;

/// Owner of the protocol client's connection lifecycle.
///
/// Every connect, cleanup and session sync goes through one async lock, so
/// foreground calls and the keep-alive daemon never race to reconnect.
pub struct SessionGuard {
    client: Arc<dyn ProtocolClient>,
    lock: Mutex<()>,
}

impl SessionGuard {
    pub fn new(client: Arc<dyn ProtocolClient>) -> Self {
        Self {
            client,
            lock: Mutex::new(()),
        }
    }

    pub fn client(&self) -> &Arc<dyn ProtocolClient> {
        &self.client
    }

    /// Make sure the socket is live and, when a token exists, that the session
    /// has been synced since the last connect. Performs no retries.
    pub async fn ensure_ready(&self) -> Result<(), ClientError> {
        let _held = self.lock.lock().await;

        if !self.client.is_connected() {
            self.cleanup_locked().await;
            self.client.connect().await?;
            debug!("socket connected");
            if self.client.token().is_some() {
                self.sync_locked().await?;
            }
        } else if self.client.token().is_some() && self.client.me().is_none() {
            debug!("socket alive but session not synced");
            self.sync_locked().await?;
        }

        Ok(())
    }

    /// Connect when disconnected, retrying once after `backoff`. No session sync.
    pub async fn connect_with_retry(&self, backoff: Duration) -> Result<(), ClientError> {
        let _held = self.lock.lock().await;
        if self.client.is_connected() {
            return Ok(());
        }

        if let Err(err) = self.client.connect().await {
            warn!(error = %err, "connect failed; retrying once");
            tokio::time::sleep(backoff).await;
            self.client.connect().await?;
        }
        Ok(())
    }

    /// Single connect attempt when disconnected.
    pub async fn reconnect(&self) -> Result<(), ClientError> {
        let _held = self.lock.lock().await;
        if self.client.is_connected() {
            return Ok(());
        }
        self.client.connect().await
    }

    /// Session sync plus post-login setup.
    pub async fn sync_session(&self) -> Result<(), ClientError> {
        let _held = self.lock.lock().await;
        self.sync_locked().await
    }

    /// Full best-effort client cleanup; leaves the client disconnected.
    pub async fn cleanup(&self) {
        let _held = self.lock.lock().await;
        self.cleanup_locked().await;
    }

    /// Drop the raw socket so the next [`SessionGuard::ensure_ready`] reconnects.
    pub fn reset_connection(&self) {
        self.client.reset_socket();
    }

    async fn cleanup_locked(&self) {
        if let Err(err) = self.client.cleanup().await {
            debug!(error = %err, "client cleanup failed; closing raw socket");
            self.client.reset_socket();
        }
    }

    async fn sync_locked(&self) -> Result<(), ClientError> {
        self.client.sync().await?;
        self.client.post_login_setup().await?;
        info!("session synced");
        Ok(())
    }
}
