pub mod api;
pub mod config;
pub mod crypto;
pub mod db;
pub mod storage;

pub use db::DbPool;

use config::Config;
use std::sync::Arc;

use crate::api::rate_limit::RateLimiter;
use crate::api::session::SessionManager;
use crate::storage::{BlobStore, LocalBlobStore};

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub sessions: SessionManager,
    pub blobs: Arc<dyn BlobStore>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool) -> Self {
        let secret = match &config.session.secret {
            Some(secret) if !secret.is_empty() => secret.clone(),
            _ => {
                tracing::warn!(
                    "No session secret configured; generated a random one. \
                     Sessions will not survive a restart."
                );
                crypto::generate_secret()
            }
        };

        let sessions = SessionManager::new(&config.session, &secret);
        let blobs: Arc<dyn BlobStore> =
            Arc::new(LocalBlobStore::new(config.storage.upload_dir.clone()));
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));

        Self {
            config,
            db,
            sessions,
            blobs,
            rate_limiter,
        }
    }
}
