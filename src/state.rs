use std::sync::Arc;
use std::time::Duration;

use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr, TransactionTrait};

use crate::cache::RoleCache;
use crate::config::ModerationPolicy;
use crate::db::DbPools;
use crate::registry::ConnectionRegistry;
use crate::services::notification::Notifier;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Read pool
    pub db: DatabaseConnection,
    /// Single write connection; see [`DbPools`]
    pub writer: DatabaseConnection,
    /// username -> live WebSocket session
    pub registry: Arc<ConnectionRegistry>,
    /// Role lookups for the authorization gates, invalidated on role changes
    pub role_cache: Arc<RoleCache>,
    pub policy: ModerationPolicy,
    /// JWT signing secret
    pub jwt_secret: String,
    pub external_host: String,
}

impl AppState {
    pub fn new(
        pools: DbPools,
        jwt_secret: String,
        external_host: String,
        policy: ModerationPolicy,
        role_cache_ttl: Duration,
    ) -> Self {
        Self {
            db: pools.reader,
            writer: pools.writer,
            registry: Arc::new(ConnectionRegistry::new()),
            role_cache: Arc::new(RoleCache::new(role_cache_ttl)),
            policy,
            jwt_secret,
            external_host,
        }
    }

    /// Open a transaction on the write connection. Concurrent callers wait for
    /// the connection, so transactions run one after another. Dropping the
    /// transaction without `commit` rolls it back.
    ///
    /// Nothing may touch `db` or `writer` while the transaction is open: with
    /// the single-connection in-memory database that would wait forever.
    pub async fn begin_write(&self) -> Result<DatabaseTransaction, DbErr> {
        self.writer.begin().await
    }

    pub fn notifier(&self) -> Notifier {
        Notifier::new(self.writer.clone(), self.registry.clone())
    }

    pub fn online_count(&self) -> usize {
        self.registry.online_count()
    }
}
