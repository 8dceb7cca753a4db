//! Application state wiring the SQLite stores of one data directory.
//!
//! The CLI works offline: it reads and edits the same database a running
//! bot uses, without starting any queues.

use std::path::PathBuf;

use courier_core::event::EventBus;
use courier_core::runtime::QueueKind;
use courier_core::user::UserService;
use courier_infra::config::load_runtime_config;
use courier_infra::filesystem::resolve_data_dir;
use courier_infra::sqlite::{
    DatabasePool, SqliteQueueStore, SqliteSealRepository, SqliteSharedStore,
    SqliteUserRepository, sqlite_stores,
};
use courier_types::config::RuntimeConfig;

pub type ConcreteUserService = UserService<SqliteUserRepository>;

pub struct AppState {
    pub data_dir: PathBuf,
    pub config: RuntimeConfig,
    pub users: ConcreteUserService,
    pub seals: SqliteSealRepository,
    pub shared: SqliteSharedStore,
    pub send_queue: SqliteQueueStore,
    pub receive_queue: SqliteQueueStore,
    pub seal_queue: SqliteQueueStore,
}

impl AppState {
    /// Open the data directory (creating it if needed) and its database.
    pub async fn init(data_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let data_dir = data_dir.unwrap_or_else(resolve_data_dir);
        let config = load_runtime_config(&data_dir).await;
        let db_pool = DatabasePool::open_in(&data_dir).await?;
        tracing::debug!(data_dir = %data_dir.display(), "opened data directory");

        let stores = sqlite_stores(&db_pool);
        let users = UserService::new(
            std::sync::Arc::new(stores.users),
            EventBus::new(config.event_capacity),
        );

        Ok(Self {
            data_dir,
            config,
            users,
            seals: stores.seals,
            shared: stores.shared,
            send_queue: stores.send_queue,
            receive_queue: stores.receive_queue,
            seal_queue: stores.seal_queue,
        })
    }

    pub fn queue(&self, kind: QueueKind) -> &SqliteQueueStore {
        match kind {
            QueueKind::Send => &self.send_queue,
            QueueKind::Receive => &self.receive_queue,
            QueueKind::Seal => &self.seal_queue,
        }
    }
}
