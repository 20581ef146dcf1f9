use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
};

use tracing::info;

use orders::model::{JobOrder, RepairOrder};

use crate::{
    auth::AuthUser,
    config::Config,
    sheets::{self, SheetsClient},
    store::{FallbackStore, OrderStore, RedisStore, init_redis},
};

pub struct AppState {
    pub config: Config,
    pub repairs: Arc<dyn OrderStore<RepairOrder>>,
    pub jobs: Arc<dyn OrderStore<JobOrder>>,
    /// Reconfigurable at runtime through the sheets config routes.
    pub sheets: RwLock<Option<SheetsClient>>,
    pub sessions: Mutex<HashMap<String, AuthUser>>,
}

impl AppState {
    pub async fn new() -> Arc<Self> {
        let config = Config::load();

        // the persistence mode is picked here, once, for the process lifetime
        let (repairs, jobs): (
            Arc<dyn OrderStore<RepairOrder>>,
            Arc<dyn OrderStore<JobOrder>>,
        ) = match &config.redis_url {
            Some(url) => {
                info!("Using remote order store");
                let (client, conn) = init_redis(url).await;
                (
                    RedisStore::connect(&client, conn.clone(), config.public_url.clone())
                        .await
                        .expect("Remote store unreachable!"),
                    RedisStore::connect(&client, conn, config.public_url.clone())
                        .await
                        .expect("Remote store unreachable!"),
                )
            }
            None => {
                info!(
                    "No remote store configured, using local fallback in {}",
                    config.data_dir.display()
                );
                (
                    Arc::new(
                        FallbackStore::load(&config.data_dir).expect("Data directory unwritable!"),
                    ),
                    Arc::new(
                        FallbackStore::load(&config.data_dir).expect("Data directory unwritable!"),
                    ),
                )
            }
        };

        // a config saved through the API wins over the environment one
        let sheets_client = sheets::load_persisted(&config.data_dir)
            .or_else(|| config.sheets.clone())
            .map(SheetsClient::new);

        if sheets_client.is_some() {
            info!("Spreadsheet mirroring enabled");
        }

        Arc::new(Self {
            config,
            repairs,
            jobs,
            sheets: RwLock::new(sheets_client),
            sessions: Mutex::new(HashMap::new()),
        })
    }

    pub fn sheets_client(&self) -> Option<SheetsClient> {
        self.sheets.read().unwrap().clone()
    }
}
