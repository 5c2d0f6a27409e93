use api_shared::{AuthConfig, TokenSigner};
use opencare_core::{AccountService, CoreConfig, CoreResult, Database, Entity, Repository};
use std::sync::Arc;

/// Application state for the REST API server
///
/// Shared by every request handler. Holds only cheap handles: each storage operation opens
/// its own connection.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub cfg: Arc<CoreConfig>,
    pub tokens: Arc<TokenSigner>,
    pub accounts: Arc<AccountService>,
}

impl AppState {
    /// Open (and migrate) the database and build the shared services.
    pub fn open(cfg: CoreConfig, auth: AuthConfig) -> CoreResult<Self> {
        let db = Database::open(&cfg)?;
        Ok(Self::new(db, cfg, auth))
    }

    pub fn new(db: Database, cfg: CoreConfig, auth: AuthConfig) -> Self {
        Self {
            accounts: Arc::new(AccountService::new(db.clone(), cfg.clone())),
            tokens: Arc::new(TokenSigner::new(auth)),
            cfg: Arc::new(cfg),
            db,
        }
    }

    pub fn repo<E: Entity>(&self) -> Repository<E> {
        Repository::new(self.db.clone(), (*self.cfg).clone())
    }
}
