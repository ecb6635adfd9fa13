//! Engine: one configured dialect plus the model catalog, shared by every
//! session it opens.

use crate::{Session, SessionConfig};
use rowmap_core::{Catalog, Driver};
use rowmap_query::{DbType, Dialect, Features, QuotePolicy, Statement};
use serde::Deserialize;
use std::sync::Arc;

/// Engine settings, typically read from a JSON configuration file.
///
/// ```ignore
/// let config = EngineConfig::from_json_str(r#"{
///     "db_type": "postgres",
///     "quote_policy": "reserved",
///     "session": { "time_zone": "local", "n1_threshold": 5 }
/// }"#)?;
/// let engine = Engine::from_config(&config, catalog);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    pub db_type: DbType,
    #[serde(default)]
    pub quote_policy: QuotePolicy,
    /// Allow upserts to update the conflicting row.
    #[serde(default = "default_upsert_update")]
    pub upsert_update: bool,
    #[serde(default)]
    pub session: SessionConfig,
}

const fn default_upsert_update() -> bool {
    true
}

impl EngineConfig {
    pub fn new(db_type: DbType) -> Self {
        Self {
            db_type,
            quote_policy: QuotePolicy::default(),
            upsert_update: true,
            session: SessionConfig::default(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// The dialect these settings describe.
    pub fn dialect(&self) -> Dialect {
        Dialect::new(self.db_type)
            .with_quote_policy(self.quote_policy)
            .with_features(Features {
                upsert_update: self.upsert_update,
            })
    }
}

/// Shared, read-only state for opening sessions.
#[derive(Debug, Clone)]
pub struct Engine {
    dialect: Arc<Dialect>,
    catalog: Arc<Catalog>,
    session_config: SessionConfig,
}

impl Engine {
    pub fn new(dialect: Dialect, catalog: Catalog) -> Self {
        Self {
            dialect: Arc::new(dialect),
            catalog: Arc::new(catalog),
            session_config: SessionConfig::default(),
        }
    }

    pub fn from_config(config: &EngineConfig, catalog: Catalog) -> Self {
        tracing::info!(
            db_type = %config.db_type,
            quote_policy = ?config.quote_policy,
            tables = catalog.len(),
            "engine configured"
        );
        Self::new(config.dialect(), catalog).with_session_config(config.session.clone())
    }

    #[must_use]
    pub fn with_session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    pub fn dialect(&self) -> &Arc<Dialect> {
        &self.dialect
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.session_config
    }

    /// A standalone statement builder for this engine's dialect.
    pub fn statement(&self) -> Statement {
        Statement::new(Arc::clone(&self.dialect))
    }

    /// Open a session over `driver`.
    pub fn session<D: Driver>(&self, driver: D) -> Session<D> {
        Session::with_config(
            driver,
            Arc::clone(&self.dialect),
            Arc::clone(&self.catalog),
            self.session_config.clone(),
        )
    }
}
