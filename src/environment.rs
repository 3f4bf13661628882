use std::sync::Arc;

use slog::Logger;

use crate::db::Db;
use crate::external::{Analyzer, Localizer};
use crate::store::Store;

pub type SafeDb = dyn Db + Send + Sync;

/// Everything a request handler needs, constructed once in `main` (or
/// a test) and injected. There is no ambient global state.
#[derive(Clone)]
pub struct Environment {
    pub logger: Arc<Logger>,
    pub db: Arc<SafeDb>,
    pub store: Arc<dyn Store>,
    pub analyzer: Arc<dyn Analyzer>,
    pub localizer: Arc<dyn Localizer>,
    pub config: Config,
}

impl Environment {
    pub fn new(
        logger: Arc<Logger>,
        db: Arc<SafeDb>,
        store: Arc<dyn Store>,
        analyzer: Arc<dyn Analyzer>,
        localizer: Arc<dyn Localizer>,
        config: Config,
    ) -> Self {
        Self {
            logger,
            db,
            store,
            analyzer,
            localizer,
            config,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Whether error responses carry the debug form of the underlying
    /// error. Off in production.
    pub(crate) include_error_details: bool,
}

impl Config {
    pub fn new(include_error_details: bool) -> Self {
        Self {
            include_error_details,
        }
    }
}
