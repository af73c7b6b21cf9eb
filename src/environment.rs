use std::sync::Arc;

use logging::Logger;

use crate::audio::AudioProbe;
use crate::config::get_variable_or;
use crate::credentials::HashCost;
use crate::db::Db;
use crate::errors::BackendError;
use crate::store::Store;

pub type Prober = dyn Fn(&[u8]) -> Result<AudioProbe, BackendError> + Send + Sync;

/// Everything the gateways need from the outside world.
#[derive(Clone)]
pub struct Environment {
    pub logger: Arc<Logger>,
    pub db: Arc<dyn Db>,
    pub store: Arc<dyn Store>,
    pub prober: Arc<Prober>,
    pub config: Config,
}

impl Environment {
    pub fn new(
        logger: Arc<Logger>,
        db: Arc<dyn Db>,
        store: Arc<dyn Store>,
        prober: Arc<Prober>,
        config: Config,
    ) -> Self {
        Self {
            logger,
            db,
            store,
            prober,
            config,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    /// Argon2 parameters for new password digests.
    pub(crate) hash_cost: HashCost,

    /// Page size used when a listing doesn't ask for one.
    pub(crate) default_limit: i64,

    /// Largest audio file accepted, in bytes.
    pub(crate) max_file_size: usize,
}

impl Config {
    pub fn new(hash_cost: HashCost, default_limit: i64, max_file_size: usize) -> Self {
        Self {
            hash_cost,
            default_limit,
            max_file_size,
        }
    }

    /// Reads the configuration from `BACKEND_*` variables, falling back
    /// to the defaults for any that are unset.
    pub fn from_env() -> Self {
        let defaults = HashCost::default();

        Self {
            hash_cost: HashCost {
                memory_kib: get_variable_or("BACKEND_HASH_MEMORY_KIB", defaults.memory_kib),
                iterations: get_variable_or("BACKEND_HASH_ITERATIONS", defaults.iterations),
                parallelism: get_variable_or("BACKEND_HASH_PARALLELISM", defaults.parallelism),
            },
            default_limit: get_variable_or("BACKEND_DEFAULT_PAGE_SIZE", DEFAULT_LIMIT),
            max_file_size: get_variable_or("BACKEND_MAX_FILE_SIZE", DEFAULT_MAX_FILE_SIZE),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(HashCost::default(), DEFAULT_LIMIT, DEFAULT_MAX_FILE_SIZE)
    }
}

const DEFAULT_LIMIT: i64 = 300;
const DEFAULT_MAX_FILE_SIZE: usize = 50 * 1024 * 1024;
