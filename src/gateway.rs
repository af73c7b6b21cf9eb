//! Table-scoped operations. A gateway is built from an [`Environment`]
//! and hands out the row-scoped values in [`crate::device`] and
//! [`crate::recording`].
//!
//! [`Environment`]: crate::environment::Environment

mod devices;
mod recordings;

pub use devices::Devices;
pub use recordings::{AudioRecordings, FileData};

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use once_cell::sync::OnceCell;
    use slog::o;

    use crate::audio::format::AudioFormat;
    use crate::audio::AudioProbe;
    use crate::credentials::TEST_COST;
    use crate::db::MemoryDb;
    use crate::environment::{Config, Environment};
    use crate::errors::BackendError;
    use crate::store::MemoryStore;

    static SLOG_SCOPE_GUARD: OnceCell<slog_scope::GlobalLoggerGuard> = OnceCell::new();

    pub struct TestEnvironment {
        pub environment: Environment,
        pub db: Arc<MemoryDb>,
        pub store: Arc<MemoryStore>,
    }

    /// Builds an environment over in-memory collaborators. The prober
    /// recognises data starting with `OggS` as a one-minute Ogg file.
    pub fn make_environment(test_name: &str) -> TestEnvironment {
        SLOG_SCOPE_GUARD.get_or_init(|| slog_envlogger::init().expect("initialize slog-envlogger"));

        let logger = Arc::new(slog_scope::logger().new(o!("test" => test_name.to_owned())));
        let db = Arc::new(MemoryDb::new());
        let store = Arc::new(MemoryStore::new());

        let prober = Arc::new(|data: &[u8]| {
            if data.starts_with(b"OggS") {
                Ok(AudioProbe {
                    formats: vec![AudioFormat::new("ogg".to_owned(), "opus".to_owned())],
                    duration: Some(59.6),
                })
            } else {
                Err(BackendError::UnrecognizedAudioFormat)
            }
        });

        let mut config = Config::default();
        config.hash_cost = TEST_COST;
        config.max_file_size = 1024;

        TestEnvironment {
            environment: Environment::new(logger, db.clone(), store.clone(), prober, config),
            db,
            store,
        }
    }
}
