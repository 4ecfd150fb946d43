pub mod api;
pub mod core;

pub use crate::api::video::VideoTextAnalyzer;
pub use crate::core::config::{ConsolidationMode, SessionConfig};
pub use crate::core::error::ConsolidationError;

/// Installs the platform logger. Safe to call more than once.
pub fn init_logging() {
    #[cfg(target_os = "android")]
    {
        android_logger::init_once(
            android_logger::Config::default()
                .with_max_level(log::LevelFilter::Debug)
                .with_tag("caption_lens"),
        );
    }

    #[cfg(not(target_os = "android"))]
    {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format_timestamp_millis()
            .try_init();
    }
}
