pub mod config;
pub mod models;
pub mod pipeline;

pub use models::{FinalResult, RawDocument};
pub use pipeline::orchestrator::RecipePipeline;
pub use pipeline::PipelineError;

use tracing_subscriber::EnvFilter;

/// Initialize tracing once per process. Logs go to stderr so stdout stays
/// free for results. Calling it again is a no-op.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
