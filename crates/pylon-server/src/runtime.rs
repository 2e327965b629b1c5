//! The engine runtime.
//!
//! Every server owns a Tokio runtime with a single worker thread. All socket
//! work runs there; the host only ever touches the queue and registries.

use tokio::runtime::Runtime;

/// Engine runtime settings.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Number of worker threads.
    pub worker_threads: usize,
    /// Stack size for worker threads in bytes.
    pub thread_stack_size: usize,
    /// Thread name.
    pub thread_name: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: 1,
            thread_stack_size: 2 * 1024 * 1024,
            thread_name: "pylon-engine".to_string(),
        }
    }
}

/// Builds a runtime for one server.
pub fn build_runtime(config: &RuntimeConfig) -> std::io::Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads.max(1))
        .thread_name(&config.thread_name)
        .thread_stack_size(config.thread_stack_size)
        .enable_all()
        .build()
}
