use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub markets_path: PathBuf,
    pub output_dir: PathBuf,
    pub bind_addr: SocketAddr,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    /// Total attempts per request, including the first.
    pub retry_max_attempts: u32,
    pub retry_initial_delay_ms: u64,
    pub retry_backoff_factor: f64,
    /// Fixed pause between successive page requests.
    pub inter_page_delay_ms: u64,
    pub detail_chunk_size: usize,
    pub max_concurrent_chunks: usize,
    pub max_concurrent_scrapes: usize,
}
