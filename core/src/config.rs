//! Engine configuration — `spec.md` §6 "Configuration".
//!
//! A single struct, constructed with [`Config::default`] and overridden
//! field-by-field. No config-file format is mandated; `swarmdl_cli` and
//! `swarmdl_server` expose the same fields as `clap` flags with these
//! defaults baked in.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Minimum known peer count required to start a new download — `spec.md`
    /// §4.5 `new-download`'s peer-count gate.
    pub min_download_server_nodes: usize,
    /// Capacity of the network-transfer dispatch channel — `spec.md` §5.
    pub max_concurrent_downloads: usize,
    /// Maximum number of tasks in an active status at once — `spec.md` §4.5
    /// `trigger`.
    pub max_sessions: usize,
    /// Per-peer worker cap within one transfer round — `spec.md` §4.3.
    pub max_workers_per_peer: usize,
    /// Total worker cap across one transfer round — `spec.md` §4.3.
    pub max_total_workers: usize,
    /// Segments handed to a single worker — `spec.md` §4.3.
    pub segments_per_worker: usize,
    /// Read/write deadline reset before every framed stream operation —
    /// `spec.md` §4.3/§6.
    pub conn_timeout: Duration,
    /// Maximum accepted frame length — `spec.md` §4.3/§6.
    pub max_block_size: usize,
    /// Minimum interval between `segment-verify` executions — `spec.md` §4.1.
    pub verify_retry_delay: Duration,
    /// Base interval for the segment-index tick — `spec.md` §4.1.
    pub index_tick_base: Duration,
    /// Cap on the segment-index tick's exponential backoff — `spec.md` §4.1.
    pub index_tick_cap: Duration,
    /// Window used to batch manifest-response driven dispatch triggers.
    pub batch_window: Duration,
    /// Fallback identity used when the caller supplies no owner key —
    /// `spec.md` §6.
    pub owner_private_key: Vec<u8>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_download_server_nodes: 1,
            max_concurrent_downloads: 50,
            max_sessions: 3,
            max_workers_per_peer: 10,
            max_total_workers: 50,
            segments_per_worker: 10,
            conn_timeout: Duration::from_secs(60),
            max_block_size: 100 * 1024 * 1024,
            verify_retry_delay: Duration::from_secs(5),
            index_tick_base: Duration::from_secs(30),
            index_tick_cap: Duration::from_secs(120),
            batch_window: Duration::from_millis(100),
            owner_private_key: Vec::new(),
        }
    }
}
