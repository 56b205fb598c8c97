//! Server configuration
//!
//! Parsed from CLI flags (and environment variables with the `TILELOG_`
//! prefix). Tests construct the struct directly and override what they
//! need via `..Default::default()`.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// tilelog server: append-only verifiable log over HTTP
#[derive(Debug, Clone, Parser)]
#[command(name = "tilelog-server", version)]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, env = "TILELOG_LISTEN_ADDR", default_value = "127.0.0.1:8080")]
    pub listen_addr: String,

    /// Directory holding the log's tiles, bundles, and state
    #[arg(long, env = "TILELOG_DATA_DIR", default_value = "./tilelog-data")]
    pub data_dir: PathBuf,

    /// Origin string stamped into every checkpoint
    #[arg(long, env = "TILELOG_ORIGIN", default_value = "tilelog.example/log")]
    pub origin: String,

    /// File holding the 32-byte hex-encoded Ed25519 seed used to sign
    /// checkpoints
    #[arg(long, env = "TILELOG_SIGNING_KEY_FILE")]
    pub signing_key_file: Option<PathBuf>,

    /// Entries per integration batch
    #[arg(long, default_value_t = 256)]
    pub max_batch_size: usize,

    /// Milliseconds a buffered entry may wait before its batch flushes
    #[arg(long, default_value_t = 250)]
    pub max_batch_age_ms: u64,

    /// Buffered entries beyond which /add returns 503
    #[arg(long, default_value_t = 1024)]
    pub max_pending: usize,

    /// Largest accepted entry body, in bytes
    #[arg(long, default_value_t = 4096)]
    pub max_entry_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            data_dir: PathBuf::from("./tilelog-data"),
            origin: "tilelog.example/log".to_string(),
            signing_key_file: None,
            max_batch_size: 256,
            max_batch_age_ms: 250,
            max_pending: 1024,
            max_entry_size: 4096,
        }
    }
}

impl ServerConfig {
    /// Queue age bound as a [`Duration`].
    pub fn max_batch_age(&self) -> Duration {
        Duration::from_millis(self.max_batch_age_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_parser_defaults() {
        let parsed = ServerConfig::parse_from(["tilelog-server"]);
        let defaulted = ServerConfig::default();
        assert_eq!(parsed.listen_addr, defaulted.listen_addr);
        assert_eq!(parsed.max_batch_size, defaulted.max_batch_size);
        assert_eq!(parsed.max_entry_size, defaulted.max_entry_size);
        assert_eq!(parsed.origin, defaulted.origin);
    }
}
