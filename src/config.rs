//! Run configuration: immutable options plus CLI parse helpers.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::transport::Engine;

/// Immutable configuration for one harness run. Constructed once by the
/// driver and handed to the client; never mutated afterwards.
#[derive(Clone, Debug)]
pub struct Options {
    /// Messaging engine to connect with.
    pub engine: Engine,
    /// Endpoint address, e.g. `amqp://127.0.0.1:5672/%2f`.
    pub address: String,
    /// Optional SASL username.
    pub username: Option<String>,
    /// Optional SASL password.
    pub password: Option<String>,
    /// Node (queue) the link attaches to.
    pub node: String,
    /// Total number of operations across all loops (0 = unbounded).
    pub count: u64,
    /// Number of concurrent operation loops.
    pub requests: u32,
    /// Emit a progress line every N attempts (0 = disabled).
    pub progress: u64,
    /// Payload size in bytes for sender operations.
    pub payload_size: usize,
    /// Timeout for connection/session/link open.
    pub open_timeout: Duration,
    /// Timeout for a single send/receive operation.
    pub op_timeout: Duration,
    /// Timeout for connection close during cleanup.
    pub close_timeout: Duration,
    /// Engine-specific connect options as KEY=VALUE pairs.
    pub params: BTreeMap<String, String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            engine: Engine::Amqp,
            address: "amqp://127.0.0.1:5672/%2f".into(),
            username: None,
            password: None,
            node: "bench".into(),
            count: 0,
            requests: 1,
            progress: 0,
            payload_size: 1024,
            open_timeout: Duration::from_secs(30),
            op_timeout: Duration::from_millis(5000),
            close_timeout: Duration::from_secs(10),
            params: BTreeMap::new(),
        }
    }
}

/// Parse an engine name from the CLI.
pub fn parse_engine(s: &str) -> Option<Engine> {
    match s.to_ascii_lowercase().as_str() {
        "amqp" => Some(Engine::Amqp),
        #[cfg(any(test, feature = "transport-mock"))]
        "mock" => Some(Engine::Mock),
        _ => None,
    }
}

/// Parse repeatable `KEY=VALUE` arguments into a params map. Malformed
/// entries (no `=`) are ignored.
pub fn parse_param_kv(pairs: &[String]) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    for pair in pairs {
        if let Some((k, v)) = pair.split_once('=') {
            if !k.is_empty() {
                params.insert(k.to_string(), v.to_string());
            }
        }
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_engine_known_names() {
        assert!(matches!(parse_engine("amqp"), Some(Engine::Amqp)));
        assert!(matches!(parse_engine("AMQP"), Some(Engine::Amqp)));
        assert!(parse_engine("kafka").is_none());
    }

    #[test]
    fn parse_param_kv_splits_on_first_equals() {
        let params = parse_param_kv(&[
            "fail_every=2".to_string(),
            "token=a=b".to_string(),
            "garbage".to_string(),
            "=novalue".to_string(),
        ]);
        assert_eq!(params.get("fail_every").map(String::as_str), Some("2"));
        assert_eq!(params.get("token").map(String::as_str), Some("a=b"));
        assert_eq!(params.len(), 2);
    }
}
