//! Structured Logging with Sensitive Data Redaction
//!
//! Level-gated key/value logging to stderr. Field values are redacted by key:
//! key material and seed phrases are fully redacted, signatures and addresses
//! partially. Nothing in this crate ever logs a raw private key.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Minimum level that gets emitted; defaults to Info
static MIN_LEVEL: AtomicU8 = AtomicU8::new(1);

/// Set the minimum emitted level
pub fn set_min_level(level: LogLevel) {
    MIN_LEVEL.store(level as u8, Ordering::SeqCst);
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Structured log entry
#[derive(Debug)]
pub struct LogEntry {
    pub level: LogLevel,
    pub module: &'static str,
    pub message: String,
    pub fields: Vec<(&'static str, String)>,
}

impl LogEntry {
    pub fn new(level: LogLevel, module: &'static str, message: impl Into<String>) -> Self {
        Self {
            level,
            module,
            message: message.into(),
            fields: Vec::new(),
        }
    }

    /// Add a field; the value is redacted when the key looks sensitive
    pub fn field(mut self, key: &'static str, value: impl fmt::Display) -> Self {
        let value_str = value.to_string();
        let redacted = redact_if_sensitive(key, &value_str);
        self.fields.push((key, redacted));
        self
    }

    /// Emit the entry if the level gate allows it
    pub fn log(self) {
        if (self.level as u8) < MIN_LEVEL.load(Ordering::SeqCst) {
            return;
        }

        let fields_str = self
            .fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ");

        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");

        if fields_str.is_empty() {
            eprintln!("[{}] {} [{}] {}", timestamp, self.level, self.module, self.message);
        } else {
            eprintln!(
                "[{}] {} [{}] {} | {}",
                timestamp, self.level, self.module, self.message, fields_str
            );
        }
    }
}

fn redact_if_sensitive(key: &str, value: &str) -> String {
    let key_lower = key.to_lowercase();

    // Key material is never shown, not even partially
    let fully_redacted = [
        "private_key", "secret", "seed", "mnemonic", "passphrase", "xprv", "signing_key",
    ];
    for k in &fully_redacted {
        if key_lower.contains(k) {
            return redact_value(value);
        }
    }

    // Signatures and digests are public but long; show enough to correlate
    let partial = ["signature", "digest", "tx_id", "anchor"];
    for k in &partial {
        if key_lower.contains(k) {
            return redact_tail(value);
        }
    }

    let address_keys = ["address", "recipient", "sender", "destination", "signer"];
    for k in &address_keys {
        if key_lower.contains(k) {
            return redact_address(value);
        }
    }

    value.to_string()
}

fn redact_value(value: &str) -> String {
    if value.is_empty() {
        return "[EMPTY]".to_string();
    }
    if value.len() <= 4 {
        "[REDACTED]".to_string()
    } else {
        format!("[REDACTED:{}chars]", value.len())
    }
}

/// Show a correlation prefix of long public values
fn redact_tail(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.len() <= 16 {
        return trimmed.to_string();
    }
    format!("{}...({}chars)", &trimmed[..12], trimmed.len())
}

/// Show first 6 and last 4 characters of an address
fn redact_address(address: &str) -> String {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return "[EMPTY]".to_string();
    }
    if trimmed.len() <= 12 {
        return redact_value(trimmed);
    }
    format!("{}...{}", &trimmed[..6], &trimmed[trimmed.len() - 4..])
}

/// Convenience macro for debug logging
#[macro_export]
macro_rules! log_debug {
    ($module:expr, $msg:expr) => {
        $crate::utils::logging::LogEntry::new(
            $crate::utils::logging::LogLevel::Debug,
            $module,
            $msg
        ).log()
    };
    ($module:expr, $msg:expr, $($key:ident = $value:expr),* $(,)?) => {
        $crate::utils::logging::LogEntry::new(
            $crate::utils::logging::LogLevel::Debug,
            $module,
            $msg
        )
        $(.field(stringify!($key), &$value))*
        .log()
    };
}

/// Convenience macro for info logging
#[macro_export]
macro_rules! log_info {
    ($module:expr, $msg:expr) => {
        $crate::utils::logging::LogEntry::new(
            $crate::utils::logging::LogLevel::Info,
            $module,
            $msg
        ).log()
    };
    ($module:expr, $msg:expr, $($key:ident = $value:expr),* $(,)?) => {
        $crate::utils::logging::LogEntry::new(
            $crate::utils::logging::LogLevel::Info,
            $module,
            $msg
        )
        $(.field(stringify!($key), &$value))*
        .log()
    };
}

/// Convenience macro for warning logging
#[macro_export]
macro_rules! log_warn {
    ($module:expr, $msg:expr) => {
        $crate::utils::logging::LogEntry::new(
            $crate::utils::logging::LogLevel::Warn,
            $module,
            $msg
        ).log()
    };
    ($module:expr, $msg:expr, $($key:ident = $value:expr),* $(,)?) => {
        $crate::utils::logging::LogEntry::new(
            $crate::utils::logging::LogLevel::Warn,
            $module,
            $msg
        )
        $(.field(stringify!($key), &$value))*
        .log()
    };
}

/// Convenience macro for error logging
#[macro_export]
macro_rules! log_error {
    ($module:expr, $msg:expr) => {
        $crate::utils::logging::LogEntry::new(
            $crate::utils::logging::LogLevel::Error,
            $module,
            $msg
        ).log()
    };
    ($module:expr, $msg:expr, $($key:ident = $value:expr),* $(,)?) => {
        $crate::utils::logging::LogEntry::new(
            $crate::utils::logging::LogLevel::Error,
            $module,
            $msg
        )
        $(.field(stringify!($key), &$value))*
        .log()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_material_fully_redacted() {
        assert!(redact_if_sensitive("private_key", "deadbeef01").contains("REDACTED"));
        assert!(redact_if_sensitive("mnemonic", "abandon abandon about").contains("REDACTED"));
        assert!(redact_if_sensitive("xprv", "xprv9s21ZrQH").contains("REDACTED"));
    }

    #[test]
    fn test_signature_shows_prefix_only() {
        let sig = "3KbWbyCBzRmNKWDYLsM6hGk4EAvwgRMZsQAWNP4aeKcvJEKqBQUAdXWx";
        let redacted = redact_if_sensitive("signature", sig);
        assert!(redacted.starts_with("3KbWbyCBzRmN"));
        assert!(!redacted.contains(sig));
    }

    #[test]
    fn test_address_partially_redacted() {
        let addr = "mrd1qyqszqgpqyqszqgpqyqszqgpqyqszqgp5hl9xn";
        let redacted = redact_if_sensitive("destination", addr);
        assert!(redacted.starts_with("mrd1qy"));
        assert!(redacted.ends_with("l9xn"));
        assert!(redacted.contains("..."));
    }

    #[test]
    fn test_plain_fields_untouched() {
        assert_eq!(redact_if_sensitive("balance", "12345"), "12345");
        assert_eq!(redact_if_sensitive("index", "7"), "7");
    }

    #[test]
    fn test_entry_redacts_on_field_attach() {
        let entry = LogEntry::new(LogLevel::Info, "recovery", "scan complete")
            .field("funded", "2")
            .field("signing_key", "deadbeefdeadbeef");
        let key_field = entry.fields.iter().find(|(k, _)| *k == "signing_key").unwrap();
        assert!(key_field.1.contains("REDACTED"));
    }
}
