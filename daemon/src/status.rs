use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

use crate::config::{CharacterProfile, RuntimeStatus};

/// Current operational state of the daemon.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "lowercase")]
pub enum DaemonState {
    /// The liveness sweep is running on its normal cadence.
    Monitoring,
    /// A launch-or-focus request is being processed (may block on the
    /// launched client's window for up to 30 s).
    Launching,
    /// The daemon has shut down; statuses in this file are final.
    Stopped,
}

/// Per-character runtime status as last observed by the daemon.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CharacterStatus {
    pub name: String,
    pub login: String,
    pub status: RuntimeStatus,
}

/// Runtime status written by the daemon to %APPDATA%\Altpilot\status.toml.
/// The GUI reads this file (read-only) to display daemon and character state.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DaemonStatus {
    /// Daemon binary version (set from Cargo.toml at compile time).
    pub version: String,
    /// Current operational state.
    pub state: DaemonState,
    /// Human-readable outcome of the most recent launch/focus action or
    /// offline transition, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_action: Option<String>,
    /// Human-readable error message if the daemon encountered a non-fatal error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// RFC 3339 timestamp of the last write.
    #[serde(default)]
    pub updated_at: String,
    /// One entry per configured character. Kept last so the TOML array of
    /// tables serializes after the scalar fields.
    #[serde(default)]
    pub characters: Vec<CharacterStatus>,
}

impl DaemonStatus {
    /// Constructs the initial status on daemon startup.
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: DaemonState::Monitoring,
            characters: Vec::new(),
            last_action: None,
            error: None,
            updated_at: String::new(),
        }
    }

    /// Mirrors the profile list into the status snapshot. Returns true when
    /// anything actually changed, so callers can skip redundant writes.
    pub fn sync_characters(&mut self, profiles: &[CharacterProfile]) -> bool {
        let next: Vec<CharacterStatus> = profiles
            .iter()
            .map(|p| CharacterStatus {
                name: p.name.clone(),
                login: p.login.clone(),
                status: p.runtime_status,
            })
            .collect();
        let changed = next != self.characters;
        self.characters = next;
        changed
    }
}

/// Stamps `updated_at`, serializes `status` to TOML and writes it to `path`.
/// Creates the parent directory if it does not exist.
/// Logs errors rather than panicking — a status write failure should never
/// crash the daemon.
pub fn write_status(path: &Path, status: &mut DaemonStatus) {
    status.updated_at = chrono::Local::now().to_rfc3339();
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!("failed to create directory {}: {e}", parent.display());
            return;
        }
    }
    match toml::to_string_pretty(status) {
        Ok(content) => {
            if let Err(e) = std::fs::write(path, content) {
                warn!("failed to write status file: {e}");
            }
        }
        Err(e) => warn!("failed to serialize status: {e}"),
    }
}
