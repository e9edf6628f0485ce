//! GUI→daemon launch requests.
//!
//! The GUI asks for an action by writing %APPDATA%\Altpilot\request.toml;
//! the daemon watches that file the same way it watches the config file and
//! runs the launch-or-focus procedure for the named character.
use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::warn;

use crate::config::LaunchMode;
use crate::event::DaemonEvent;

/// One launch-or-focus request.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LaunchRequest {
    /// Character name as it appears in the config's profile list.
    pub character: String,
    /// Overrides the configured launch mode for this action only.
    #[serde(default)]
    pub mode: Option<LaunchMode>,
}

/// Parses the request file at `path`.
pub fn load_request(path: &Path) -> Result<LaunchRequest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read request file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse request file: {}", path.display()))
}

/// Spawns a file watcher on the parent directory of `path`.  Whenever the
/// request file is created or modified, parses it and sends a
/// `LaunchRequested` event. Malformed requests are logged and dropped.
pub async fn watch_requests(path: PathBuf, tx: mpsc::Sender<DaemonEvent>) {
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Event>(16);

    let mut watcher = match RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = watch_tx.blocking_send(event);
            }
        },
        NotifyConfig::default(),
    ) {
        Ok(w) => w,
        Err(e) => {
            warn!("failed to create request file watcher: {e}");
            return;
        }
    };

    // Parent directory, not the file itself, to catch atomic saves.
    let watch_dir = match path.parent() {
        Some(d) => d.to_path_buf(),
        None => {
            warn!("request path has no parent directory");
            return;
        }
    };

    if let Err(e) = watcher.watch(&watch_dir, RecursiveMode::NonRecursive) {
        warn!("failed to watch request directory: {e}");
        return;
    }

    while let Some(event) = watch_rx.recv().await {
        let affects_request = event.paths.iter().any(|p| p == path.as_path());
        let is_write = matches!(
            event.kind,
            notify::EventKind::Create(_) | notify::EventKind::Modify(_)
        );

        if affects_request && is_write {
            match load_request(&path) {
                Ok(request) => {
                    if tx.send(DaemonEvent::LaunchRequested(request)).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("ignoring malformed launch request: {e:#}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_request_parses_character_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("request.toml");
        std::fs::write(&path, "character = \"Main\"\n").unwrap();

        let request = load_request(&path).unwrap();
        assert_eq!(request.character, "Main");
        assert_eq!(request.mode, None);
    }

    #[test]
    fn load_request_parses_mode_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("request.toml");
        std::fs::write(&path, "character = \"Main\"\nmode = \"current\"\n").unwrap();

        let request = load_request(&path).unwrap();
        assert_eq!(request.mode, Some(LaunchMode::Current));
    }

    #[test]
    fn load_request_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_request(&dir.path().join("request.toml")).is_err());
    }

    #[test]
    fn load_request_without_character_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("request.toml");
        std::fs::write(&path, "mode = \"separate\"\n").unwrap();
        assert!(load_request(&path).is_err());
    }

    #[test]
    fn load_request_unknown_mode_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("request.toml");
        std::fs::write(&path, "character = \"Main\"\nmode = \"sideways\"\n").unwrap();
        assert!(load_request(&path).is_err());
    }
}
