use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::warn;

use crate::event::DaemonEvent;

/// Root configuration structure. Deserialized from %APPDATA%\Altpilot\config.toml.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub characters: Vec<CharacterProfile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            global: GlobalConfig::default(),
            characters: Vec::new(),
        }
    }
}

/// Settings shared by all characters.
#[derive(Debug, Clone, Deserialize)]
pub struct GlobalConfig {
    /// Full path to the game client executable.
    #[serde(default)]
    pub game_path: String,
    /// Where a freshly routed window should land.
    #[serde(default)]
    pub launch_mode: LaunchMode,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            game_path: String::new(),
            launch_mode: LaunchMode::default(),
        }
    }
}

/// Desktop routing mode applied when a window handle becomes available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchMode {
    /// Each character gets (and keeps) its own virtual desktop.
    #[default]
    Separate,
    /// The window is pulled onto whatever desktop is currently visible.
    Current,
}

/// Whether a character currently has a live game process. Never persisted;
/// rebuilt by probing the OS at startup and on every monitor sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeStatus {
    #[default]
    Offline,
    Running,
}

/// One saved character identity.
#[derive(Debug, Clone, Deserialize)]
pub struct CharacterProfile {
    /// Display name shown in the GUI and in action messages.
    pub name: String,
    /// Account login, unique case-insensitively across the profile list.
    /// Embedded in the game client's command line on launch.
    pub login: String,
    /// DPAPI-protected password, base64-encoded. Written by the GUI.
    #[serde(default)]
    pub protected_secret: String,
    #[serde(skip)]
    pub runtime_status: RuntimeStatus,
}

/// Loads the config file at `path`, returning `Config::default()` if the file does not exist.
/// Returns an error if the file exists but cannot be read or parsed.
/// Character names and logins are trimmed on the way in.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    normalize(&mut config);
    Ok(config)
}

fn normalize(config: &mut Config) {
    for character in &mut config.characters {
        character.name = character.name.trim().to_string();
        character.login = character.login.trim().to_string();
    }
}

/// True when `game_path` names an existing `.exe` file.
pub fn is_game_path_valid(game_path: &str) -> bool {
    if game_path.trim().is_empty() {
        return false;
    }
    let path = Path::new(game_path);
    let is_exe = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("exe"));
    is_exe && path.is_file()
}

/// Checks a launch request against the current config before anything is
/// started. Returns a user-facing warning when the request cannot proceed.
pub fn launch_input_error(profile: &CharacterProfile, global: &GlobalConfig) -> Option<String> {
    if !is_game_path_valid(&global.game_path) {
        return Some("Game executable is not selected.".to_string());
    }
    if profile.login.trim().is_empty() {
        return Some("Login is empty.".to_string());
    }
    if profile.protected_secret.trim().is_empty() {
        return Some("Password is missing for this profile.".to_string());
    }
    None
}

/// Spawns a file watcher on the parent directory of `path`.  Whenever the config
/// file is created or modified, reloads it and sends a `ConfigReloaded` event.
pub async fn watch_config(path: PathBuf, tx: mpsc::Sender<DaemonEvent>) {
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
            warn!("failed to create config file watcher: {e}");
            return;
        }
    };

    // Watch the parent directory rather than the file directly so we catch
    // editor-style atomic saves (write-new + rename).
    let watch_dir = match path.parent() {
        Some(d) => d.to_path_buf(),
        None => {
            warn!("config path has no parent directory");
            return;
        }
    };

    if let Err(e) = watcher.watch(&watch_dir, RecursiveMode::NonRecursive) {
        warn!("failed to watch config directory: {e}");
        return;
    }

    while let Some(event) = watch_rx.recv().await {
        let affects_config = event.paths.iter().any(|p| p == path.as_path());
        let is_write = matches!(
            event.kind,
            notify::EventKind::Create(_) | notify::EventKind::Modify(_)
        );

        if affects_config && is_write {
            match load_or_default(&path) {
                Ok(config) => {
                    if tx.send(DaemonEvent::ConfigReloaded(config)).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("failed to reload config: {e}"),
            }
        }
    }
}
