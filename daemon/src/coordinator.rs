//! The launch-or-focus orchestrator.
//!
//! Owns the login→pid runtime registry and drives every decision that
//! involves it: whether to focus an already-running client or start a new
//! one, the periodic liveness sweep, and the bookkeeping reactions to login
//! renames and character removal. All state is in-memory and rebuilt from
//! the OS at startup; the caller serializes access by funnelling monitor
//! ticks and launch requests through one event loop.
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::{CharacterProfile, LaunchMode, RuntimeStatus};
use crate::credential::{CredentialError, CredentialService};
use crate::desktop::router::DesktopService;
use crate::login;
use crate::process::{LaunchError, ProcessService};

/// Window-handle budget when focusing a process that is already running.
const EXISTING_WINDOW_WAIT: Duration = Duration::from_secs(5);
/// Window-handle budget after a fresh launch; the client takes a while to
/// get past its splash screen.
const LAUNCH_WINDOW_WAIT: Duration = Duration::from_secs(30);

/// How one launch-or-focus call was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchAction {
    FocusedExisting,
    LaunchedNew,
    Warning,
}

/// Outcome of a single launch-or-focus call. No lifecycle beyond that call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchActionResult {
    pub action: LaunchAction,
    pub message: String,
    pub process_id: Option<u32>,
}

impl LaunchActionResult {
    fn new(action: LaunchAction, message: impl Into<String>, process_id: Option<u32>) -> Self {
        Self { action, message: message.into(), process_id }
    }
}

/// The only errors a launch-or-focus call surfaces to the caller: an
/// undecryptable saved password, or the OS refusing to start the process.
/// Everything else degrades to a `Warning` result.
#[derive(Debug, Error)]
pub enum LaunchFailure {
    #[error("saved password is invalid: {0}")]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    Launch(#[from] LaunchError),
}

pub struct LauncherCoordinator<P, S, C>
where
    P: ProcessService,
    S: DesktopService,
    C: CredentialService,
{
    /// login key → pid of the instance tracked for that login.
    /// Presence here implies the matching profile's status is Running.
    registry: HashMap<String, u32>,
    process: P,
    desktop: S,
    credentials: C,
}

impl<P, S, C> LauncherCoordinator<P, S, C>
where
    P: ProcessService,
    S: DesktopService,
    C: CredentialService,
{
    pub fn new(process: P, desktop: S, credentials: C) -> Self {
        Self { registry: HashMap::new(), process, desktop, credentials }
    }

    /// Whether a live process is currently tracked for the login.
    pub fn is_tracking(&self, login: &str) -> bool {
        self.registry.contains_key(&login::key(login))
    }

    /// Reconciles in-memory state with whatever the OS already has running.
    /// Called once at startup, before the first monitor sweep.
    pub fn initialize_runtime_state(&mut self, profiles: &mut [CharacterProfile]) {
        for profile in profiles.iter_mut() {
            profile.runtime_status = RuntimeStatus::Offline;

            if profile.login.trim().is_empty() {
                continue;
            }

            if let Some(pid) = self.process.try_find_running_by_login(&profile.login) {
                self.register(&profile.login, pid);
                profile.runtime_status = RuntimeStatus::Running;
            }
        }
        info!("runtime state initialized, {} tracked", self.registry.len());
    }

    /// The core decision procedure: focus the login's running instance if
    /// one exists, otherwise decrypt the secret and start a new one.
    pub async fn launch_or_focus(
        &mut self,
        profile: &mut CharacterProfile,
        game_path: &Path,
        mode: LaunchMode,
    ) -> Result<LaunchActionResult, LaunchFailure> {
        if let Some(pid) = self.process.try_find_running_by_login(&profile.login) {
            self.register(&profile.login, pid);
            profile.runtime_status = RuntimeStatus::Running;

            return Ok(if self.focus_existing(pid, &profile.login, mode).await {
                LaunchActionResult::new(
                    LaunchAction::FocusedExisting,
                    format!("Focused running character '{}'.", profile.name),
                    Some(pid),
                )
            } else {
                LaunchActionResult::new(
                    LaunchAction::Warning,
                    "Running process found, but window handle is unavailable.",
                    None,
                )
            });
        }

        let secret = self.credentials.decrypt(&profile.protected_secret)?;
        let pid = self.process.launch(game_path, &profile.login, &secret)?;
        self.register(&profile.login, pid);
        profile.runtime_status = RuntimeStatus::Running;

        let Some(window) = self
            .process
            .wait_for_main_window_handle(pid, LAUNCH_WINDOW_WAIT)
            .await
        else {
            return Ok(LaunchActionResult::new(
                LaunchAction::Warning,
                "Process started, but main window handle was not detected within timeout.",
                Some(pid),
            ));
        };

        match mode {
            LaunchMode::Separate => {
                self.desktop
                    .place_window_on_character_desktop(&profile.login, window);
            }
            LaunchMode::Current => self.desktop.move_window_to_current_desktop(window),
        }

        Ok(LaunchActionResult::new(
            LaunchAction::LaunchedNew,
            format!("Character '{}' launched.", profile.name),
            Some(pid),
        ))
    }

    /// Focus protocol for a process that is already running. Returns false
    /// only when no window handle could be obtained at all; desktop routing
    /// failures degrade through the ladder instead.
    async fn focus_existing(&mut self, pid: u32, login: &str, mode: LaunchMode) -> bool {
        let window = match self.process.main_window_handle(pid) {
            Some(window) => Some(window),
            None => {
                self.process
                    .wait_for_main_window_handle(pid, EXISTING_WINDOW_WAIT)
                    .await
            }
        };
        let Some(window) = window else {
            return false;
        };

        if mode == LaunchMode::Current {
            self.desktop.move_window_to_current_desktop(window);
            return true;
        }

        // The recorded mapping can be stale (desktop destroyed externally)
        // or absent (process discovered at startup): recorded switch, then
        // repair + retry, then follow the window, then plain activation.
        let mut switched = self.desktop.try_switch_to_character_desktop(login, window);
        if !switched && self.desktop.try_repair_character_desktop(login, window) {
            switched = self.desktop.try_switch_to_character_desktop(login, window);
        }

        let switched = switched || self.desktop.switch_to_desktop_with_window(window);

        if !switched {
            warn!(login, "all desktop switches failed, activating window in place");
            self.desktop.activate_window(window);
        }

        true
    }

    /// The periodic sweep. Returns one human-readable message per actual
    /// offline transition (never one per tick).
    pub fn monitor_running_processes(
        &mut self,
        profiles: &mut [CharacterProfile],
    ) -> Vec<String> {
        let mut updates = Vec::new();
        // Logins whose probe already confirmed "nothing running" this sweep;
        // pass 2 must not probe them again.
        let mut confirmed_offline: HashSet<String> = HashSet::new();

        // Pass 1: tracked logins whose process died between ticks.
        let tracked: Vec<(String, u32)> =
            self.registry.iter().map(|(key, &pid)| (key.clone(), pid)).collect();
        for (key, pid) in tracked {
            if self.process.is_process_alive(pid) {
                continue;
            }
            self.registry.remove(&key);

            // A dead cached pid does not itself prove the login is offline:
            // a different process for the same login may have started in the
            // meantime. First discovered wins.
            if let Some(new_pid) = self.process.try_find_running_by_login(&key) {
                self.registry.insert(key.clone(), new_pid);
                set_status_by_login(profiles, &key, RuntimeStatus::Running);
                continue;
            }

            self.desktop.unassign_character_desktop(&key);
            let display =
                set_status_by_login(profiles, &key, RuntimeStatus::Offline).unwrap_or(key.clone());
            updates.push(format!("{display} switched to Offline."));
            confirmed_offline.insert(key);
        }

        // Pass 2: untracked profiles, probed at most once per sweep — picks
        // up instances started outside this tool.
        for profile in profiles.iter_mut() {
            let key = login::key(&profile.login);
            if key.is_empty()
                || self.registry.contains_key(&key)
                || confirmed_offline.contains(&key)
            {
                continue;
            }

            match self.process.try_find_running_by_login(&profile.login) {
                Some(pid) => {
                    self.registry.insert(key, pid);
                    profile.runtime_status = RuntimeStatus::Running;
                }
                None => {
                    if profile.runtime_status == RuntimeStatus::Running {
                        // The probe just confirmed nothing runs under this
                        // login; release its desktop without re-probing.
                        self.desktop.unassign_character_desktop(&profile.login);
                    }
                    profile.runtime_status = RuntimeStatus::Offline;
                }
            }
        }

        updates
    }

    /// Reacts to a login rename: the old login's runtime entry is dropped
    /// and its desktop either follows the rename or is released. A desktop
    /// is never left assigned under a login that no longer exists.
    pub fn handle_login_change(&mut self, old_login: &str, new_login: &str) {
        if old_login.trim().is_empty() {
            return;
        }

        self.registry.remove(&login::key(old_login));

        if new_login.trim().is_empty()
            || !self.desktop.reassign_character_desktop(old_login, new_login)
        {
            self.desktop.unassign_character_desktop(old_login);
        }
    }

    /// Drops the login's runtime entry; releases its desktop when forced or
    /// when a probe confirms nothing is running under it. Used on character
    /// deletion.
    pub fn cleanup_runtime_mappings(&mut self, login: &str, force_desktop_unassign: bool) {
        if login.trim().is_empty() {
            return;
        }

        self.registry.remove(&login::key(login));
        if force_desktop_unassign || self.process.try_find_running_by_login(login).is_none() {
            self.desktop.unassign_character_desktop(login);
        }
    }

    /// Garbage-collects runtime/desktop mappings for logins that are no
    /// longer in the caller's known set (deleted characters).
    pub fn prune_unknown_logins<I, T>(&mut self, known_logins: I)
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let known: HashSet<String> = known_logins
            .into_iter()
            .filter(|l| !l.as_ref().trim().is_empty())
            .map(|l| login::key(l.as_ref()))
            .collect();

        let stale: Vec<String> =
            self.registry.keys().filter(|key| !known.contains(*key)).cloned().collect();
        for key in stale {
            self.cleanup_runtime_mappings(&key, true);
        }
    }

    /// Applies a reloaded profile list: logins renamed under an unchanged
    /// character name migrate their mappings, vanished logins are pruned,
    /// and the returned profiles carry statuses consistent with the
    /// registry. The caller swaps its profile list for the returned one.
    pub fn reconcile_profiles(
        &mut self,
        current: &[CharacterProfile],
        incoming: &[CharacterProfile],
    ) -> Vec<CharacterProfile> {
        for updated in incoming {
            let renamed_from = current.iter().find(|existing| {
                existing.name == updated.name
                    && !existing.login.trim().is_empty()
                    && !login::eq(&existing.login, &updated.login)
            });
            if let Some(existing) = renamed_from {
                self.handle_login_change(&existing.login, &updated.login);
            }
        }

        self.prune_unknown_logins(incoming.iter().map(|p| p.login.as_str()));

        incoming
            .iter()
            .map(|profile| {
                let mut profile = profile.clone();
                profile.runtime_status = if self.is_tracking(&profile.login) {
                    RuntimeStatus::Running
                } else {
                    RuntimeStatus::Offline
                };
                profile
            })
            .collect()
    }

    fn register(&mut self, login: &str, pid: u32) {
        self.registry.insert(login::key(login), pid);
    }
}

fn set_status_by_login(
    profiles: &mut [CharacterProfile],
    login: &str,
    status: RuntimeStatus,
) -> Option<String> {
    let profile = profiles.iter_mut().find(|p| login::eq(&p.login, login))?;
    profile.runtime_status = status;
    Some(profile.login.clone())
}
