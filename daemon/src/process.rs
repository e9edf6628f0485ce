//! Game process discovery and launching.
//!
//! An already-running instance is recognized by the `user:<login>` token on
//! its command line; a new instance is started with the patcher-bypass
//! argument line the client expects. All OS queries fail closed: a process
//! we cannot inspect is treated as not found / not alive.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use sysinfo::{Pid, ProcessesToUpdate, System};
use thiserror::Error;
use tracing::debug;

use crate::desktop::WindowHandle;
use crate::login;

/// Process name of the game client, as it appears in the OS process list.
pub const GAME_PROCESS_NAME: &str = "elementclient";

/// How often a pending main-window lookup re-polls the process.
const WINDOW_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How long a cached process command line stays valid. Purely an
/// optimization: expiry just forces a re-query.
const COMMAND_LINE_CACHE_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("cannot resolve working directory for '{}'", path.display())]
    WorkingDirectory { path: PathBuf },
    #[error("failed to start game process '{}': {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// OS process seam consumed by the orchestrator. Production impl is
/// [`SystemProcessService`]; tests substitute fakes.
#[allow(async_fn_in_trait)]
pub trait ProcessService {
    /// Finds a live game process whose command line carries the login.
    /// Never errors: any failure to enumerate or inspect reads as "not found".
    fn try_find_running_by_login(&mut self, login: &str) -> Option<u32>;

    /// Starts a new client instance for the login. The secret travels on the
    /// command line, quotes stripped (sanitization, not full escaping).
    fn launch(&mut self, game_path: &Path, login: &str, secret: &str)
        -> Result<u32, LaunchError>;

    /// True unless the OS reports the process absent. Query failures read as
    /// "not alive" — liveness cannot be confirmed, so fail closed.
    fn is_process_alive(&mut self, pid: u32) -> bool;

    /// The process's current main window, if it has one right now.
    fn main_window_handle(&mut self, pid: u32) -> Option<WindowHandle>;

    /// Polls until a main window appears, the process exits, or `timeout`
    /// elapses. Timeout is an expected outcome, not a fault. Dropping the
    /// future cancels the wait.
    async fn wait_for_main_window_handle(
        &mut self,
        pid: u32,
        timeout: Duration,
    ) -> Option<WindowHandle> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if !self.is_process_alive(pid) {
                return None;
            }
            if let Some(handle) = self.main_window_handle(pid) {
                return Some(handle);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(WINDOW_POLL_INTERVAL).await;
        }
    }
}

struct CachedCommandLine {
    text: String,
    expires_at: Instant,
}

/// Production process service backed by `sysinfo` plus a Win32 window probe.
pub struct SystemProcessService {
    system: System,
    process_name: String,
    command_lines: HashMap<u32, CachedCommandLine>,
    /// Last pid that matched each login. Consulted before a full scan and
    /// re-validated (alive + command line still matches) so a stale hit can
    /// never produce a false positive.
    last_pid_by_login: HashMap<String, u32>,
}

impl SystemProcessService {
    pub fn new() -> Self {
        Self::with_process_name(GAME_PROCESS_NAME)
    }

    pub fn with_process_name(process_name: impl Into<String>) -> Self {
        Self {
            system: System::new(),
            process_name: process_name.into(),
            command_lines: HashMap::new(),
            last_pid_by_login: HashMap::new(),
        }
    }

    /// Cached command line for `pid`, re-queried on miss or expiry.
    /// `None` when the OS has no command line for the process.
    fn command_line(&mut self, pid: u32) -> Option<String> {
        let now = Instant::now();
        if let Some(cached) = self.command_lines.get(&pid) {
            if cached.expires_at > now {
                return Some(cached.text.clone());
            }
        }

        let process = self.system.process(Pid::from_u32(pid))?;
        let text = process
            .cmd()
            .iter()
            .map(|arg| arg.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");
        if text.is_empty() {
            self.command_lines.remove(&pid);
            return None;
        }
        self.command_lines.insert(
            pid,
            CachedCommandLine { text: text.clone(), expires_at: now + COMMAND_LINE_CACHE_TTL },
        );
        Some(text)
    }

    /// Validates the cached pid for a login; clears the entry when stale.
    fn validated_cached_pid(&mut self, login: &str) -> Option<u32> {
        let key = login::key(login);
        let pid = *self.last_pid_by_login.get(&key)?;
        if self.is_process_alive(pid) {
            if let Some(command_line) = self.command_line(pid) {
                if command_line_contains_login(&command_line, login) {
                    return Some(pid);
                }
            }
        }
        self.last_pid_by_login.remove(&key);
        None
    }
}

impl Default for SystemProcessService {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessService for SystemProcessService {
    fn try_find_running_by_login(&mut self, login: &str) -> Option<u32> {
        if login.trim().is_empty() {
            return None;
        }

        if let Some(pid) = self.validated_cached_pid(login) {
            return Some(pid);
        }

        self.system.refresh_processes(ProcessesToUpdate::All, true);
        let now = Instant::now();
        self.command_lines.retain(|_, cached| cached.expires_at > now);

        let candidates: Vec<u32> = self
            .system
            .processes()
            .iter()
            .filter(|(_, process)| {
                matches_process_name(&process.name().to_string_lossy(), &self.process_name)
            })
            .map(|(pid, _)| pid.as_u32())
            .collect();

        for pid in candidates {
            let Some(command_line) = self.command_line(pid) else {
                continue;
            };
            if command_line_contains_login(&command_line, login) {
                self.last_pid_by_login.insert(login::key(login), pid);
                return Some(pid);
            }
        }
        None
    }

    fn launch(
        &mut self,
        game_path: &Path,
        login: &str,
        secret: &str,
    ) -> Result<u32, LaunchError> {
        let working_dir = game_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .ok_or_else(|| LaunchError::WorkingDirectory { path: game_path.to_path_buf() })?;

        let child = Command::new(game_path)
            .args(build_launch_args(login, secret))
            .current_dir(working_dir)
            .spawn()
            .map_err(|source| LaunchError::Spawn { path: game_path.to_path_buf(), source })?;

        let pid = child.id();
        debug!(login, pid, "game process started");
        self.last_pid_by_login.insert(login::key(login), pid);
        Ok(pid)
    }

    fn is_process_alive(&mut self, pid: u32) -> bool {
        let target = Pid::from_u32(pid);
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[target]), true);
        self.system.process(target).is_some()
    }

    fn main_window_handle(&mut self, pid: u32) -> Option<WindowHandle> {
        imp::main_window_for_pid(pid)
    }
}

/// True when `command_line` carries `user:<login>` as a complete token.
/// The token must end at end-of-string, whitespace, or a quote so that
/// login "main" does not match "user:main2". Case-insensitive.
fn command_line_contains_login(command_line: &str, login: &str) -> bool {
    let haystack = command_line.to_lowercase();
    let needle = format!("user:{}", login.trim().to_lowercase());
    let hay = haystack.as_bytes();
    let ned = needle.as_bytes();
    if ned.is_empty() || hay.len() < ned.len() {
        return false;
    }

    let mut index = 0;
    while index + ned.len() <= hay.len() {
        if &hay[index..index + ned.len()] == ned {
            let end = index + ned.len();
            let has_boundary =
                end >= hay.len() || hay[end].is_ascii_whitespace() || hay[end] == b'"';
            if has_boundary {
                return true;
            }
        }
        index += 1;
    }
    false
}

/// The argument line the client expects: `startbypatcher user:<l> pwd:<s>`,
/// with quote characters stripped from both interpolants.
fn build_launch_args(login: &str, secret: &str) -> [String; 3] {
    let safe_login: String = login.chars().filter(|&c| c != '"').collect();
    let safe_secret: String = secret.chars().filter(|&c| c != '"').collect();
    [
        "startbypatcher".to_string(),
        format!("user:{safe_login}"),
        format!("pwd:{safe_secret}"),
    ]
}

/// Case-insensitive process-name match, tolerant of a trailing `.exe`.
fn matches_process_name(candidate: &str, target: &str) -> bool {
    let candidate = candidate.to_lowercase();
    let target = target.to_lowercase();
    candidate == target || candidate.strip_suffix(".exe") == Some(target.as_str())
}

// ── Windows implementation ────────────────────────────────────────────────────

#[cfg(windows)]
mod imp {
    use windows::Win32::Foundation::{BOOL, HWND, LPARAM};
    use windows::Win32::UI::WindowsAndMessaging::{
        EnumWindows, GetWindowTextLengthW, GetWindowThreadProcessId, IsWindowVisible,
    };

    use crate::desktop::WindowHandle;

    struct Search {
        pid: u32,
        found: Option<isize>,
    }

    /// Stops at the first visible, titled top-level window owned by the pid —
    /// the same window the OS would report as the process's main window.
    unsafe extern "system" fn enum_proc(hwnd: HWND, lparam: LPARAM) -> BOOL {
        let search = &mut *(lparam.0 as *mut Search);

        let mut owner_pid = 0u32;
        GetWindowThreadProcessId(hwnd, Some(&mut owner_pid));
        if owner_pid == search.pid
            && IsWindowVisible(hwnd).as_bool()
            && GetWindowTextLengthW(hwnd) > 0
        {
            search.found = Some(hwnd.0 as isize);
            return BOOL(0);
        }
        BOOL(1)
    }

    pub fn main_window_for_pid(pid: u32) -> Option<WindowHandle> {
        let mut search = Search { pid, found: None };
        unsafe {
            // EnumWindows reports an error when the callback stops early;
            // that is our success path, so the result is ignored either way.
            let _ = EnumWindows(Some(enum_proc), LPARAM(&mut search as *mut Search as isize));
        }
        search.found.map(WindowHandle::from_raw)
    }
}

#[cfg(not(windows))]
mod imp {
    use crate::desktop::WindowHandle;

    pub fn main_window_for_pid(_pid: u32) -> Option<WindowHandle> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── command_line_contains_login ───────────────────────────────────────────

    #[test]
    fn login_token_matches_at_end_of_string() {
        assert!(command_line_contains_login("client.exe startbypatcher user:main", "main"));
    }

    #[test]
    fn login_token_matches_before_whitespace() {
        assert!(command_line_contains_login(
            "client.exe startbypatcher user:main pwd:x",
            "main"
        ));
    }

    #[test]
    fn login_token_matches_before_quote() {
        assert!(command_line_contains_login("\"client.exe\" \"user:main\"", "main"));
    }

    #[test]
    fn login_token_is_case_insensitive() {
        assert!(command_line_contains_login("client.exe USER:MAIN pwd:x", "Main"));
    }

    #[test]
    fn login_must_not_match_longer_token() {
        assert!(!command_line_contains_login("client.exe user:main2 pwd:x", "main"));
        assert!(!command_line_contains_login("client.exe user:mainchar", "main"));
    }

    #[test]
    fn later_occurrence_still_matches() {
        // First occurrence continues into a longer token; the second is exact.
        assert!(command_line_contains_login("a user:main2 b user:main", "main"));
    }

    #[test]
    fn missing_token_does_not_match() {
        assert!(!command_line_contains_login("client.exe pwd:secret", "main"));
        assert!(!command_line_contains_login("", "main"));
    }

    #[test]
    fn different_login_does_not_match() {
        assert!(!command_line_contains_login("client.exe user:alt pwd:x", "main"));
    }

    // ── build_launch_args ─────────────────────────────────────────────────────

    #[test]
    fn launch_args_have_patcher_bypass_shape() {
        let args = build_launch_args("main", "secret");
        assert_eq!(args, ["startbypatcher", "user:main", "pwd:secret"]);
    }

    #[test]
    fn launch_args_strip_quotes_from_login_and_secret() {
        let args = build_launch_args("ma\"in", "se\"cret\"");
        assert_eq!(args[1], "user:main");
        assert_eq!(args[2], "pwd:secret");
    }

    // ── matches_process_name ──────────────────────────────────────────────────

    #[test]
    fn process_name_matches_with_and_without_exe_suffix() {
        assert!(matches_process_name("elementclient", "elementclient"));
        assert!(matches_process_name("elementclient.exe", "elementclient"));
    }

    #[test]
    fn process_name_match_is_case_insensitive() {
        assert!(matches_process_name("ElementClient.EXE", "elementclient"));
    }

    #[test]
    fn unrelated_process_name_does_not_match() {
        assert!(!matches_process_name("explorer.exe", "elementclient"));
        assert!(!matches_process_name("elementclient_helper.exe", "elementclient"));
    }

    // ── launch ────────────────────────────────────────────────────────────────

    #[test]
    fn launch_without_parent_directory_is_a_working_dir_error() {
        let mut service = SystemProcessService::new();
        let result = service.launch(Path::new("elementclient.exe"), "main", "s");
        assert!(matches!(result, Err(LaunchError::WorkingDirectory { .. })));
    }

    #[test]
    fn launch_of_missing_executable_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("elementclient.exe");
        let mut service = SystemProcessService::new();
        let result = service.launch(&path, "main", "s");
        assert!(matches!(result, Err(LaunchError::Spawn { .. })));
    }

    // ── discovery edge cases ──────────────────────────────────────────────────

    #[test]
    fn blank_login_is_never_found() {
        let mut service = SystemProcessService::new();
        assert_eq!(service.try_find_running_by_login("  "), None);
    }

    #[test]
    fn unknown_login_is_never_found() {
        let mut service = SystemProcessService::new();
        assert_eq!(service.try_find_running_by_login("no-such-login-anywhere"), None);
    }
}
