//! Window-to-desktop placement with graceful degradation.
//!
//! The router owns the assignment map and performs the actual OS effects.
//! Internally every step is `Result`-based; the public surface is booleans
//! and fire-and-forget calls, because the orchestrator's recovery strategy
//! (the focus ladder) depends on "always a value, never a throw".
use tracing::warn;

use super::assignment::DesktopAssignment;
use super::{DesktopError, DesktopHandle, DesktopOps, WindowHandle};

/// The desktop operations the orchestrator consumes. Kept as a seam so the
/// orchestrator is testable without a shell.
pub trait DesktopService {
    /// Get-or-create the login's desktop, move the window there, switch to
    /// it, and activate the window. Falls back to the current desktop if
    /// any step fails — never leaves the window orphaned on an invisible
    /// desktop.
    fn place_window_on_character_desktop(&mut self, login: &str, window: WindowHandle);

    /// Moves the window to whatever desktop is currently foregrounded, then
    /// activates it. Best-effort.
    fn move_window_to_current_desktop(&mut self, window: WindowHandle);

    /// Discovers the window's current desktop and switches to it.
    fn switch_to_desktop_with_window(&mut self, window: WindowHandle) -> bool;

    /// Switches to the login's *recorded* desktop if one exists.
    fn try_switch_to_character_desktop(&mut self, login: &str, window: WindowHandle) -> bool;

    /// Re-derives the login's desktop from the window itself.
    fn try_repair_character_desktop(&mut self, login: &str, window: WindowHandle) -> bool;

    fn reassign_character_desktop(&mut self, old_login: &str, new_login: &str) -> bool;

    fn unassign_character_desktop(&mut self, login: &str) -> bool;

    /// Restore-from-minimized and bring to foreground.
    fn activate_window(&mut self, window: WindowHandle);
}

pub struct DesktopRouter<D: DesktopOps> {
    ops: D,
    assignment: DesktopAssignment,
}

impl<D: DesktopOps> DesktopRouter<D> {
    pub fn new(ops: D) -> Self {
        Self {
            ops,
            assignment: DesktopAssignment::new(),
        }
    }

    fn get_or_create_desktop(&mut self, login: &str) -> Result<DesktopHandle, DesktopError> {
        if let Some(existing) = self.assignment.try_get(login) {
            return Ok(existing);
        }
        let created = self.ops.create_desktop()?;
        self.assignment
            .assign(login, created)
            .map_err(|e| DesktopError::Os(e.to_string()))?;
        Ok(created)
    }

    fn place_on_assigned_desktop(
        &mut self,
        login: &str,
        window: WindowHandle,
    ) -> Result<(), DesktopError> {
        let desktop = self.get_or_create_desktop(login)?;
        self.ops.move_window_to_desktop(window, desktop)?;
        self.ops.switch_to_desktop(desktop)?;
        Ok(())
    }
}

impl<D: DesktopOps> DesktopService for DesktopRouter<D> {
    fn place_window_on_character_desktop(&mut self, login: &str, window: WindowHandle) {
        match self.place_on_assigned_desktop(login, window) {
            Ok(()) => self.ops.activate_window(window),
            Err(e) => {
                warn!(login, window = %window, "separate-desktop placement failed, falling back to current desktop: {e}");
                self.move_window_to_current_desktop(window);
            }
        }
    }

    fn move_window_to_current_desktop(&mut self, window: WindowHandle) {
        let moved = self
            .ops
            .current_desktop()
            .and_then(|current| self.ops.move_window_to_desktop(window, current));
        if let Err(e) = moved {
            warn!(window = %window, "move to current desktop failed: {e}");
        }
        self.ops.activate_window(window);
    }

    fn switch_to_desktop_with_window(&mut self, window: WindowHandle) -> bool {
        let desktop = match self.ops.desktop_from_window(window) {
            Ok(Some(desktop)) => desktop,
            Ok(None) => return false,
            Err(e) => {
                warn!(window = %window, "desktop discovery failed: {e}");
                return false;
            }
        };
        if let Err(e) = self.ops.switch_to_desktop(desktop) {
            warn!(window = %window, "switch to hosting desktop failed: {e}");
            return false;
        }
        self.ops.activate_window(window);
        true
    }

    fn try_switch_to_character_desktop(&mut self, login: &str, window: WindowHandle) -> bool {
        let Some(desktop) = self.assignment.try_get(login) else {
            return false;
        };
        if let Err(e) = self.ops.switch_to_desktop(desktop) {
            warn!(login, "switch to recorded desktop failed: {e}");
            return false;
        }
        self.ops.activate_window(window);
        true
    }

    fn try_repair_character_desktop(&mut self, login: &str, window: WindowHandle) -> bool {
        match self.assignment.repair_from_window(login, window, &self.ops) {
            Ok(repaired) => repaired.is_some(),
            Err(e) => {
                warn!(login, "desktop repair rejected: {e}");
                false
            }
        }
    }

    fn reassign_character_desktop(&mut self, old_login: &str, new_login: &str) -> bool {
        match self.assignment.reassign(old_login, new_login) {
            Ok(moved) => moved,
            Err(e) => {
                warn!(old_login, new_login, "desktop reassign rejected: {e}");
                false
            }
        }
    }

    fn unassign_character_desktop(&mut self, login: &str) -> bool {
        match self.assignment.unassign(login) {
            Ok(removed) => removed,
            Err(e) => {
                warn!(login, "desktop unassign rejected: {e}");
                false
            }
        }
    }

    fn activate_window(&mut self, window: WindowHandle) {
        self.ops.activate_window(window);
    }
}
