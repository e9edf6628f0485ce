//! Pure login→desktop bookkeeping.
//!
//! No OS side effects except [`DesktopAssignment::repair_from_window`],
//! which asks the OS which desktop hosts a window and records the answer.
//! Entries survive process death on purpose: relaunching the same login
//! reuses its desktop until an explicit unassign, rename, or repair.
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

use super::{DesktopHandle, DesktopOps, WindowHandle};
use crate::login;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssignmentError {
    /// A blank login reached a mutating operation — a caller bug, reported
    /// distinctly from OS failures.
    #[error("login is required for desktop mapping")]
    BlankLogin,
}

#[derive(Debug, Default)]
pub struct DesktopAssignment {
    desktop_by_login: HashMap<String, DesktopHandle>,
}

impl DesktopAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `desktop` as the login's assignment, replacing any prior entry.
    pub fn assign(&mut self, login: &str, desktop: DesktopHandle) -> Result<(), AssignmentError> {
        let key = require_login(login)?;
        self.desktop_by_login.insert(key, desktop);
        Ok(())
    }

    /// Looks up the login's recorded desktop. Blank logins read as "not found".
    pub fn try_get(&self, login: &str) -> Option<DesktopHandle> {
        let key = login::key(login);
        if key.is_empty() {
            return None;
        }
        self.desktop_by_login.get(&key).copied()
    }

    /// Moves the entry under a new login. Returns false when the old login
    /// had no entry. Renaming a login to itself (case changes included)
    /// reports whether an entry exists.
    pub fn reassign(&mut self, old_login: &str, new_login: &str) -> Result<bool, AssignmentError> {
        let old_key = require_login(old_login)?;
        let new_key = require_login(new_login)?;

        if old_key == new_key {
            return Ok(self.desktop_by_login.contains_key(&old_key));
        }

        match self.desktop_by_login.remove(&old_key) {
            Some(desktop) => {
                self.desktop_by_login.insert(new_key, desktop);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drops the login's entry; returns whether one existed.
    pub fn unassign(&mut self, login: &str) -> Result<bool, AssignmentError> {
        let key = require_login(login)?;
        Ok(self.desktop_by_login.remove(&key).is_some())
    }

    pub fn unassign_all(&mut self) {
        self.desktop_by_login.clear();
    }

    /// Re-derives the login's desktop from a live window and records it,
    /// overwriting any stale entry. OS failures are absorbed as "no desktop
    /// found" since the caller's next rung handles that case anyway.
    pub fn repair_from_window(
        &mut self,
        login: &str,
        window: WindowHandle,
        ops: &impl DesktopOps,
    ) -> Result<Option<DesktopHandle>, AssignmentError> {
        let key = require_login(login)?;

        let desktop = match ops.desktop_from_window(window) {
            Ok(Some(desktop)) => desktop,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!(login, window = %window, "desktop repair failed: {e}");
                return Ok(None);
            }
        };

        self.desktop_by_login.insert(key, desktop);
        Ok(Some(desktop))
    }
}

fn require_login(login: &str) -> Result<String, AssignmentError> {
    let key = login::key(login);
    if key.is_empty() {
        return Err(AssignmentError::BlankLogin);
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desktop::DesktopError;
    use std::cell::Cell;

    fn desktop(raw: u128) -> DesktopHandle {
        DesktopHandle::from_raw(raw)
    }

    fn window(raw: isize) -> WindowHandle {
        WindowHandle::from_raw(raw)
    }

    /// Minimal ops fake for the repair path; everything except
    /// `desktop_from_window` is unreachable from this module.
    struct FakeOps {
        from_window: Result<Option<DesktopHandle>, DesktopError>,
        queries: Cell<usize>,
    }

    impl FakeOps {
        fn returning(from_window: Result<Option<DesktopHandle>, DesktopError>) -> Self {
            Self { from_window, queries: Cell::new(0) }
        }
    }

    impl DesktopOps for FakeOps {
        fn create_desktop(&self) -> Result<DesktopHandle, DesktopError> {
            unreachable!()
        }
        fn current_desktop(&self) -> Result<DesktopHandle, DesktopError> {
            unreachable!()
        }
        fn move_window_to_desktop(
            &self,
            _: WindowHandle,
            _: DesktopHandle,
        ) -> Result<(), DesktopError> {
            unreachable!()
        }
        fn switch_to_desktop(&self, _: DesktopHandle) -> Result<(), DesktopError> {
            unreachable!()
        }
        fn desktop_from_window(
            &self,
            _: WindowHandle,
        ) -> Result<Option<DesktopHandle>, DesktopError> {
            self.queries.set(self.queries.get() + 1);
            match &self.from_window {
                Ok(d) => Ok(*d),
                Err(DesktopError::Os(m)) => Err(DesktopError::Os(m.clone())),
                Err(DesktopError::Unavailable(m)) => Err(DesktopError::Unavailable(m.clone())),
            }
        }
        fn activate_window(&self, _: WindowHandle) {}
    }

    // ── assign / try_get ──────────────────────────────────────────────────────

    #[test]
    fn assign_then_get() {
        let mut map = DesktopAssignment::new();
        map.assign("main", desktop(1)).unwrap();
        assert_eq!(map.try_get("main"), Some(desktop(1)));
    }

    #[test]
    fn assign_overwrites_existing_entry() {
        let mut map = DesktopAssignment::new();
        map.assign("main", desktop(1)).unwrap();
        map.assign("main", desktop(2)).unwrap();
        assert_eq!(map.try_get("main"), Some(desktop(2)));
    }

    #[test]
    fn lookups_are_case_insensitive() {
        let mut map = DesktopAssignment::new();
        map.assign("Main", desktop(1)).unwrap();
        assert_eq!(map.try_get("MAIN"), Some(desktop(1)));
        assert_eq!(map.try_get("  main "), Some(desktop(1)));
    }

    #[test]
    fn assign_blank_login_is_rejected() {
        let mut map = DesktopAssignment::new();
        assert_eq!(map.assign("  ", desktop(1)), Err(AssignmentError::BlankLogin));
    }

    #[test]
    fn try_get_blank_login_reads_as_not_found() {
        let map = DesktopAssignment::new();
        assert_eq!(map.try_get(""), None);
        assert_eq!(map.try_get("   "), None);
    }

    #[test]
    fn try_get_unknown_login_is_none() {
        let map = DesktopAssignment::new();
        assert_eq!(map.try_get("main"), None);
    }

    // ── reassign ──────────────────────────────────────────────────────────────

    #[test]
    fn reassign_moves_entry_and_old_key_reads_not_found() {
        let mut map = DesktopAssignment::new();
        map.assign("alpha", desktop(7)).unwrap();

        assert!(map.reassign("alpha", "beta").unwrap());
        assert_eq!(map.try_get("beta"), Some(desktop(7)));
        assert_eq!(map.try_get("alpha"), None);
    }

    #[test]
    fn reassign_without_entry_returns_false() {
        let mut map = DesktopAssignment::new();
        assert!(!map.reassign("alpha", "beta").unwrap());
    }

    #[test]
    fn reassign_to_same_login_reports_entry_presence() {
        let mut map = DesktopAssignment::new();
        assert!(!map.reassign("main", "MAIN").unwrap());

        map.assign("main", desktop(1)).unwrap();
        assert!(map.reassign("main", "MAIN").unwrap());
        assert_eq!(map.try_get("main"), Some(desktop(1)));
    }

    #[test]
    fn reassign_blank_login_is_rejected() {
        let mut map = DesktopAssignment::new();
        assert_eq!(map.reassign("", "beta"), Err(AssignmentError::BlankLogin));
        assert_eq!(map.reassign("alpha", " "), Err(AssignmentError::BlankLogin));
    }

    // ── unassign ──────────────────────────────────────────────────────────────

    #[test]
    fn unassign_removes_entry() {
        let mut map = DesktopAssignment::new();
        map.assign("main", desktop(1)).unwrap();
        assert!(map.unassign("main").unwrap());
        assert_eq!(map.try_get("main"), None);
    }

    #[test]
    fn unassign_unknown_login_returns_false() {
        let mut map = DesktopAssignment::new();
        assert!(!map.unassign("main").unwrap());
    }

    #[test]
    fn unassign_blank_login_is_rejected() {
        let mut map = DesktopAssignment::new();
        assert_eq!(map.unassign(""), Err(AssignmentError::BlankLogin));
    }

    #[test]
    fn unassign_all_clears_everything() {
        let mut map = DesktopAssignment::new();
        map.assign("a", desktop(1)).unwrap();
        map.assign("b", desktop(2)).unwrap();
        map.unassign_all();
        assert_eq!(map.try_get("a"), None);
        assert_eq!(map.try_get("b"), None);
    }

    // ── repair_from_window ────────────────────────────────────────────────────

    #[test]
    fn repair_records_discovered_desktop() {
        let mut map = DesktopAssignment::new();
        map.assign("main", desktop(1)).unwrap();

        let ops = FakeOps::returning(Ok(Some(desktop(9))));
        let repaired = map.repair_from_window("main", window(42), &ops).unwrap();

        assert_eq!(repaired, Some(desktop(9)));
        assert_eq!(map.try_get("main"), Some(desktop(9)));
        assert_eq!(ops.queries.get(), 1);
    }

    #[test]
    fn repair_with_no_hosting_desktop_leaves_map_unchanged() {
        let mut map = DesktopAssignment::new();
        map.assign("main", desktop(1)).unwrap();

        let ops = FakeOps::returning(Ok(None));
        assert_eq!(map.repair_from_window("main", window(42), &ops).unwrap(), None);
        assert_eq!(map.try_get("main"), Some(desktop(1)));
    }

    #[test]
    fn repair_absorbs_os_failure_as_not_found() {
        let mut map = DesktopAssignment::new();
        let ops = FakeOps::returning(Err(DesktopError::Os("gone".into())));
        assert_eq!(map.repair_from_window("main", window(42), &ops).unwrap(), None);
        assert_eq!(map.try_get("main"), None);
    }

    #[test]
    fn repair_blank_login_is_rejected() {
        let mut map = DesktopAssignment::new();
        let ops = FakeOps::returning(Ok(Some(desktop(9))));
        assert_eq!(
            map.repair_from_window(" ", window(42), &ops),
            Err(AssignmentError::BlankLogin)
        );
    }
}
