//! Virtual-desktop routing: per-character desktop bookkeeping plus the OS
//! calls that move, switch, and activate windows.
//!
//! `DesktopOps` is the raw OS seam; `DesktopAssignment` is the pure
//! login→desktop map; `DesktopRouter` combines the two behind a best-effort
//! interface whose operations return booleans instead of erroring, because
//! every underlying shell call can fail independently and the callers'
//! recovery strategy is a fallback ladder, not error propagation.
use std::fmt;
use thiserror::Error;

pub mod assignment;
pub mod router;
#[cfg(windows)]
pub mod win32;

/// Opaque identifier of a top-level window, valid for the window's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(isize);

impl WindowHandle {
    pub fn from_raw(raw: isize) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> isize {
        self.0
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.as_raw())
    }
}

/// Opaque identifier of a virtual desktop (the shell's desktop GUID).
/// Becomes stale if the desktop is destroyed outside this process; the
/// repair path re-derives a fresh one from a window handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DesktopHandle(u128);

impl DesktopHandle {
    pub fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> u128 {
        self.0
    }
}

impl fmt::Display for DesktopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.as_raw())
    }
}

#[derive(Debug, Error)]
pub enum DesktopError {
    /// The shell's virtual-desktop service could not be reached at all.
    #[error("virtual desktop service unavailable: {0}")]
    Unavailable(String),
    /// A specific desktop call failed.
    #[error("desktop operation failed: {0}")]
    Os(String),
}

/// Raw OS desktop primitives. Every call can fail; callers are expected to
/// route around failures rather than propagate them.
pub trait DesktopOps {
    /// Creates a new, empty virtual desktop.
    fn create_desktop(&self) -> Result<DesktopHandle, DesktopError>;

    /// Returns the currently foregrounded desktop.
    fn current_desktop(&self) -> Result<DesktopHandle, DesktopError>;

    /// Moves a window onto the given desktop without switching to it.
    fn move_window_to_desktop(
        &self,
        window: WindowHandle,
        desktop: DesktopHandle,
    ) -> Result<(), DesktopError>;

    /// Makes the given desktop the active one.
    fn switch_to_desktop(&self, desktop: DesktopHandle) -> Result<(), DesktopError>;

    /// Asks the OS which desktop currently hosts `window`. `Ok(None)` means
    /// the window is not on any virtual desktop the shell knows about.
    fn desktop_from_window(
        &self,
        window: WindowHandle,
    ) -> Result<Option<DesktopHandle>, DesktopError>;

    /// Restores the window from minimized state and brings it to the
    /// foreground. Best-effort by contract.
    fn activate_window(&self, window: WindowHandle);
}

/// Stub for platforms without a virtual-desktop shell. Compiles everywhere
/// so the daemon binary builds off Windows; every operation reports the
/// service as unavailable and the router degrades accordingly.
#[cfg(not(windows))]
pub struct UnsupportedDesktopOps;

#[cfg(not(windows))]
impl DesktopOps for UnsupportedDesktopOps {
    fn create_desktop(&self) -> Result<DesktopHandle, DesktopError> {
        Err(DesktopError::Unavailable("not supported on this platform".into()))
    }

    fn current_desktop(&self) -> Result<DesktopHandle, DesktopError> {
        Err(DesktopError::Unavailable("not supported on this platform".into()))
    }

    fn move_window_to_desktop(
        &self,
        _window: WindowHandle,
        _desktop: DesktopHandle,
    ) -> Result<(), DesktopError> {
        Err(DesktopError::Unavailable("not supported on this platform".into()))
    }

    fn switch_to_desktop(&self, _desktop: DesktopHandle) -> Result<(), DesktopError> {
        Err(DesktopError::Unavailable("not supported on this platform".into()))
    }

    fn desktop_from_window(
        &self,
        _window: WindowHandle,
    ) -> Result<Option<DesktopHandle>, DesktopError> {
        Err(DesktopError::Unavailable("not supported on this platform".into()))
    }

    fn activate_window(&self, _window: WindowHandle) {}
}
