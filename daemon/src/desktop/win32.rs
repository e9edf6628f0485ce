//! Windows virtual-desktop primitives.
//!
//! Window placement and desktop discovery use the documented
//! `IVirtualDesktopManager` shell object. Creating, enumerating-by-id, and
//! switching desktops have no documented API; those go through the
//! immersive shell's internal `IVirtualDesktopManagerInternal` service,
//! declared below with the Windows 10 interface GUIDs. The internal surface
//! is not contractual and can shift between Windows builds, so every call
//! here degrades to a [`DesktopError`] instead of panicking.
//!
//! COM is initialized lazily per calling thread; the daemon only touches
//! this module from its event-loop task.
use std::ffi::c_void;

use windows::core::{interface, IUnknown, Interface, GUID, HRESULT};
use windows::Win32::Foundation::HWND;
use windows::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, CLSCTX_ALL, CLSCTX_LOCAL_SERVER, COINIT_APARTMENTTHREADED,
    IServiceProvider,
};
use windows::Win32::UI::Shell::{IVirtualDesktopManager, VirtualDesktopManager};
use windows::Win32::UI::WindowsAndMessaging::{SetForegroundWindow, ShowWindow, SW_RESTORE};

use super::{DesktopError, DesktopHandle, DesktopOps, WindowHandle};

/// The immersive shell broker that exposes desktop services.
const CLSID_IMMERSIVE_SHELL: GUID = GUID::from_u128(0xc2f03a33_21f5_47fa_b4bb_156362a2f239);
/// Service id of the internal desktop manager on the immersive shell.
const SID_VIRTUAL_DESKTOP_MANAGER_INTERNAL: GUID =
    GUID::from_u128(0xc5e0cdca_7b6e_41b2_9fc4_d93975cc467b);

// Internal shell interfaces, Windows 10 layout. Slots we never call are
// declared with raw pointers so no extra interface types are needed; they
// exist only to keep the vtable offsets of the calls we do make correct.

#[interface("ff72ffdd-be7e-43fc-9c03-ad81681e88e4")]
unsafe trait IVirtualDesktop: IUnknown {
    fn IsViewVisible(&self, view: *mut c_void, visible: *mut i32) -> HRESULT;
    fn GetID(&self, id: *mut GUID) -> HRESULT;
}

#[interface("f31574d6-b682-4cdc-bd56-1827860abec6")]
unsafe trait IVirtualDesktopManagerInternal: IUnknown {
    fn GetCount(&self, count: *mut i32) -> HRESULT;
    fn MoveViewToDesktop(&self, view: *mut c_void, desktop: *mut c_void) -> HRESULT;
    fn CanViewMoveDesktops(&self, view: *mut c_void, can_move: *mut i32) -> HRESULT;
    fn GetCurrentDesktop(&self, desktop: *mut *mut c_void) -> HRESULT;
    fn GetDesktops(&self, desktops: *mut *mut c_void) -> HRESULT;
    fn GetAdjacentDesktop(
        &self,
        reference: *mut c_void,
        direction: u32,
        desktop: *mut *mut c_void,
    ) -> HRESULT;
    fn SwitchDesktop(&self, desktop: *mut c_void) -> HRESULT;
    fn CreateDesktopW(&self, desktop: *mut *mut c_void) -> HRESULT;
    fn RemoveDesktop(&self, remove: *mut c_void, fallback: *mut c_void) -> HRESULT;
    fn FindDesktop(&self, id: *const GUID, desktop: *mut *mut c_void) -> HRESULT;
}

/// Production [`DesktopOps`] backed by the Windows shell.
pub struct ShellDesktopOps;

impl ShellDesktopOps {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ShellDesktopOps {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_com_initialized() {
    thread_local! {
        static COM_INIT: () = {
            // RPC_E_CHANGED_MODE just means the thread already runs COM in a
            // different apartment, which is fine for our calls.
            let _ = unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) };
        };
    }
    COM_INIT.with(|_| {});
}

fn desktop_manager() -> Result<IVirtualDesktopManager, DesktopError> {
    ensure_com_initialized();
    unsafe { CoCreateInstance(&VirtualDesktopManager, None, CLSCTX_ALL) }
        .map_err(|e| DesktopError::Unavailable(e.to_string()))
}

fn internal_manager() -> Result<IVirtualDesktopManagerInternal, DesktopError> {
    ensure_com_initialized();
    let shell: IUnknown =
        unsafe { CoCreateInstance(&CLSID_IMMERSIVE_SHELL, None, CLSCTX_LOCAL_SERVER) }
            .map_err(|e| DesktopError::Unavailable(e.to_string()))?;
    let provider: IServiceProvider = shell
        .cast()
        .map_err(|e| DesktopError::Unavailable(e.to_string()))?;
    unsafe { provider.QueryService(&SID_VIRTUAL_DESKTOP_MANAGER_INTERNAL) }
        .map_err(|e| DesktopError::Unavailable(e.to_string()))
}

/// Reads the GUID out of a raw `IVirtualDesktop` pointer, taking ownership.
unsafe fn desktop_id_from_raw(raw: *mut c_void) -> Result<DesktopHandle, DesktopError> {
    if raw.is_null() {
        return Err(DesktopError::Os("shell returned a null desktop".into()));
    }
    let desktop = IVirtualDesktop::from_raw(raw);
    let mut id = GUID::zeroed();
    desktop
        .GetID(&mut id)
        .ok()
        .map_err(|e| DesktopError::Os(e.to_string()))?;
    Ok(DesktopHandle::from_raw(id.to_u128()))
}

unsafe fn find_desktop(
    internal: &IVirtualDesktopManagerInternal,
    handle: DesktopHandle,
) -> Result<IVirtualDesktop, DesktopError> {
    let id = GUID::from_u128(handle.as_raw());
    let mut raw: *mut c_void = std::ptr::null_mut();
    internal
        .FindDesktop(&id, &mut raw)
        .ok()
        .map_err(|e| DesktopError::Os(e.to_string()))?;
    if raw.is_null() {
        return Err(DesktopError::Os(format!("desktop {handle} no longer exists")));
    }
    Ok(IVirtualDesktop::from_raw(raw))
}

impl DesktopOps for ShellDesktopOps {
    fn create_desktop(&self) -> Result<DesktopHandle, DesktopError> {
        let internal = internal_manager()?;
        unsafe {
            let mut raw: *mut c_void = std::ptr::null_mut();
            internal
                .CreateDesktopW(&mut raw)
                .ok()
                .map_err(|e| DesktopError::Os(e.to_string()))?;
            desktop_id_from_raw(raw)
        }
    }

    fn current_desktop(&self) -> Result<DesktopHandle, DesktopError> {
        let internal = internal_manager()?;
        unsafe {
            let mut raw: *mut c_void = std::ptr::null_mut();
            internal
                .GetCurrentDesktop(&mut raw)
                .ok()
                .map_err(|e| DesktopError::Os(e.to_string()))?;
            desktop_id_from_raw(raw)
        }
    }

    fn move_window_to_desktop(
        &self,
        window: WindowHandle,
        desktop: DesktopHandle,
    ) -> Result<(), DesktopError> {
        let manager = desktop_manager()?;
        let id = GUID::from_u128(desktop.as_raw());
        unsafe { manager.MoveWindowToDesktop(HWND(window.as_raw() as _), &id) }
            .map_err(|e| DesktopError::Os(e.to_string()))
    }

    fn switch_to_desktop(&self, desktop: DesktopHandle) -> Result<(), DesktopError> {
        let internal = internal_manager()?;
        unsafe {
            let target = find_desktop(&internal, desktop)?;
            internal
                .SwitchDesktop(target.as_raw())
                .ok()
                .map_err(|e| DesktopError::Os(e.to_string()))
        }
    }

    fn desktop_from_window(
        &self,
        window: WindowHandle,
    ) -> Result<Option<DesktopHandle>, DesktopError> {
        let manager = desktop_manager()?;
        let id = unsafe { manager.GetWindowDesktopId(HWND(window.as_raw() as _)) }
            .map_err(|e| DesktopError::Os(e.to_string()))?;
        if id == GUID::zeroed() {
            return Ok(None);
        }
        Ok(Some(DesktopHandle::from_raw(id.to_u128())))
    }

    fn activate_window(&self, window: WindowHandle) {
        unsafe {
            let hwnd = HWND(window.as_raw() as _);
            let _ = ShowWindow(hwnd, SW_RESTORE);
            let _ = SetForegroundWindow(hwnd);
        }
    }
}
