//! Foreground window observation
//!
//! A [`FocusObserver`] reports the pid that owns the window currently
//! receiving input. `None` means "no actionable signal" (desktop focused, a
//! privileged window, no display) and never "block everything".

/// Provider for the pid owning the focused window.
pub trait FocusObserver {
    fn current_focus_pid(&self) -> Option<u32>;
}

/// Observer for platforms without a supported window system.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl FocusObserver for NullObserver {
    fn current_focus_pid(&self) -> Option<u32> {
        None
    }
}

/// Windows implementation using `GetForegroundWindow`.
#[cfg(windows)]
#[derive(Debug, Default, Clone, Copy)]
pub struct ForegroundWindowObserver;

#[cfg(windows)]
impl FocusObserver for ForegroundWindowObserver {
    fn current_focus_pid(&self) -> Option<u32> {
        use windows_sys::Win32::UI::WindowsAndMessaging::{
            GetForegroundWindow, GetWindowThreadProcessId,
        };

        // SAFETY: both calls only read window manager state. A stale handle
        // makes GetWindowThreadProcessId leave the pid at 0.
        let pid = unsafe {
            let hwnd = GetForegroundWindow();
            if hwnd.is_null() {
                return None;
            }
            let mut pid = 0u32;
            GetWindowThreadProcessId(hwnd, &mut pid);
            pid
        };

        (pid != 0).then_some(pid)
    }
}

/// X11 implementation shelling out to `xprop`.
///
/// Reads `_NET_ACTIVE_WINDOW` from the root window, then `_NET_WM_PID` from
/// that window. Wayland sessions without XWayland focus report `None`.
#[cfg(all(unix, not(target_os = "macos")))]
#[derive(Debug, Default, Clone, Copy)]
pub struct XpropObserver;

#[cfg(all(unix, not(target_os = "macos")))]
impl XpropObserver {
    fn xprop(args: &[&str]) -> Option<String> {
        let output = std::process::Command::new("xprop")
            .args(args)
            .stdin(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .output()
            .map_err(|e| tracing::debug!("xprop unavailable: {e}"))
            .ok()?;

        output
            .status
            .success()
            .then(|| String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(all(unix, not(target_os = "macos")))]
impl FocusObserver for XpropObserver {
    fn current_focus_pid(&self) -> Option<u32> {
        let root = Self::xprop(&["-root", "_NET_ACTIVE_WINDOW"])?;
        let window = parse_active_window(&root)?;
        let props = Self::xprop(&["-id", &window, "_NET_WM_PID"])?;
        parse_wm_pid(&props)
    }
}

/// Observer used by the binary on this platform.
#[cfg(windows)]
pub type PlatformObserver = ForegroundWindowObserver;

#[cfg(all(unix, not(target_os = "macos")))]
pub type PlatformObserver = XpropObserver;

#[cfg(not(any(windows, all(unix, not(target_os = "macos")))))]
pub type PlatformObserver = NullObserver;

/// Extracts the window id from `xprop -root _NET_ACTIVE_WINDOW` output.
///
/// Returns `None` for the null window `0x0`.
pub fn parse_active_window(output: &str) -> Option<String> {
    let id = output.split("window id #").nth(1)?.split_whitespace().next()?;
    let hex = id.strip_prefix("0x")?;
    let value = u64::from_str_radix(hex, 16).ok()?;
    (value != 0).then(|| id.to_string())
}

/// Extracts the pid from `xprop -id <window> _NET_WM_PID` output.
pub fn parse_wm_pid(output: &str) -> Option<u32> {
    let (_, value) = output.split_once('=')?;
    value.trim().parse::<u32>().ok().filter(|pid| *pid != 0)
}
