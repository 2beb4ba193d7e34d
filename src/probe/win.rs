use anyhow::{Result, anyhow};
use tracing::error;
use windows::{
    Win32::{
        Foundation::{BOOL, CloseHandle, HANDLE},
        System::Threading::{
            OpenProcess, PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION,
            QueryFullProcessImageNameW,
        },
        UI::WindowsAndMessaging::{GetForegroundWindow, GetWindowThreadProcessId},
    },
    core::PWSTR,
};

use super::{AppIdentity, ForegroundProbe};

#[tracing::instrument]
fn foreground_executable() -> Result<String> {
    let window = unsafe { GetForegroundWindow() };
    if window.is_invalid() {
        return Err(anyhow!("No focused window"));
    }

    let mut id = 0u32;
    unsafe { GetWindowThreadProcessId(window, Some(&mut id)) };
    if id == 0 {
        let cause = windows::core::Error::from_win32();
        return Err(anyhow!("Failed to resolve the focused window's process: {cause}"));
    }

    let process_handle =
        unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, BOOL::from(false), id) }
            .inspect_err(|e| error!("Failed to open process {id} {e:?}"))?;

    let mut text: [u16; 4096] = [0; 4096];
    let path = unsafe { process_image_path(process_handle, &mut text) };

    unsafe { CloseHandle(process_handle) }
        .inspect_err(|e| error!("Failed to close handle {e:?}"))?;
    path
}

unsafe fn process_image_path(process_handle: HANDLE, text: &mut [u16]) -> Result<String> {
    unsafe {
        let mut length = text.len() as u32;
        QueryFullProcessImageNameW(
            process_handle,
            PROCESS_NAME_WIN32,
            PWSTR(text.as_mut_ptr()),
            &mut length,
        )?;
        Ok(String::from_utf16_lossy(&text[..length as usize]))
    }
}

#[derive(Default)]
pub struct WindowsProbe {}

impl WindowsProbe {
    pub fn new() -> Self {
        Self {}
    }
}

impl ForegroundProbe for WindowsProbe {
    fn probe(&mut self) -> Result<AppIdentity> {
        foreground_executable()
            .map(|path| AppIdentity::from_executable(&path))
            .inspect_err(|e| error!("Failed to probe foreground application {e:?}"))
    }
}
