//! Foreground application probes. [GenericForegroundProbe] picks the backend compiled in
//! through the `x11` or `win` feature.

#[cfg(feature = "win")]
pub mod win;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "win")]
extern crate windows;

#[cfg(feature = "x11")]
extern crate xcb;

use std::{path::Path, sync::Arc};

use anyhow::Result;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

/// Identity of the application holding input focus. Only the application is tracked, never
/// the window inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppIdentity {
    /// Stable key of the application, e.g. `com.microsoft.VSCode` or `/usr/bin/nvim`.
    pub bundle_id: Arc<str>,
    pub display_name: Arc<str>,
}

impl AppIdentity {
    pub fn new(bundle_id: impl Into<Arc<str>>, display_name: impl Into<Arc<str>>) -> Self {
        Self {
            bundle_id: bundle_id.into(),
            display_name: display_name.into(),
        }
    }

    /// Builds an identity from an executable path, using the file name as display name.
    pub fn from_executable(path: &str) -> Self {
        let display_name = Path::new(path)
            .file_name()
            .map(|v| v.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string());
        Self::new(path, display_name)
    }
}

/// Contract every platform backend implements. Failures are expected (permission denied,
/// nothing focused) and are never fatal to a tracking session.
#[cfg_attr(test, automock)]
pub trait ForegroundProbe: Send {
    fn probe(&mut self) -> Result<AppIdentity>;
}

/// Serves as a cross-compatible [ForegroundProbe] implementation.
pub struct GenericForegroundProbe {
    inner: Box<dyn ForegroundProbe>,
}

impl GenericForegroundProbe {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                use win::WindowsProbe;
                Ok(Self {
                    inner: Box::new(WindowsProbe::new()),
                })
            }
            else if #[cfg(feature = "x11")] {
                use x11::X11Probe;
                Ok(Self {
                    inner: Box::new(X11Probe::new()?),
                })
            }
            else {
                Err(anyhow::anyhow!(
                    "No foreground probe was compiled in, enable the `x11` or `win` feature"
                ))
            }
        }
    }
}

impl ForegroundProbe for GenericForegroundProbe {
    fn probe(&mut self) -> Result<AppIdentity> {
        self.inner.probe()
    }
}
