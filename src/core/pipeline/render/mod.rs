//! Page rendering collaborators.
//!
//! A [`RenderProvider`] opens a [`RenderSession`] for one URL and device. Sessions load
//! the page, hand back its markup and captured stylesheets, accept rewritten markup, and
//! take screenshots when the backend can rasterize.

pub mod preview;
pub mod static_page;

#[cfg(feature = "chromium")]
pub mod chromium;

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use async_trait::async_trait;
use serde::Serialize;

pub use preview::PreviewServer;
pub use static_page::StaticRenderProvider;

#[cfg(feature = "chromium")]
pub use chromium::ChromiumRenderProvider;

pub const DEFAULT_DEVICE: &str = "Pixel 2";

/// Emulated viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DeviceProfile {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    pub scale_factor: f64,
    pub mobile: bool,
    pub user_agent: &'static str,
}

const DEVICES: &[DeviceProfile] = &[
    DeviceProfile {
        name: "Pixel 2",
        width: 411,
        height: 731,
        scale_factor: 2.625,
        mobile: true,
        user_agent: "Mozilla/5.0 (Linux; Android 8.0; Pixel 2 Build/OPD3.170816.012) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36",
    },
    DeviceProfile {
        name: "iPhone X",
        width: 375,
        height: 812,
        scale_factor: 3.0,
        mobile: true,
        user_agent: "Mozilla/5.0 (iPhone; CPU iPhone OS 11_0 like Mac OS X) AppleWebKit/604.1.38 (KHTML, like Gecko) Version/11.0 Mobile/15A372 Safari/604.1",
    },
    DeviceProfile {
        name: "Desktop",
        width: 1366,
        height: 768,
        scale_factor: 1.0,
        mobile: false,
        user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    },
];

/// Look up a device by name, ignoring case.
pub fn device_profile(name: &str) -> Option<DeviceProfile> {
    DEVICES
        .iter()
        .find(|device| device.name.eq_ignore_ascii_case(name))
        .copied()
}

pub fn device_names() -> Vec<&'static str> {
    DEVICES.iter().map(|device| device.name).collect()
}

/// Computed size of the page body in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BodyDimensions {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("{0} is not supported by this render provider")]
    Unsupported(&'static str),
    #[error("browser error: {0}")]
    Browser(String),
    #[error("page script failed: {0}")]
    Script(String),
}

impl RenderError {
    pub fn code(&self) -> &'static str {
        match self {
            RenderError::Navigation { .. } => "AMP-LOAD-001",
            RenderError::Unsupported(_) => "AMP-REN-001",
            RenderError::Browser(_) => "AMP-REN-002",
            RenderError::Script(_) => "AMP-REN-003",
        }
    }
}

impl From<RenderError> for AppError {
    fn from(e: RenderError) -> Self {
        let code = e.code();
        AppError::new(ErrorCategory::RenderError, e.to_string()).with_code(code)
    }
}

#[async_trait]
pub trait RenderProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Load `url` emulating `device`. Stylesheet bodies seen during the load are kept
    /// for [`RenderSession::take_stylesheets`].
    async fn open(
        &self,
        url: &str,
        device: &DeviceProfile,
    ) -> Result<Box<dyn RenderSession>, RenderError>;
}

#[async_trait]
pub trait RenderSession: Send {
    /// Current markup of the page.
    async fn content(&mut self) -> Result<String, RenderError>;

    /// Replace the page with `html` and wait for it to settle.
    async fn set_content(&mut self, html: &str) -> Result<(), RenderError>;

    /// Navigate to another URL, keeping the session.
    async fn goto(&mut self, url: &str) -> Result<(), RenderError>;

    /// PNG bytes of the rendered page.
    async fn screenshot(&mut self, full_page: bool) -> Result<Vec<u8>, RenderError>;

    /// Stylesheets captured during the initial load as `(url, text)`, in load order.
    /// Later calls return nothing.
    fn take_stylesheets(&mut self) -> Vec<(String, String)>;

    async fn body_dimensions(&mut self) -> Result<BodyDimensions, RenderError>;

    /// Rendered `(width, height)` of each element matching `selector`, in document order.
    async fn image_sizes(&mut self, selector: &str) -> Result<Vec<Option<(u32, u32)>>, RenderError>;

    async fn close(&mut self) -> Result<(), RenderError>;
}
