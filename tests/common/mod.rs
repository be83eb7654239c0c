//! Render and validator doubles shared by the integration tests.
#![allow(dead_code)]

use amplifier::core::pipeline::compare::encode_png;
use amplifier::core::pipeline::render::{
    BodyDimensions, DeviceProfile, RenderError, RenderProvider, RenderSession,
};
use amplifier::core::pipeline::validation::{Diagnostic, Diagnostics, Validator};
use amplifier::core::{AppError, ErrorCategory};
use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use scraper::{Html, Selector};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// What sessions opened by a [`FakeRender`] were asked to do.
#[derive(Debug, Default)]
pub struct SessionLog {
    pub opened: Vec<String>,
    pub visited: Vec<String>,
    pub set_content: usize,
    pub closed: usize,
}

/// Render provider serving fixed markup.
#[derive(Clone, Default)]
pub struct FakeRender {
    html: String,
    stylesheets: Vec<(String, String)>,
    screenshot: Option<Vec<u8>>,
    body: Option<BodyDimensions>,
    image_size: Option<(u32, u32)>,
    fail_open: bool,
    log: Arc<Mutex<SessionLog>>,
}

impl FakeRender {
    pub fn new(html: &str) -> Self {
        Self {
            html: html.to_string(),
            ..Self::default()
        }
    }

    pub fn with_stylesheet(mut self, url: &str, text: &str) -> Self {
        self.stylesheets.push((url.to_string(), text.to_string()));
        self
    }

    /// Every screenshot returns the same solid image.
    pub fn with_screenshots(mut self, width: u32, height: u32) -> Self {
        self.screenshot = Some(solid_png(width, height, Rgba([200, 200, 200, 255])));
        self
    }

    pub fn with_body(mut self, width: f64, height: f64) -> Self {
        self.body = Some(BodyDimensions { width, height });
        self
    }

    pub fn with_image_size(mut self, width: u32, height: u32) -> Self {
        self.image_size = Some((width, height));
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn log(&self) -> Arc<Mutex<SessionLog>> {
        self.log.clone()
    }

    pub fn session(&self) -> FakeSession {
        FakeSession {
            html: self.html.clone(),
            stylesheets: self.stylesheets.clone(),
            screenshot: self.screenshot.clone(),
            body: self.body,
            image_size: self.image_size,
            log: self.log.clone(),
        }
    }
}

#[async_trait]
impl RenderProvider for FakeRender {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn open(
        &self,
        url: &str,
        _device: &DeviceProfile,
    ) -> Result<Box<dyn RenderSession>, RenderError> {
        if self.fail_open {
            return Err(RenderError::Navigation {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        self.log.lock().unwrap().opened.push(url.to_string());
        Ok(Box::new(self.session()))
    }
}

pub struct FakeSession {
    pub html: String,
    stylesheets: Vec<(String, String)>,
    screenshot: Option<Vec<u8>>,
    body: Option<BodyDimensions>,
    image_size: Option<(u32, u32)>,
    log: Arc<Mutex<SessionLog>>,
}

#[async_trait]
impl RenderSession for FakeSession {
    async fn content(&mut self) -> Result<String, RenderError> {
        Ok(self.html.clone())
    }

    async fn set_content(&mut self, html: &str) -> Result<(), RenderError> {
        self.html = html.to_string();
        self.log.lock().unwrap().set_content += 1;
        Ok(())
    }

    async fn goto(&mut self, url: &str) -> Result<(), RenderError> {
        self.log.lock().unwrap().visited.push(url.to_string());
        Ok(())
    }

    async fn screenshot(&mut self, _full_page: bool) -> Result<Vec<u8>, RenderError> {
        self.screenshot
            .clone()
            .ok_or(RenderError::Unsupported("screenshot"))
    }

    fn take_stylesheets(&mut self) -> Vec<(String, String)> {
        std::mem::take(&mut self.stylesheets)
    }

    async fn body_dimensions(&mut self) -> Result<BodyDimensions, RenderError> {
        self.body.ok_or(RenderError::Unsupported("body dimensions"))
    }

    async fn image_sizes(&mut self, selector: &str) -> Result<Vec<Option<(u32, u32)>>, RenderError> {
        let parsed = Selector::parse(selector)
            .map_err(|err| RenderError::Script(format!("{:?}", err)))?;
        let count = Html::parse_document(&self.html).select(&parsed).count();
        Ok(vec![self.image_size; count])
    }

    async fn close(&mut self) -> Result<(), RenderError> {
        self.log.lock().unwrap().closed += 1;
        Ok(())
    }
}

type Rule = Box<dyn Fn(&str) -> Vec<Diagnostic> + Send + Sync>;

/// Validator answering from a rule and counting its calls.
pub struct FakeValidator {
    rule: Rule,
    calls: AtomicUsize,
    fail: bool,
}

impl FakeValidator {
    /// Passes every document.
    pub fn passing() -> Self {
        Self::with_rule(|_| Vec::new())
    }

    pub fn with_rule(rule: impl Fn(&str) -> Vec<Diagnostic> + Send + Sync + 'static) -> Self {
        Self {
            rule: Box::new(rule),
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    /// Every call fails as if the validator binary were missing.
    pub fn unavailable() -> Self {
        Self {
            fail: true,
            ..Self::passing()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Validator for FakeValidator {
    async fn validate(&self, html: &str) -> Result<Diagnostics, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AppError::new(
                ErrorCategory::ValidatorError,
                "validator not installed",
            )
            .with_code("AMP-VAL-001"));
        }
        Ok(Diagnostics::new((self.rule)(html)))
    }
}

pub fn diagnostic(message: &str) -> Diagnostic {
    Diagnostic {
        line: 1,
        col: 0,
        message: message.to_string(),
        spec_url: None,
    }
}

pub fn solid_png(width: u32, height: u32, color: Rgba<u8>) -> Vec<u8> {
    encode_png(&RgbaImage::from_pixel(width, height, color)).unwrap()
}
