use super::{BodyDimensions, DeviceProfile, RenderError, RenderProvider, RenderSession};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    EventResponseReceived, GetResponseBodyParams, ResourceType,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

const NETWORK_IDLE_WAIT: Duration = Duration::from_millis(500);

/// Renders pages in a launched Chromium instance.
#[derive(Debug, Clone)]
pub struct ChromiumRenderProvider {
    headless: bool,
}

impl ChromiumRenderProvider {
    pub fn new(headless: bool) -> Self {
        Self { headless }
    }
}

fn browser_error(err: impl std::fmt::Display) -> RenderError {
    RenderError::Browser(err.to_string())
}

#[async_trait]
impl RenderProvider for ChromiumRenderProvider {
    fn name(&self) -> &'static str {
        "chromium"
    }

    async fn open(
        &self,
        url: &str,
        device: &DeviceProfile,
    ) -> Result<Box<dyn RenderSession>, RenderError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(device.width, device.height)
            .arg("--hide-scrollbars")
            .arg("--disable-dev-shm-usage");
        if !self.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(browser_error)?;
        let (browser, mut handler) = Browser::launch(config).await.map_err(browser_error)?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    tracing::debug!(error = %err, "browser event error");
                }
            }
        });

        let page = browser.new_page("about:blank").await.map_err(browser_error)?;
        page.set_user_agent(device.user_agent)
            .await
            .map_err(browser_error)?;
        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(i64::from(device.width))
            .height(i64::from(device.height))
            .device_scale_factor(device.scale_factor)
            .mobile(device.mobile)
            .build()
            .map_err(browser_error)?;
        page.execute(metrics).await.map_err(browser_error)?;

        let stylesheets = Arc::new(Mutex::new(Vec::new()));
        let collector = spawn_stylesheet_collector(&page, Arc::clone(&stylesheets)).await?;

        let mut session = ChromiumSession {
            browser,
            page,
            handler_task,
            collector: Some(collector),
            stylesheets,
        };
        session.goto(url).await?;
        Ok(Box::new(session))
    }
}

async fn spawn_stylesheet_collector(
    page: &Page,
    sink: Arc<Mutex<Vec<(String, String)>>>,
) -> Result<JoinHandle<()>, RenderError> {
    let mut responses = page
        .event_listener::<EventResponseReceived>()
        .await
        .map_err(browser_error)?;
    let page = page.clone();
    Ok(tokio::spawn(async move {
        while let Some(event) = responses.next().await {
            if event.r#type != ResourceType::Stylesheet {
                continue;
            }
            let body = page
                .execute(GetResponseBodyParams::new(event.request_id.clone()))
                .await;
            match body {
                Ok(body) if !body.base64_encoded => {
                    if let Ok(mut sheets) = sink.lock() {
                        sheets.push((event.response.url.clone(), body.body.clone()));
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(url = %event.response.url, error = %err, "stylesheet not captured")
                }
            }
        }
    }))
}

struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    collector: Option<JoinHandle<()>>,
    stylesheets: Arc<Mutex<Vec<(String, String)>>>,
}

impl ChromiumSession {
    async fn evaluate_json<T: serde::de::DeserializeOwned>(
        &self,
        script: String,
    ) -> Result<T, RenderError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|err| RenderError::Script(err.to_string()))?;
        result
            .into_value::<T>()
            .map_err(|err| RenderError::Script(err.to_string()))
    }
}

#[async_trait]
impl RenderSession for ChromiumSession {
    async fn content(&mut self) -> Result<String, RenderError> {
        self.page.content().await.map_err(browser_error)
    }

    async fn set_content(&mut self, html: &str) -> Result<(), RenderError> {
        self.page.set_content(html).await.map_err(browser_error)?;
        tokio::time::sleep(NETWORK_IDLE_WAIT).await;
        Ok(())
    }

    async fn goto(&mut self, url: &str) -> Result<(), RenderError> {
        let navigation_error = |err: chromiumoxide::error::CdpError| RenderError::Navigation {
            url: url.to_string(),
            reason: err.to_string(),
        };
        self.page.goto(url).await.map_err(navigation_error)?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(navigation_error)?;
        tokio::time::sleep(NETWORK_IDLE_WAIT).await;
        Ok(())
    }

    async fn screenshot(&mut self, full_page: bool) -> Result<Vec<u8>, RenderError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(full_page)
            .build();
        self.page.screenshot(params).await.map_err(browser_error)
    }

    fn take_stylesheets(&mut self) -> Vec<(String, String)> {
        if let Some(collector) = self.collector.take() {
            collector.abort();
        }
        match self.stylesheets.lock() {
            Ok(mut sheets) => std::mem::take(&mut *sheets),
            Err(_) => Vec::new(),
        }
    }

    async fn body_dimensions(&mut self) -> Result<BodyDimensions, RenderError> {
        let (width, height): (f64, f64) = self
            .evaluate_json(
                "(() => { const s = window.getComputedStyle(document.body); \
                 return [parseFloat(s.getPropertyValue('width')) || 0, \
                 parseFloat(s.getPropertyValue('height')) || 0]; })()"
                    .to_string(),
            )
            .await?;
        Ok(BodyDimensions { width, height })
    }

    async fn image_sizes(&mut self, selector: &str) -> Result<Vec<Option<(u32, u32)>>, RenderError> {
        let quoted = serde_json::to_string(selector).map_err(|err| RenderError::Script(err.to_string()))?;
        let sizes: Vec<(u32, u32)> = self
            .evaluate_json(format!(
                "Array.from(document.querySelectorAll({})).map(img => [img.width | 0, img.height | 0])",
                quoted
            ))
            .await?;
        Ok(sizes.into_iter().map(Some).collect())
    }

    async fn close(&mut self) -> Result<(), RenderError> {
        if let Some(collector) = self.collector.take() {
            collector.abort();
        }
        let closed = self.browser.close().await.map(|_| ()).map_err(browser_error);
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        closed
    }
}
