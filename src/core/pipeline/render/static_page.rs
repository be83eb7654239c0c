use super::{BodyDimensions, DeviceProfile, RenderError, RenderProvider, RenderSession};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use scraper::{Html, Selector};
use std::io::Cursor;
use std::time::Duration;
use url::Url;

const STYLESHEET_FETCH_CONCURRENCY: usize = 4;

/// Renders pages by fetching them over HTTP without a browser engine.
///
/// Content, stylesheet capture and image measurement work; screenshots and computed
/// layout do not.
#[derive(Clone)]
pub struct StaticRenderProvider {
    client: reqwest::Client,
}

impl Default for StaticRenderProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticRenderProvider {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { client }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RenderProvider for StaticRenderProvider {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn open(
        &self,
        url: &str,
        device: &DeviceProfile,
    ) -> Result<Box<dyn RenderSession>, RenderError> {
        let base = Url::parse(url).map_err(|err| RenderError::Navigation {
            url: url.to_string(),
            reason: err.to_string(),
        })?;
        let mut session = StaticSession {
            client: self.client.clone(),
            user_agent: device.user_agent.to_string(),
            base,
            html: String::new(),
            stylesheets: Vec::new(),
        };
        session.load(url).await?;
        session.stylesheets = session.fetch_stylesheets().await;
        Ok(Box::new(session))
    }
}

struct StaticSession {
    client: reqwest::Client,
    user_agent: String,
    base: Url,
    html: String,
    stylesheets: Vec<(String, String)>,
}

impl StaticSession {
    async fn fetch_text(&self, url: &str) -> Result<(Url, String), RenderError> {
        let navigation_error = |reason: String| RenderError::Navigation {
            url: url.to_string(),
            reason,
        };
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|err| navigation_error(err.to_string()))?;
        if !response.status().is_success() {
            return Err(navigation_error(format!("status {}", response.status())));
        }
        let final_url = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(|err| navigation_error(err.to_string()))?;
        Ok((final_url, body))
    }

    async fn load(&mut self, url: &str) -> Result<(), RenderError> {
        let (final_url, body) = self.fetch_text(url).await?;
        tracing::debug!(url = %final_url, bytes = body.len(), "page fetched");
        self.base = final_url;
        self.html = body;
        Ok(())
    }

    fn resolve(&self, href: &str) -> Option<Url> {
        self.base.join(href).ok()
    }

    fn stylesheet_urls(&self) -> Vec<Url> {
        let Ok(selector) = Selector::parse("link[rel~=\"stylesheet\" i][href]") else {
            return Vec::new();
        };
        let document = Html::parse_document(&self.html);
        document
            .select(&selector)
            .filter_map(|link| link.value().attr("href"))
            .filter_map(|href| self.resolve(href))
            .collect()
    }

    async fn fetch_stylesheets(&self) -> Vec<(String, String)> {
        let urls = self.stylesheet_urls();
        let fetched: Vec<_> = stream::iter(urls)
            .map(|url| async move {
                let result = self.fetch_text(url.as_str()).await;
                (url, result)
            })
            .buffered(STYLESHEET_FETCH_CONCURRENCY)
            .collect()
            .await;

        fetched
            .into_iter()
            .filter_map(|(url, result)| match result {
                Ok((_, text)) => Some((url.to_string(), text)),
                Err(err) => {
                    tracing::warn!(url = %url, error = %err, "stylesheet not captured");
                    None
                }
            })
            .collect()
    }

    fn image_sources(&self, selector: &str) -> Result<Vec<Option<String>>, RenderError> {
        let parsed = Selector::parse(selector).map_err(|err| {
            RenderError::Script(format!("invalid selector {}: {:?}", selector, err))
        })?;
        let document = Html::parse_document(&self.html);
        Ok(document
            .select(&parsed)
            .map(|element| element.value().attr("src").map(str::to_string))
            .collect())
    }

    async fn measure(&self, src: &str) -> Option<(u32, u32)> {
        let url = self.resolve(src)?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        let response = self
            .client
            .get(url.as_str())
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        let bytes = response.bytes().await.ok()?;
        image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .ok()?
            .into_dimensions()
            .ok()
    }
}

#[async_trait]
impl RenderSession for StaticSession {
    async fn content(&mut self) -> Result<String, RenderError> {
        Ok(self.html.clone())
    }

    async fn set_content(&mut self, html: &str) -> Result<(), RenderError> {
        self.html = html.to_string();
        Ok(())
    }

    async fn goto(&mut self, url: &str) -> Result<(), RenderError> {
        self.load(url).await
    }

    async fn screenshot(&mut self, _full_page: bool) -> Result<Vec<u8>, RenderError> {
        Err(RenderError::Unsupported("screenshot"))
    }

    fn take_stylesheets(&mut self) -> Vec<(String, String)> {
        std::mem::take(&mut self.stylesheets)
    }

    async fn body_dimensions(&mut self) -> Result<BodyDimensions, RenderError> {
        Err(RenderError::Unsupported("computed body size"))
    }

    async fn image_sizes(&mut self, selector: &str) -> Result<Vec<Option<(u32, u32)>>, RenderError> {
        let sources = self.image_sources(selector)?;
        let mut sizes = Vec::with_capacity(sources.len());
        for source in sources {
            let size = match source {
                Some(src) => self.measure(&src).await,
                None => None,
            };
            sizes.push(size);
        }
        Ok(sizes)
    }

    async fn close(&mut self) -> Result<(), RenderError> {
        Ok(())
    }
}
