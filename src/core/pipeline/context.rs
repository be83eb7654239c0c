use crate::core::pipeline::env::EnvVars;
use crate::core::pipeline::render::BodyDimensions;
use crate::core::pipeline::validation::Diagnostics;
use indexmap::IndexMap;

/// Stylesheets captured while the source page loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleTable {
    by_url: IndexMap<String, String>,
    all: String,
}

impl StyleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, url: impl Into<String>, text: impl Into<String>) {
        let text = text.into();
        self.all.push_str(&text);
        self.by_url.insert(url.into(), text);
    }

    /// Concatenation of every captured stylesheet, in load order.
    pub fn all(&self) -> &str {
        &self.all
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_url
            .iter()
            .map(|(url, text)| (url.as_str(), text.as_str()))
    }

    pub fn len(&self) -> usize {
        self.by_url.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_url.is_empty()
    }
}

impl FromIterator<(String, String)> for StyleTable {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut table = StyleTable::new();
        for (url, text) in iter {
            table.insert(url, text);
        }
        table
    }
}

/// State owned by one pipeline run. Built fresh for every URL.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub url: String,
    pub env: EnvVars,
    pub styles: StyleTable,
    /// Findings for the latest serialized document.
    pub diagnostics: Diagnostics,
    pub body_dimensions: Option<BodyDimensions>,
    pub verbose: bool,
}

impl RunContext {
    pub fn new(url: impl Into<String>, env: EnvVars) -> Self {
        Self {
            url: url.into(),
            env,
            styles: StyleTable::new(),
            diagnostics: Diagnostics::default(),
            body_dimensions: None,
            verbose: false,
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}
