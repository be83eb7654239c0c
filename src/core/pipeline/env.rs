#![allow(clippy::result_large_err)]

use crate::core::error::{ActionError, AppError};
use crate::core::pipeline::schema::ActionSpec;
use crate::core::types::ErrorCategory;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::RegexBuilder;
use serde_json::Value;

/// Characters left untouched by `encodeURI`-style encoding.
const URI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b';')
    .remove(b',')
    .remove(b'/')
    .remove(b'?')
    .remove(b':')
    .remove(b'@')
    .remove(b'&')
    .remove(b'=')
    .remove(b'+')
    .remove(b'$')
    .remove(b'#');

const HOST_PATTERN: &str = r"(https|http)://[\w.-]*(:\d+)?";
const SCHEME_PATTERN: &str = r"https?://";

/// Placeholder tokens resolved from the page URL, in substitution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvVars {
    entries: Vec<(String, String)>,
}

impl EnvVars {
    pub fn new(entries: Vec<(String, String)>) -> Self {
        Self { entries }
    }

    /// Resolve `$URL`, `$HOST`, `$DOMAIN` and their `%%NAME%%` aliases for `url`.
    /// `custom_host` replaces the host-derived values.
    pub fn from_url(url: &str, custom_host: Option<&str>) -> Result<Self, AppError> {
        let host = match custom_host {
            Some(custom) => extract_host(custom).unwrap_or_else(|| {
                custom.trim_end_matches('/').to_string()
            }),
            None => extract_host(url).ok_or_else(|| {
                AppError::new(
                    ErrorCategory::ConfigurationError,
                    format!("Unable to get host from {}", url),
                )
                .with_code("AMP-CFG-002")
            })?,
        };
        let domain = strip_scheme(&host);
        if domain.is_empty() {
            return Err(AppError::new(
                ErrorCategory::ConfigurationError,
                format!("Unable to get domain from {}", url),
            )
            .with_code("AMP-CFG-002"));
        }
        let encoded_url = utf8_percent_encode(url, URI_ENCODE_SET).to_string();

        Ok(Self::new(vec![
            ("$URL".to_string(), encoded_url.clone()),
            ("$HOST".to_string(), host.clone()),
            ("$DOMAIN".to_string(), domain.clone()),
            ("%%URL%%".to_string(), encoded_url),
            ("%%HOST%%".to_string(), host),
            ("%%DOMAIN%%".to_string(), domain),
        ]))
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == token)
            .map(|(_, value)| value.as_str())
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// Replace every occurrence of every token in `text`.
    pub fn substitute(&self, text: &str) -> String {
        let mut result = text.to_string();
        for (token, value) in &self.entries {
            if result.contains(token.as_str()) {
                result = result.replace(token.as_str(), value);
            }
        }
        result
    }

    /// Copy of `spec` with every string field substituted. The original is left as is.
    pub fn apply(&self, spec: &ActionSpec) -> Result<ActionSpec, ActionError> {
        let mut value = serde_json::to_value(spec)
            .map_err(|e| ActionError::Custom(format!("Unable to read action fields: {}", e)))?;
        self.substitute_value(&mut value);
        serde_json::from_value(value)
            .map_err(|e| ActionError::Custom(format!("Unable to rebuild action: {}", e)))
    }

    fn substitute_value(&self, value: &mut Value) {
        match value {
            Value::String(text) => *text = self.substitute(text),
            Value::Array(items) => items.iter_mut().for_each(|item| self.substitute_value(item)),
            Value::Object(map) => map
                .iter_mut()
                .for_each(|(_, item)| self.substitute_value(item)),
            _ => {}
        }
    }
}

/// Scheme, host and optional port of `url`, e.g. `https://example.com:8080`.
pub fn extract_host(url: &str) -> Option<String> {
    let pattern = RegexBuilder::new(HOST_PATTERN)
        .case_insensitive(true)
        .build()
        .ok()?;
    pattern
        .find(url)
        .map(|found| found.as_str().to_string())
        .filter(|host| !strip_scheme(host).is_empty())
}

fn strip_scheme(text: &str) -> String {
    match RegexBuilder::new(SCHEME_PATTERN).case_insensitive(true).build() {
        Ok(pattern) => pattern.replace_all(text, "").into_owned(),
        Err(_) => text.to_string(),
    }
}

/// Directory name used for a run's artifacts when none is given.
pub fn output_name_for(url: &str) -> String {
    strip_scheme(url).replace('/', "_")
}
