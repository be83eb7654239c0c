//! Stylesheet normalization and unused-rule removal.

use lightningcss::rules::{CssRule, CssRuleList};
use lightningcss::selector::{Component, Selector};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::traits::ToCss;
use scraper::node::Element;
use std::collections::HashSet;

/// Tags that every document has, whether or not they appear in the body.
const IMPLICIT_TAGS: &[&str] = &["html", "body"];

/// Tag names, classes and ids present in a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsedTokens {
    tags: HashSet<String>,
    classes: HashSet<String>,
    ids: HashSet<String>,
}

impl UsedTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_elements<'a>(elements: impl IntoIterator<Item = &'a Element>) -> Self {
        let mut used = Self::new();
        for element in elements {
            used.tags.insert(element.name().to_ascii_lowercase());
            if let Some(id) = element.id() {
                used.ids.insert(id.to_string());
            }
            for class in element.classes() {
                used.classes.insert(class.to_string());
            }
        }
        used
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags.insert(tag.to_ascii_lowercase());
        self
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.classes.insert(class.to_string());
        self
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.ids.insert(id.to_string());
        self
    }

    fn has_tag(&self, tag: &str) -> bool {
        IMPLICIT_TAGS.contains(&tag) || self.tags.contains(tag)
    }
}

/// Parse and reprint `css`, optionally minified. Unknown rules are kept as written.
pub fn normalize(css: &str, minify: bool) -> Result<String, String> {
    let mut sheet = StyleSheet::parse(css, parser_options()).map_err(|err| err.to_string())?;
    if minify {
        sheet
            .minify(MinifyOptions::default())
            .map_err(|err| err.to_string())?;
    }
    let printed = sheet
        .to_css(PrinterOptions {
            minify,
            ..PrinterOptions::default()
        })
        .map_err(|err| err.to_string())?;
    Ok(printed.code)
}

pub fn minify(css: &str) -> Result<String, String> {
    normalize(css, true)
}

/// Outcome of purging one stylesheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeResult {
    pub css: String,
    pub unused: String,
}

/// Remove style rules whose selectors reference no tag, class or id in `used`.
///
/// A rule survives when any selector in its list is satisfied. Grouping rules are
/// purged recursively and dropped once empty. Input that does not parse is returned
/// untouched.
pub fn purge(css: &str, used: &UsedTokens, minify: bool) -> PurgeResult {
    let keep_original = |err: String| {
        tracing::warn!(error = %err, "stylesheet could not be purged, keeping it as is");
        PurgeResult {
            css: css.to_string(),
            unused: String::new(),
        }
    };

    let mut sheet = match StyleSheet::parse(css, parser_options()) {
        Ok(sheet) => sheet,
        Err(err) => return keep_original(err.to_string()),
    };

    let mut unused = Vec::new();
    purge_rules(&mut sheet.rules, used, &mut unused);

    let mut minified = minify;
    if minify {
        if let Err(err) = sheet.minify(MinifyOptions::default()) {
            tracing::debug!(error = %err, "purged stylesheet not minified");
            minified = false;
        }
    }
    match sheet.to_css(PrinterOptions {
        minify: minified,
        ..PrinterOptions::default()
    }) {
        Ok(printed) => PurgeResult {
            css: printed.code,
            unused: unused.join("\n"),
        },
        Err(err) => keep_original(err.to_string()),
    }
}

fn parser_options<'i>() -> ParserOptions<'i> {
    ParserOptions {
        error_recovery: true,
        ..ParserOptions::default()
    }
}

fn purge_rules(rules: &mut CssRuleList<'_>, used: &UsedTokens, unused: &mut Vec<String>) {
    let mut kept = Vec::with_capacity(rules.0.len());
    for rule in rules.0.drain(..) {
        match rule {
            CssRule::Style(mut style) => {
                if style.selectors.0.iter().any(|selector| selector_is_used(selector, used)) {
                    purge_rules(&mut style.rules, used, unused);
                    kept.push(CssRule::Style(style));
                } else {
                    let rule = CssRule::Style(style);
                    match rule.to_css_string(PrinterOptions::default()) {
                        Ok(text) => unused.push(text),
                        Err(err) => tracing::debug!(error = %err, "unused rule not printed"),
                    }
                }
            }
            CssRule::Media(mut media) => {
                purge_rules(&mut media.rules, used, unused);
                if !media.rules.0.is_empty() {
                    kept.push(CssRule::Media(media));
                }
            }
            CssRule::Supports(mut supports) => {
                purge_rules(&mut supports.rules, used, unused);
                if !supports.rules.0.is_empty() {
                    kept.push(CssRule::Supports(supports));
                }
            }
            CssRule::LayerBlock(mut layer) => {
                purge_rules(&mut layer.rules, used, unused);
                if !layer.rules.0.is_empty() {
                    kept.push(CssRule::LayerBlock(layer));
                }
            }
            CssRule::Container(mut container) => {
                purge_rules(&mut container.rules, used, unused);
                if !container.rules.0.is_empty() {
                    kept.push(CssRule::Container(container));
                }
            }
            other => kept.push(other),
        }
    }
    rules.0 = kept;
}

/// Every tag, class and id the selector requires is present. Attribute selectors,
/// pseudo-classes and negations do not constrain the match.
fn selector_is_used(selector: &Selector<'_>, used: &UsedTokens) -> bool {
    selector
        .iter_raw_match_order()
        .all(|component| component_is_used(component, used))
}

fn component_is_used(component: &Component<'_>, used: &UsedTokens) -> bool {
    match component {
        Component::LocalName(name) => used.has_tag(&name.lower_name.0),
        Component::Class(class) => used.classes.contains(&*class.0),
        Component::ID(id) => used.ids.contains(&*id.0),
        Component::Is(selectors) | Component::Where(selectors) | Component::Any(_, selectors) => {
            selectors
                .iter()
                .any(|selector| selector_is_used(selector, used))
        }
        _ => true,
    }
}
