use super::{select_one, select_some, ActionOutcome};
use crate::core::error::ActionError;
use crate::core::pipeline::context::StyleTable;
use crate::core::pipeline::css::{self, UsedTokens};
use crate::core::pipeline::document::{escape_attribute, Document, EditPlan};
use crate::core::pipeline::schema::{required, InlineStylesParams, PurgeStylesParams};
use url::Url;

fn excluded(url: &str, domains: &[String]) -> bool {
    let host = match Url::parse(url).ok().and_then(|parsed| parsed.host_str().map(str::to_string)) {
        Some(host) => host.to_ascii_lowercase(),
        None => return false,
    };
    domains.iter().any(|domain| {
        let domain = domain.trim_start_matches('.').to_ascii_lowercase();
        host == domain || host.ends_with(&format!(".{}", domain))
    })
}

fn style_element(attributes: &[String], css: &str) -> String {
    let mut out = String::from("<style");
    for attribute in attributes {
        let (name, value) = match attribute.split_once('=') {
            Some((name, value)) => (name.trim(), Some(value.trim().trim_matches('"'))),
            None => (attribute.trim(), None),
        };
        if name.is_empty() {
            continue;
        }
        out.push(' ');
        out.push_str(name);
        if let Some(value) = value {
            out.push_str("=\"");
            escape_attribute(value, &mut out);
            out.push('"');
        }
    }
    out.push('>');
    out.push_str(css);
    out.push_str("</style>");
    out
}

/// Append every captured stylesheet, minus excluded hosts, as one style element.
pub fn inline_external_styles(
    document: &mut Document,
    params: &InlineStylesParams,
    styles: &StyleTable,
) -> Result<ActionOutcome, ActionError> {
    let selector = required(&params.selector, "inlineExternalStyles", "selector")?;
    let id = select_one(document, selector)?;
    let exclude = params.exclude_domains.clone().unwrap_or_default();

    let mut css = String::new();
    for (url, text) in styles.iter() {
        if excluded(url, &exclude) {
            tracing::debug!(url = %url, "skipping excluded stylesheet");
            continue;
        }
        css.push_str(text);
    }
    if params.minify.unwrap_or(false) {
        css = match css::minify(&css) {
            Ok(minified) => minified,
            Err(err) => {
                tracing::warn!(error = %err, "could not minify inlined styles");
                css
            }
        };
    }

    let mut plan = EditPlan::new();
    plan.append_markup(
        id,
        style_element(params.attributes.as_deref().unwrap_or_default(), &css),
    );
    document.apply(plan);
    Ok(ActionOutcome::message("styles appended"))
}

/// Drop rules no body element uses from every matched style element.
pub fn remove_unused_styles(
    document: &mut Document,
    params: &PurgeStylesParams,
) -> Result<ActionOutcome, ActionError> {
    let selector = required(&params.selector, "removeUnusedStyles", "selector")?;
    let matches = select_some(document, selector)?;
    let used = match document.select_first("body")? {
        Some(body) => UsedTokens::from_elements(document.descendant_elements(body)),
        None => UsedTokens::new(),
    };
    let minify = params.minify.unwrap_or(false);

    let mut plan = EditPlan::new();
    let mut old_size = 0;
    let mut new_size = 0;
    let mut optimized = Vec::new();
    let mut unused = Vec::new();
    for id in matches {
        let original = document.inner_html(id);
        let result = css::purge(&original, &used, minify);
        old_size += original.len();
        new_size += result.css.len();
        optimized.push(result.css.clone());
        if !result.unused.is_empty() {
            unused.push(result.unused);
        }
        plan.set_inner(id, result.css);
    }
    document.apply(plan);

    let ratio = if old_size == 0 {
        0
    } else {
        ((old_size as f64 - new_size as f64) / old_size as f64 * 100.0).round() as i64
    };
    let mut outcome = ActionOutcome::message(format!(
        "Removed {}% styles. ({} -> {} bytes)",
        ratio, old_size, new_size
    ));
    if params.output_css.unwrap_or(false) {
        outcome.optimized_css = Some(optimized.join("\n"));
        outcome.unused_css = Some(unused.join("\n"));
    }
    Ok(outcome)
}
