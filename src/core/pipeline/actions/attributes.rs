use super::ActionOutcome;
use crate::core::error::ActionError;
use crate::core::pipeline::document::{Document, EditPlan};
use crate::core::pipeline::schema::{required, AttributeParams};
use crate::core::pipeline::validation::{find_attributes_declared_invalid, Diagnostics};
use regex::RegexBuilder;

fn valid_attribute_name(name: &str) -> Result<(), ActionError> {
    let invalid = name.is_empty()
        || name
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '>' | '/' | '=' | '<'));
    if invalid {
        return Err(ActionError::Custom(format!(
            "Invalid attribute name '{}'",
            name
        )));
    }
    Ok(())
}

/// Set `attribute=value` on every match. Zero matches is not an error.
pub fn set_attribute(
    document: &mut Document,
    params: &AttributeParams,
) -> Result<ActionOutcome, ActionError> {
    let selector = required(&params.selector, "setAttribute", "selector")?;
    let attribute = required(&params.attribute, "setAttribute", "attribute")?;
    valid_attribute_name(attribute)?;
    let value = params.value.as_deref().unwrap_or_default();

    let mut plan = EditPlan::new();
    for id in document.select(selector)? {
        plan.set_attribute(id, attribute, value);
    }
    document.apply(plan);
    Ok(ActionOutcome::message(format!(
        "set {} as {}",
        attribute, value
    )))
}

/// Remove `attribute` from every match. Zero matches is not an error.
pub fn remove_attribute(
    document: &mut Document,
    params: &AttributeParams,
) -> Result<ActionOutcome, ActionError> {
    let selector = required(&params.selector, "removeAttribute", "selector")?;
    let attribute = required(&params.attribute, "removeAttribute", "attribute")?;

    let matches = document.select(selector)?;
    let mut plan = EditPlan::new();
    for id in &matches {
        if document.attribute(*id, attribute).is_some() {
            plan.remove_attribute(*id, attribute);
        }
    }
    document.apply(plan);
    Ok(ActionOutcome::message(format!(
        "remove {} from {} elements",
        attribute,
        matches.len()
    )))
}

/// Strip every attribute the validator reported as disallowed from the whole document.
pub fn remove_disallowed_attributes(
    document: &mut Document,
    diagnostics: &Diagnostics,
) -> Result<ActionOutcome, ActionError> {
    let mut names: Vec<String> = find_attributes_declared_invalid(diagnostics)
        .into_iter()
        .collect();
    if names.is_empty() {
        return Ok(ActionOutcome::message("no disallowed attributes"));
    }
    // Longer names sharing a prefix go first.
    names.sort_by(|a, b| b.cmp(a));

    let original = document.to_html();
    let mut html = original.clone();
    for name in &names {
        let pattern = format!(
            r#"(<[a-zA-Z][^<>]*?)\s+{}(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'>]+))?(\s|/?>)"#,
            regex::escape(name)
        );
        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .map_err(|err| ActionError::InvalidRegex {
                pattern: pattern.clone(),
                reason: err.to_string(),
            })?;
        while regex.is_match(&html) {
            html = regex.replace_all(&html, "${1}${2}").into_owned();
        }
    }

    if html != original {
        let mut plan = EditPlan::new();
        plan.replace_document(html);
        document.apply(plan);
    }
    Ok(ActionOutcome::message(format!("removed {}", names.join(", "))))
}
