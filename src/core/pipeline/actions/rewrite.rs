//! Regex rewrites over serialized markup.

use super::{select_one, select_some, ActionOutcome};
use crate::core::error::ActionError;
use crate::core::pipeline::document::{Document, EditPlan};
use crate::core::pipeline::schema::{required, DiagnosticReplaceParams, ReplaceParams};
use crate::core::pipeline::validation::Diagnostics;
use indexmap::{IndexMap, IndexSet};
use regex::{Regex, RegexBuilder};

const MAX_TEMPLATE_GROUP: usize = 9;

pub(crate) fn build_regex(pattern: &str, case_insensitive: bool) -> Result<Regex, ActionError> {
    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|err| ActionError::InvalidRegex {
            pattern: pattern.to_string(),
            reason: err.to_string(),
        })
}

/// Convert a replacement template written with `$1`, `$&`, `$$` and `$<name>` into the
/// `regex` crate's syntax. A `$` that starts none of these stays literal.
pub fn translate_template(template: &str) -> String {
    let chars: Vec<char> = template.chars().collect();
    let mut out = String::with_capacity(template.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '$' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        match chars.get(i + 1) {
            Some('$') => {
                out.push_str("$$");
                i += 2;
            }
            Some('&') => {
                out.push_str("${0}");
                i += 2;
            }
            Some(digit @ '1'..='9') => {
                out.push_str("${");
                out.push(*digit);
                out.push('}');
                i += 2;
            }
            Some('<') => match chars[i + 2..].iter().position(|c| *c == '>') {
                Some(offset) => {
                    let name: String = chars[i + 2..i + 2 + offset].iter().collect();
                    out.push_str("${");
                    out.push_str(&name);
                    out.push('}');
                    i += offset + 3;
                }
                None => {
                    out.push_str("$$");
                    i += 1;
                }
            },
            _ => {
                out.push_str("$$");
                i += 1;
            }
        }
    }
    out
}

/// Regex-replace (case-insensitive, global) inside every match's inner markup.
pub fn replace(document: &mut Document, params: &ReplaceParams) -> Result<ActionOutcome, ActionError> {
    let selector = required(&params.selector, "replace", "selector")?;
    let pattern = required(&params.regex, "replace", "regex")?;
    let template = translate_template(params.replace.as_deref().unwrap_or_default());
    let regex = build_regex(pattern, true)?;
    let matches = select_some(document, selector)?;

    let mut plan = EditPlan::new();
    let mut replaced = 0;
    for id in matches {
        let inner = document.inner_html(id);
        let count = regex.find_iter(&inner).count();
        if count > 0 {
            replaced += count;
            plan.set_inner(id, regex.replace_all(&inner, template.as_str()).into_owned());
        }
    }
    document.apply(plan);
    Ok(ActionOutcome::message(format!("{} replaced", replaced)))
}

/// Replace inside the first match when the pattern occurs there, otherwise append the
/// replacement markup to it.
pub fn replace_or_insert(
    document: &mut Document,
    params: &ReplaceParams,
) -> Result<ActionOutcome, ActionError> {
    let selector = required(&params.selector, "replaceOrInsert", "selector")?;
    let pattern = required(&params.regex, "replaceOrInsert", "regex")?;
    let replacement = params.replace.as_deref().unwrap_or_default();
    let regex = build_regex(pattern, true)?;
    let id = select_one(document, selector)?;

    let inner = document.inner_html(id);
    let mut plan = EditPlan::new();
    let message = if regex.is_match(&inner) {
        let template = translate_template(replacement);
        plan.set_inner(id, regex.replace_all(&inner, template.as_str()).into_owned());
        "Replaced".to_string()
    } else {
        plan.append_markup(id, replacement.to_string());
        format!("Inserted in {}", selector)
    };
    document.apply(plan);
    Ok(ActionOutcome::message(message))
}

/// Fill the `$1`..`$9` slots of the action's regex with captures taken from each validator
/// finding, then rewrite the first occurrence inside every match once per finding.
pub fn replace_based_on_diagnostics(
    document: &mut Document,
    params: &DiagnosticReplaceParams,
    diagnostics: &Diagnostics,
) -> Result<ActionOutcome, ActionError> {
    let action = "replaceBasedOnAmpErrors";
    let selector = required(&params.selector, action, "selector")?;
    let finding_pattern = required(&params.amp_error_regex, action, "ampErrorRegex")?;
    let pattern_template = required(&params.regex, action, "regex")?;
    let template = translate_template(params.replace.as_deref().unwrap_or_default());
    let matches = select_some(document, selector)?;
    let finding_regex = build_regex(finding_pattern, false)?;

    // One rewrite per finding; repeated findings repeat the rewrite.
    let mut capture_sets: Vec<Vec<Option<String>>> = Vec::new();
    for diagnostic in diagnostics.iter() {
        let line = diagnostic.to_string();
        if let Some(captures) = finding_regex.captures(&line) {
            let groups = (1..=MAX_TEMPLATE_GROUP)
                .map(|index| {
                    captures
                        .get(index)
                        .map(|group| group.as_str().to_string())
                        .filter(|value| !value.is_empty())
                })
                .collect();
            capture_sets.push(groups);
        }
    }

    let mut names: IndexSet<String> = IndexSet::new();
    let mut compiled: IndexMap<String, Regex> = IndexMap::new();
    let mut regexes = Vec::with_capacity(capture_sets.len());
    for groups in &capture_sets {
        let mut pattern = pattern_template.to_string();
        for (index, group) in groups.iter().enumerate().rev() {
            if let Some(value) = group {
                pattern = pattern.replace(&format!("${}", index + 1), &regex::escape(value));
                names.insert(value.clone());
            }
        }
        let regex = match compiled.get(&pattern) {
            Some(regex) => regex.clone(),
            None => {
                let regex = build_regex(&pattern, false)?;
                compiled.insert(pattern, regex.clone());
                regex
            }
        };
        regexes.push(regex);
    }

    let mut plan = EditPlan::new();
    let mut replaced = 0;
    for id in matches {
        let mut inner = document.inner_html(id);
        let mut changed = false;
        for regex in &regexes {
            if regex.is_match(&inner) {
                replaced += 1;
                inner = regex.replacen(&inner, 1, template.as_str()).into_owned();
                changed = true;
            }
        }
        if changed {
            plan.set_inner(id, inner);
        }
    }
    document.apply(plan);

    let names: Vec<String> = names.into_iter().collect();
    Ok(ActionOutcome::message(format!(
        "{} replaced: {}",
        replaced,
        names.join(", ")
    )))
}
