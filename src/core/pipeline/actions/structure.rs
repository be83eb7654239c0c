use super::{select_one, select_some, ActionOutcome};
use crate::core::error::ActionError;
use crate::core::pipeline::document::{Document, EditPlan};
use crate::core::pipeline::schema::{required, InsertParams, MoveParams};

/// Append markup as the last children of the first match.
pub fn insert(document: &mut Document, params: &InsertParams) -> Result<ActionOutcome, ActionError> {
    let selector = required(&params.selector, "insert", "selector")?;
    let id = select_one(document, selector)?;

    let mut plan = EditPlan::new();
    plan.append_markup(id, params.value.clone().unwrap_or_default());
    document.apply(plan);
    Ok(ActionOutcome::message(format!("Inserted in {}", selector)))
}

/// Insert markup as the following siblings of the first match, keeping fragment order.
pub fn append_after(
    document: &mut Document,
    params: &InsertParams,
) -> Result<ActionOutcome, ActionError> {
    let selector = required(&params.selector, "appendAfter", "selector")?;
    let id = select_one(document, selector)?;

    let mut plan = EditPlan::new();
    plan.insert_after(id, params.value.clone().unwrap_or_default());
    document.apply(plan);
    Ok(ActionOutcome::message("Dom appended"))
}

/// Relocate every match to the end of the destination, in document order.
pub fn move_elements(
    document: &mut Document,
    params: &MoveParams,
) -> Result<ActionOutcome, ActionError> {
    let selector = required(&params.selector, "move", "selector")?;
    let dest_selector = required(&params.dest_selector, "move", "destSelector")?;
    let matches = select_some(document, selector)?;
    let dest = select_one(document, dest_selector)?;

    let mut moved = String::new();
    let mut plan = EditPlan::new();
    for id in &matches {
        moved.push_str(&document.outer_html(*id));
        moved.push('\n');
        plan.detach(*id);
    }
    plan.append_markup(dest, moved);
    document.apply(plan);
    Ok(ActionOutcome::message(format!(
        "Moved {} elements",
        matches.len()
    )))
}

/// Concatenate the children of every match into one copy of the first match, appended
/// to the destination. The originals are removed.
pub fn merge_content(
    document: &mut Document,
    params: &MoveParams,
) -> Result<ActionOutcome, ActionError> {
    let selector = required(&params.selector, "mergeContent", "selector")?;
    let dest_selector = required(&params.dest_selector, "mergeContent", "destSelector")?;
    let matches = select_some(document, selector)?;
    let dest = select_one(document, dest_selector)?;

    let merged = matches
        .iter()
        .map(|id| document.inner_html(*id))
        .collect::<Vec<_>>()
        .join("\n");
    let combined = document.outer_html_with_inner(matches[0], &merged);

    let mut plan = EditPlan::new();
    for id in &matches {
        plan.detach(*id);
    }
    plan.append_markup(dest, combined);
    document.apply(plan);
    Ok(ActionOutcome::message(format!(
        "Merged {} elements",
        matches.len()
    )))
}
