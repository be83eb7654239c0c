//! Named custom actions invoked by `customFunc` steps.
//!
//! Step files stay data-only: they name a function, and the function is looked up in a
//! [`CustomActionRegistry`] built before the run.

use super::{ActionContext, ActionOutcome};
use crate::core::error::ActionError;
use crate::core::pipeline::document::{Document, EditPlan};
use crate::core::pipeline::schema::{required, CustomParams};
use async_trait::async_trait;
use ego_tree::NodeId;
use std::collections::HashMap;
use std::sync::Arc;

/// Arguments handed to a custom action.
#[derive(Debug, Clone)]
pub struct CustomCall<'a> {
    pub selector: &'a str,
    /// Elements matching `selector`, in document order. May be empty.
    pub matches: Vec<NodeId>,
}

/// A callable registered under a name. May read from the render session and edit the
/// document through an [`EditPlan`].
#[async_trait(?Send)]
pub trait CustomAction: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(
        &self,
        document: &mut Document,
        call: CustomCall<'_>,
        ctx: &mut ActionContext<'_>,
    ) -> Result<ActionOutcome, ActionError>;
}

/// Builder used to register custom actions before a run.
pub struct CustomActionRegistryBuilder {
    actions: HashMap<String, Arc<dyn CustomAction>>,
}

impl Default for CustomActionRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CustomActionRegistryBuilder {
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }

    pub fn register<T: CustomAction + 'static>(&mut self, action: T) -> &mut Self {
        let name = action.name();
        if self.actions.contains_key(name) {
            tracing::warn!(name, "custom action registered twice, keeping the latest");
        }
        self.actions.insert(name.to_string(), Arc::new(action));
        self
    }

    pub fn build(self) -> CustomActionRegistry {
        CustomActionRegistry {
            inner: Arc::new(self.actions),
        }
    }
}

/// Immutable lookup table shared by concurrent runs.
#[derive(Clone)]
pub struct CustomActionRegistry {
    inner: Arc<HashMap<String, Arc<dyn CustomAction>>>,
}

impl Default for CustomActionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl CustomActionRegistry {
    /// Registry without any actions.
    pub fn empty() -> Self {
        CustomActionRegistryBuilder::new().build()
    }

    pub fn with_builtins() -> Self {
        let mut builder = Self::builder();
        builder.register(MeasureImages);
        builder.build()
    }

    pub fn builder() -> CustomActionRegistryBuilder {
        CustomActionRegistryBuilder::new()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CustomAction>> {
        self.inner.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.inner.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for CustomActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomActionRegistry")
            .field("actions", &self.names())
            .finish()
    }
}

/// Set `width` and `height` on matched images from their rendered size.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeasureImages;

#[async_trait(?Send)]
impl CustomAction for MeasureImages {
    fn name(&self) -> &'static str {
        "measureImages"
    }

    async fn run(
        &self,
        document: &mut Document,
        call: CustomCall<'_>,
        ctx: &mut ActionContext<'_>,
    ) -> Result<ActionOutcome, ActionError> {
        if call.matches.is_empty() {
            return Ok(ActionOutcome::message("measured 0 images"));
        }
        let sizes = ctx
            .session
            .image_sizes(call.selector)
            .await
            .map_err(|err| ActionError::Render(err.to_string()))?;

        let mut plan = EditPlan::new();
        let mut measured = 0;
        for (id, size) in call.matches.iter().zip(sizes) {
            if let Some((width, height)) = size {
                plan.set_attribute(*id, "width", &width.to_string());
                plan.set_attribute(*id, "height", &height.to_string());
                measured += 1;
            }
        }
        document.apply(plan);
        Ok(ActionOutcome::message(format!("measured {} images", measured)))
    }
}

/// Resolve the named action and run it over the current matches.
pub async fn run(
    document: &mut Document,
    params: &CustomParams,
    ctx: &mut ActionContext<'_>,
) -> Result<ActionOutcome, ActionError> {
    let selector = required(&params.selector, "customFunc", "selector")?;
    let function = required(&params.function, "customFunc", "function")?;
    let action = ctx
        .custom
        .get(function)
        .ok_or_else(|| ActionError::UnknownCustomAction(function.to_string()))?;
    let matches = document.select(selector)?;
    action
        .run(document, CustomCall { selector, matches }, ctx)
        .await
}
