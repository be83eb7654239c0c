//! HTML to AMP conversion pipeline.
//!
//! A page is loaded through a [`render::RenderProvider`], parsed into a [`document::Document`]
//! and rewritten by declarative steps ([`schema::Step`]). The [`runner::StepRunner`] executes
//! the steps and the [`orchestrator::Orchestrator`] drives a whole run end to end.

pub mod actions;
pub mod artifacts;
pub mod compare;
pub mod context;
pub mod css;
pub mod document;
pub mod env;
pub mod orchestrator;
pub mod render;
pub mod runner;
pub mod schema;
pub mod validation;
pub mod watermark;

pub use artifacts::{ArtifactStore, FsArtifactStore};
pub use context::{RunContext, StyleTable};
pub use document::Document;
pub use env::EnvVars;
pub use orchestrator::{Orchestrator, RunOptions, RunOutcome};
pub use runner::{StepReport, StepRunner};
pub use schema::{Action, ActionSpec, Step};
pub use validation::{Diagnostic, Diagnostics, Validator};
