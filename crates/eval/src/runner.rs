//! Entry points: text in, frozen or executed program out.

use std::sync::Arc;

use scl_core::{parse, ErrorCode, SclError, SclObject, TypeReference};
use tracing::{debug, info};

use crate::freeze::freeze;
use crate::resolver::{CallerMetadata, TypeResolver};
use crate::settings::SclSettings;
use crate::state::{RunContext, StateMonad};
use crate::step::Step;
use crate::store::StepFactoryStore;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("run cancelled")]
    Cancelled,
    #[error(transparent)]
    Failed(#[from] SclError),
}

impl RunError {
    /// The underlying errors, empty for a cancelled run.
    pub fn scl_error(&self) -> Option<&SclError> {
        match self {
            RunError::Cancelled => None,
            RunError::Failed(e) => Some(e),
        }
    }
}

/// Parse and freeze a whole program. The result must produce Unit.
pub fn freeze_program(text: &str, store: &Arc<StepFactoryStore>) -> Result<Arc<dyn Step>, SclError> {
    let top = parse(text)?;
    let resolver = TypeResolver::try_create(Arc::clone(store), &top)?;
    let frozen = freeze(&top, &CallerMetadata::top_level(), &resolver)?;
    match frozen.output_type() {
        TypeReference::Any | TypeReference::Unknown => {}
        t if *t == TypeReference::UNIT => {}
        t => {
            debug!(output = %t, "program does not end in a unit step");
            return Err(ErrorCode::SequenceFinalTypeNotUnit.at_step(frozen.name(), frozen.location()));
        }
    }
    Ok(frozen)
}

/// Freeze the program and check the requirements of every step in it.
pub fn check(
    text: &str,
    store: &Arc<StepFactoryStore>,
    settings: &SclSettings,
) -> Result<Arc<dyn Step>, SclError> {
    let frozen = freeze_program(text, store)?;
    frozen.verify(settings)?;
    Ok(frozen)
}

/// Canonical SCL text for a program.
pub fn format(text: &str, store: &Arc<StepFactoryStore>) -> Result<String, SclError> {
    Ok(freeze_program(text, store)?.serialize())
}

/// Freeze, verify and execute a program. Cancelling the context's token
/// stops the run at the next await point.
pub async fn run(text: &str, context: Arc<RunContext>) -> Result<SclObject, RunError> {
    let frozen = check(text, &context.store, &context.settings)?;
    let token = context.cancellation.clone();
    let state = StateMonad::new(context);
    info!(target: "scl", step = frozen.name(), "running program");
    tokio::select! {
        _ = token.cancelled() => Err(RunError::Cancelled),
        result = frozen.run(&state) => match result {
            Err(e) if e.is_cancelled() => Err(RunError::Cancelled),
            other => Ok(other?),
        },
    }
}
