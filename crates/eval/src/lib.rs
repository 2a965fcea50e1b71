//! SCL evaluator -- resolves variable types, freezes parsed step trees
//! against a step catalog and runs the frozen steps.
//!
//! Freezing happens once per program: every step is matched to a factory,
//! every parameter checked against its declared type, and every generic
//! step specialised. Running a frozen step cannot fail on a type mismatch.

#![allow(clippy::result_large_err)]

pub mod descriptor;
pub mod freeze;
pub mod resolver;
pub mod runner;
pub mod settings;
pub mod state;
pub mod step;
pub mod steps;
pub mod store;

pub use descriptor::{ParameterKind, ParameterSpec, Requirement, StepDescriptor, TypeTemplate};
pub use freeze::{freeze, output_type_reference};
pub use resolver::{CallerMetadata, TypeResolver};
pub use runner::{check, format, freeze_program, run, RunError};
pub use settings::{ConnectorSettings, SclSettings};
pub use state::{BufferConsole, Console, RunContext, StateMonad, StdoutConsole};
pub use step::{CompoundStep, ConstantStep, CreateEntityStep, FrozenProperty, Step};
pub use store::{StepFactory, StepFactoryStore, StepFactoryStoreBuilder};
