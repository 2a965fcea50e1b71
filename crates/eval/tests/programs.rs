//! End-to-end programs: parse, freeze, run and inspect console output.

use std::sync::Arc;

use async_trait::async_trait;
use scl_core::{ErrorCode, SclError, SclObject, TypeReference};
use scl_eval::descriptor::{ParameterSpec, Requirement, StepDescriptor, TypeTemplate};
use scl_eval::{
    check, format, freeze_program, run, BufferConsole, CompoundStep, RunContext, RunError,
    SclSettings, StateMonad, Step, StepFactory, StepFactoryStore,
};
use tokio_util::sync::CancellationToken;

fn store() -> Arc<StepFactoryStore> {
    Arc::new(StepFactoryStore::with_core_steps())
}

async fn run_program(text: &str) -> (Result<SclObject, RunError>, Vec<String>) {
    let console = Arc::new(BufferConsole::new());
    let context = RunContext::new(store()).with_console(console.clone());
    let result = run(text, Arc::new(context)).await;
    (result, console.lines())
}

async fn output_of(text: &str) -> Vec<String> {
    let (result, lines) = run_program(text).await;
    if let Err(e) = result {
        panic!("program failed: {e}");
    }
    lines
}

fn has_code(err: &SclError, pred: impl Fn(&ErrorCode) -> bool) -> bool {
    err.codes().any(pred)
}

// ──────────────────────────────────────────────
// Operators
// ──────────────────────────────────────────────

#[tokio::test]
async fn entity_combine_later_values_win() {
    let lines = output_of("Print ((Foo: 1, Bar: 1) + (Bar: 2))").await;
    assert_eq!(lines, vec!["(Foo: 1 Bar: 2)"]);
}

#[tokio::test]
async fn mixed_product_promotes_the_integer() {
    let lines = output_of("Print (2 * 3.0)").await;
    assert_eq!(lines, vec!["6.0"]);
}

#[tokio::test]
async fn integer_arithmetic_and_variables() {
    let lines = output_of("- <x> = 2\n- <y> = <x> * 3 + 1\n- Print <y>").await;
    assert_eq!(lines, vec!["7"]);
}

#[tokio::test]
async fn divide_by_zero_fails_the_run() {
    let (result, _) = run_program("Print (1 / 0)").await;
    let err = result.unwrap_err();
    let scl = err.scl_error().unwrap();
    assert!(has_code(scl, |c| matches!(c, ErrorCode::DivideByZero)));
}

#[tokio::test]
async fn comparing_arrays_is_rejected_when_freezing() {
    let err = freeze_program("Print (['abc', '123'] == ['abc', '123'])", &store())
        .err()
        .unwrap();
    assert!(has_code(&err, |c| matches!(c, ErrorCode::TypeNotComparable(_))));
}

#[tokio::test]
async fn chained_comparison() {
    let lines = output_of("- Print (1 < 2)\n- Print ('b' > 'a')").await;
    assert_eq!(lines, vec!["true", "true"]);
}

#[tokio::test]
async fn entity_set_value_merges_nested_entities() {
    let lines = output_of(
        "- <e> = EntitySetValue (A: (X: 1)) 'A' (Y: 2)\n- Print (EntityGetValue <e> 'A.X')\n- Print (EntityGetValue <e> 'A.Y')",
    )
    .await;
    assert_eq!(lines, vec!["1", "2"]);
}

// ──────────────────────────────────────────────
// Programs
// ──────────────────────────────────────────────

#[test]
fn final_step_of_a_program_must_be_unit() {
    let err = freeze_program("- Print 1\n- 123", &store()).err().unwrap();
    assert!(has_code(&err, |c| matches!(c, ErrorCode::SequenceFinalTypeNotUnit)));

    assert!(freeze_program("- Print 1\n- Print 123", &store()).is_ok());
}

#[test]
fn format_is_stable() {
    let store = store();
    let once = format("- <x> = 1\n- print <x>", &store).unwrap();
    assert_eq!(once, "- <x> = 1\n- Print Value: <x>");
    assert_eq!(format(&once, &store).unwrap(), once);
}

#[tokio::test]
async fn arrays_lambdas_and_foreach() {
    let lines = output_of(
        "- <doubled> = ArrayMap [1, 2, 3] (<n> => <n> * 2)\n- Print <doubled>\n- ForEach (ArrayFilter <doubled> (<n> => <n> > 2)) (<n> => Print <n>)",
    )
    .await;
    assert_eq!(lines, vec!["[2, 4, 6]", "4", "6"]);
}

#[tokio::test]
async fn foreach_visits_every_element_and_combines_failures() {
    let (result, lines) = run_program("ForEach [1, 0, 2, 0] (<x> => Print (10 / <x>))").await;
    assert_eq!(lines, vec!["10", "5"]);
    let err = result.unwrap_err();
    let divide_by_zero = err
        .scl_error()
        .unwrap()
        .codes()
        .filter(|c| matches!(c, ErrorCode::DivideByZero))
        .count();
    assert_eq!(divide_by_zero, 2);
}

#[tokio::test]
async fn take_on_a_lazy_range_only_reads_what_it_needs() {
    let lines = output_of("Print (ArrayTake (Range 0 1000000000) 3)").await;
    assert_eq!(lines, vec!["[0, 1, 2]"]);
}

#[tokio::test]
async fn assert_error_passes_on_failure() {
    let (result, _) = run_program("AssertError (ArrayElementAtIndex [1, 2] 5)").await;
    assert_eq!(result.unwrap(), SclObject::Unit);

    let (result, _) = run_program("AssertError (Print 1)").await;
    let err = result.unwrap_err();
    assert!(has_code(err.scl_error().unwrap(), |c| matches!(c, ErrorCode::AssertionFailed(_))));
}

#[tokio::test]
async fn if_chooses_a_branch() {
    let lines = output_of("If (1 > 2) (Print 'yes') (Print 'no')").await;
    assert_eq!(lines, vec!["no"]);
}

// ──────────────────────────────────────────────
// Schemas
// ──────────────────────────────────────────────

const BAR_SCHEMA: &str =
    "- <schema> = (Name: 'Test' Properties: (Bar: (Type: 'Integer' Multiplicity: 'ExactlyOne')))\n";

#[tokio::test]
async fn schema_validate_reports_missing_property() {
    let program = format!("{BAR_SCHEMA}- Print (SchemaValidate [(Foo: 'Hello')] <schema>)");
    let (result, lines) = run_program(&program).await;
    let err = result.unwrap_err();
    assert!(has_code(err.scl_error().unwrap(), |c| {
        matches!(c, ErrorCode::SchemaViolationMissingProperty(p) if p == "Bar")
    }));
    assert!(lines.is_empty());
}

#[tokio::test]
async fn schema_validate_reports_wrong_type() {
    let program = "- <schema> = (Name: 'Test' Properties: (Foo: (Type: 'Integer')))\n- Print (SchemaValidate [(Foo: 'Hello')] <schema>)";
    let (result, _) = run_program(program).await;
    let err = result.unwrap_err();
    assert!(err.to_string().contains("Could not convert 'Hello' to Integer"));
}

#[tokio::test]
async fn schema_validate_skip_drops_bad_entities() {
    let program = format!(
        "{BAR_SCHEMA}- Print (ArrayLength (SchemaValidate [(Foo: 'Hello'), (Bar: '3')] <schema> ErrorBehaviour.Skip))"
    );
    let lines = output_of(&program).await;
    assert_eq!(lines, vec!["1"]);
}

#[tokio::test]
async fn schema_create_infers_from_entities() {
    let lines = output_of(
        "- <s> = SchemaCreate [(Name: 'a', Age: 1), (Name: 'b', Age: 2)] 'People'\n- Print (EntityGetValue <s> 'title')",
    )
    .await;
    assert_eq!(lines, vec!["People"]);
}

// ──────────────────────────────────────────────
// Requirements and cancellation
// ──────────────────────────────────────────────

struct ReadFile {
    descriptor: StepDescriptor,
}

impl ReadFile {
    fn new() -> Self {
        let requirement = Requirement::connector("FileSystem")
            .with_version(">=1.2")
            .unwrap();
        ReadFile {
            descriptor: StepDescriptor::new("ReadFile", TypeTemplate::exact(TypeReference::UNIT))
                .parameter(ParameterSpec::step("Path", TypeTemplate::exact(TypeReference::STRING)).at(0))
                .requires(requirement),
        }
    }
}

#[async_trait]
impl StepFactory for ReadFile {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, _step: &CompoundStep, _state: &StateMonad) -> Result<SclObject, SclError> {
        Ok(SclObject::Unit)
    }
}

#[test]
fn requirements_are_checked_against_settings() {
    let store = Arc::new(StepFactoryStore::builder().core_steps().register(ReadFile::new()).build());

    let err = check("ReadFile 'a.txt'", &store, &SclSettings::default())
        .err()
        .unwrap();
    assert!(has_code(&err, |c| matches!(c, ErrorCode::RequirementsNotMet { .. })));

    let old = SclSettings::default().with_connector("FileSystem", "1.1.0");
    assert!(check("ReadFile 'a.txt'", &store, &old).is_err());

    let current = SclSettings::default().with_connector("filesystem", "1.3.0");
    let frozen = check("ReadFile 'a.txt'", &store, &current).unwrap();
    assert_eq!(frozen.name(), "ReadFile");
}

#[tokio::test]
async fn cancelled_runs_stop() {
    let console = Arc::new(BufferConsole::new());
    let token = CancellationToken::new();
    token.cancel();
    let context = RunContext::new(store())
        .with_console(console.clone())
        .with_cancellation(token);
    let result = run("ForEach (Range 0 1000000) (<x> => Print <x>)", Arc::new(context)).await;
    assert!(matches!(result, Err(RunError::Cancelled)));
    assert!(console.lines().is_empty());
}
