//! Variable state for a running program.
//!
//! Variables live in an arena of frames. The root frame holds ordinary
//! variables; each lambda invocation pushes a child frame that binds the
//! lambda variable and points at its parent. Reads walk up the parents,
//! writes go to the nearest frame that already holds the name (or the
//! root), and a child frame is released when its scope handle drops.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use scl_core::{ErrorCode, SclError, SclObject, VariableName};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::settings::SclSettings;
use crate::store::StepFactoryStore;

// ──────────────────────────────────────────────
// Console
// ──────────────────────────────────────────────

/// Where `Print` writes.
pub trait Console: Send + Sync {
    fn write_line(&self, line: &str);
}

pub struct StdoutConsole;

impl Console for StdoutConsole {
    fn write_line(&self, line: &str) {
        println!("{}", line);
    }
}

/// Collects printed lines in memory.
#[derive(Default)]
pub struct BufferConsole {
    lines: Mutex<Vec<String>>,
}

impl BufferConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Console for BufferConsole {
    fn write_line(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }
}

// ──────────────────────────────────────────────
// Run context
// ──────────────────────────────────────────────

/// Everything a run needs besides its variables.
pub struct RunContext {
    pub settings: SclSettings,
    pub store: Arc<StepFactoryStore>,
    pub console: Arc<dyn Console>,
    pub cancellation: CancellationToken,
}

impl RunContext {
    pub fn new(store: Arc<StepFactoryStore>) -> Self {
        RunContext {
            settings: SclSettings::default(),
            store,
            console: Arc::new(StdoutConsole),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_settings(mut self, settings: SclSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_console(mut self, console: Arc<dyn Console>) -> Self {
        self.console = console;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }
}

// ──────────────────────────────────────────────
// Frames
// ──────────────────────────────────────────────

struct Frame {
    parent: Option<usize>,
    variables: BTreeMap<VariableName, SclObject>,
}

#[derive(Default)]
struct Frames {
    slots: Vec<Option<Frame>>,
    free: Vec<usize>,
}

impl Frames {
    fn push(&mut self, frame: Frame) -> usize {
        match self.free.pop() {
            Some(id) => {
                self.slots[id] = Some(frame);
                id
            }
            None => {
                self.slots.push(Some(frame));
                self.slots.len() - 1
            }
        }
    }

    fn get(&self, id: usize) -> Option<&Frame> {
        self.slots.get(id).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, id: usize) -> Option<&mut Frame> {
        self.slots.get_mut(id).and_then(Option::as_mut)
    }

    /// The frames visible from `id`, innermost first.
    fn chain(&self, id: usize) -> Vec<usize> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(c) = current {
            chain.push(c);
            current = self.get(c).and_then(|f| f.parent);
        }
        chain
    }

    fn release(&mut self, id: usize) {
        if let Some(slot) = self.slots.get_mut(id) {
            if slot.take().is_some() {
                self.free.push(id);
            }
        }
    }
}

// ──────────────────────────────────────────────
// StateMonad
// ──────────────────────────────────────────────

/// A handle on one frame of the variable arena.
pub struct StateMonad {
    frames: Arc<Mutex<Frames>>,
    frame: usize,
    owns_frame: bool,
    context: Arc<RunContext>,
}

impl StateMonad {
    pub fn new(context: Arc<RunContext>) -> Self {
        let mut frames = Frames::default();
        let root = frames.push(Frame {
            parent: None,
            variables: BTreeMap::new(),
        });
        StateMonad {
            frames: Arc::new(Mutex::new(frames)),
            frame: root,
            owns_frame: true,
            context,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Frames> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn context(&self) -> &Arc<RunContext> {
        &self.context
    }

    pub fn settings(&self) -> &SclSettings {
        &self.context.settings
    }

    pub fn console(&self) -> &dyn Console {
        self.context.console.as_ref()
    }

    pub fn check_cancelled(&self) -> Result<(), SclError> {
        if self.context.cancellation.is_cancelled() {
            Err(ErrorCode::Cancelled.unlocated())
        } else {
            Ok(())
        }
    }

    pub fn try_get_variable(&self, name: &VariableName) -> Option<SclObject> {
        let frames = self.lock();
        frames
            .chain(self.frame)
            .into_iter()
            .find_map(|id| frames.get(id).and_then(|f| f.variables.get(name).cloned()))
    }

    pub fn get_variable(&self, name: &VariableName) -> Result<SclObject, SclError> {
        self.try_get_variable(name)
            .ok_or_else(|| ErrorCode::MissingVariable(name.serialize()).unlocated())
    }

    pub fn set_variable(&self, name: VariableName, value: SclObject) {
        let mut frames = self.lock();
        let chain = frames.chain(self.frame);
        let target = chain
            .iter()
            .copied()
            .find(|id| frames.get(*id).is_some_and(|f| f.variables.contains_key(&name)))
            .or_else(|| chain.last().copied());
        if let Some(frame) = target.and_then(|id| frames.get_mut(id)) {
            trace!(variable = %name, "set variable");
            frame.variables.insert(name, value);
        }
    }

    /// A child scope with `name` bound to `value`. The binding disappears
    /// when the returned handle is dropped.
    pub fn scoped(&self, name: VariableName, value: SclObject) -> StateMonad {
        let mut variables = BTreeMap::new();
        variables.insert(name, value);
        let frame = self.lock().push(Frame {
            parent: Some(self.frame),
            variables,
        });
        StateMonad {
            frames: self.frames.clone(),
            frame,
            owns_frame: true,
            context: self.context.clone(),
        }
    }
}

impl Drop for StateMonad {
    fn drop(&mut self) {
        if self.owns_frame {
            self.lock().release(self.frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> StateMonad {
        let store = Arc::new(StepFactoryStore::builder().build());
        StateMonad::new(Arc::new(RunContext::new(store)))
    }

    #[test]
    fn scoped_bindings_shadow_and_disappear() {
        let state = state();
        let x = VariableName::new("x");
        state.set_variable(x.clone(), SclObject::Int(1));
        {
            let inner = state.scoped(x.clone(), SclObject::Int(2));
            assert_eq!(inner.get_variable(&x).unwrap(), SclObject::Int(2));
            assert_eq!(state.get_variable(&x).unwrap(), SclObject::Int(1));
        }
        assert_eq!(state.get_variable(&x).unwrap(), SclObject::Int(1));
    }

    #[test]
    fn writes_in_a_scope_reach_the_root() {
        let state = state();
        let total = VariableName::new("total");
        {
            let inner = state.scoped(VariableName::item(), SclObject::Int(5));
            inner.set_variable(total.clone(), SclObject::Int(5));
        }
        assert_eq!(state.get_variable(&total).unwrap(), SclObject::Int(5));
        assert!(state.try_get_variable(&VariableName::item()).is_none());
    }

    #[test]
    fn released_frames_are_reused() {
        let state = state();
        let first = state.scoped(VariableName::item(), SclObject::Unit).frame;
        let second = state.scoped(VariableName::item(), SclObject::Unit).frame;
        assert_eq!(first, second);
    }

    #[test]
    fn missing_variable_is_an_error() {
        let err = state().get_variable(&VariableName::new("nope")).unwrap_err();
        assert!(matches!(err.codes().next(), Some(ErrorCode::MissingVariable(_))));
    }

    #[test]
    fn cancellation_is_observed() {
        let state = state();
        assert!(state.check_cancelled().is_ok());
        state.context().cancellation.cancel();
        assert!(state.check_cancelled().unwrap_err().is_cancelled());
    }
}
