use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::{RuntimeConfig, TeardownPolicy};
use crate::error::RuntimeError;
use crate::foreign::ForeignRuntime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Dormant,
    Live,
    TornDown,
}

struct State<R> {
    runtime: R,
    phase: Phase,
    owners: usize,
}

/// Process-wide owner of an embedded runtime.
///
/// The lifecycle initializes the runtime on the first [`acquire`] and hands
/// out [`RuntimeHandle`]s, one per owner. Every entry into the runtime goes
/// through [`RuntimeHandle::enter`], which holds the lifecycle's single lock
/// for the duration of the call, so callers on different threads never
/// interleave inside the interpreter.
///
/// A runtime is initialized at most once. After teardown (explicit
/// [`shutdown`], or the last release under
/// [`TeardownPolicy::OnLastRelease`]) every further `acquire` fails.
///
/// [`acquire`]: RuntimeLifecycle::acquire
/// [`shutdown`]: RuntimeLifecycle::shutdown
pub struct RuntimeLifecycle<R: ForeignRuntime> {
    config: RuntimeConfig,
    state: Mutex<State<R>>,
}

impl<R: ForeignRuntime> RuntimeLifecycle<R> {
    pub fn new(runtime: R, config: RuntimeConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: Mutex::new(State {
                runtime,
                phase: Phase::Dormant,
                owners: 0,
            }),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Registers a new owner, initializing the runtime if this is the first.
    pub fn acquire(self: &Arc<Self>) -> Result<RuntimeHandle<R>, RuntimeError> {
        let mut state = self.state.lock();
        let runtime = state.runtime.name();
        match state.phase {
            Phase::Live => {}
            Phase::Dormant => {
                if let Err(e) = state.runtime.initialize(&self.config) {
                    tracing::error!(runtime, error = %e, "Embedded runtime failed to initialize");
                    return Err(e);
                }
                state.phase = Phase::Live;
                tracing::info!(
                    runtime,
                    search_paths = ?self.config.search_paths,
                    "Embedded runtime initialized"
                );
            }
            Phase::TornDown => {
                return Err(RuntimeError::Resource(format!(
                    "{runtime} runtime has already been torn down"
                )));
            }
        }
        state.owners += 1;
        tracing::debug!(runtime, owners = state.owners, "Runtime acquired");
        Ok(RuntimeHandle {
            lifecycle: Arc::clone(self),
        })
    }

    /// Finalizes the runtime. Further `acquire` calls fail.
    ///
    /// Must only be called once every handle has stopped using the runtime.
    /// Calling it again is a no-op.
    pub fn shutdown(&self) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        if state.owners > 0 {
            tracing::warn!(
                owners = state.owners,
                "Shutting down the embedded runtime while handles are outstanding"
            );
        }
        Self::teardown(&mut state)
    }

    pub fn owners(&self) -> usize {
        self.state.lock().owners
    }

    pub fn is_live(&self) -> bool {
        self.state.lock().phase == Phase::Live
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.owners = state.owners.saturating_sub(1);
        tracing::debug!(owners = state.owners, "Runtime released");
        if state.owners == 0
            && state.phase == Phase::Live
            && self.config.teardown == TeardownPolicy::OnLastRelease
        {
            // Failure is already logged by teardown; nothing can be resurrected.
            let _ = Self::teardown(&mut state);
        }
    }

    fn teardown(state: &mut State<R>) -> Result<(), RuntimeError> {
        let runtime = state.runtime.name();
        match state.phase {
            Phase::TornDown => {
                tracing::debug!(runtime, "Runtime already torn down");
                Ok(())
            }
            Phase::Dormant => {
                state.phase = Phase::TornDown;
                Ok(())
            }
            Phase::Live => {
                state.phase = Phase::TornDown;
                match state.runtime.finalize() {
                    Ok(()) => {
                        tracing::info!(runtime, "Embedded runtime finalized");
                        Ok(())
                    }
                    Err(e) => {
                        tracing::warn!(runtime, error = %e, "Embedded runtime teardown failed");
                        Err(e)
                    }
                }
            }
        }
    }
}

/// One registered owner of the embedded runtime.
///
/// Dropping the handle gives the ownership back to the lifecycle.
pub struct RuntimeHandle<R: ForeignRuntime> {
    lifecycle: Arc<RuntimeLifecycle<R>>,
}

impl<R: ForeignRuntime> RuntimeHandle<R> {
    /// Runs `f` inside the runtime's critical section.
    pub fn enter<T>(
        &self,
        f: impl FnOnce(&R) -> Result<T, RuntimeError>,
    ) -> Result<T, RuntimeError> {
        let state = self.lifecycle.state.lock();
        if state.phase != Phase::Live {
            return Err(RuntimeError::Resource(format!(
                "{} runtime is not live",
                state.runtime.name()
            )));
        }
        f(&state.runtime)
    }

    /// Releases a callable inside the critical section.
    ///
    /// If the runtime is already gone the reference is leaked instead:
    /// releasing it would touch a finalized interpreter.
    pub fn retire_callable(&self, callable: R::Callable) {
        let state = self.lifecycle.state.lock();
        if state.phase == Phase::Live {
            state.runtime.release_callable(callable);
        } else {
            tracing::warn!(
                runtime = state.runtime.name(),
                "Runtime torn down before callable was released; leaking reference"
            );
            std::mem::forget(callable);
        }
    }

    pub fn lifecycle(&self) -> &Arc<RuntimeLifecycle<R>> {
        &self.lifecycle
    }
}

impl<R: ForeignRuntime> Drop for RuntimeHandle<R> {
    fn drop(&mut self) {
        self.lifecycle.release();
    }
}
