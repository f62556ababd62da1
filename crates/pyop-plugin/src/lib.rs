//! The PyOp kernel plugin.
//!
//! A PyOp node names a `module` and a `function`; its kernel calls that
//! function in the embedded runtime with the node's inputs and hands the
//! returned array back to the engine as an int32 tensor.
//!
//! Hosts load the built `cdylib` and talk to it through the five entry points
//! in [`abi`]. Rust callers can use [`PluginCatalog`], [`PyOpKernel`] and
//! [`invoke_once`] directly against a lifecycle of their own.
//!
//! The process-wide runtime is CPython when the `python` feature is enabled
//! and the native runtime with its standard library otherwise.

use std::sync::{Arc, OnceLock};

use pyop_runtime::{RuntimeConfig, RuntimeLifecycle};
use tracing_subscriber::EnvFilter;

pub mod abi;
pub mod catalog;
pub mod error;
pub mod kernel;
pub mod oneshot;

pub use abi::{OwnedKernels, OwnedSchemas, ShutdownPyOpRuntime};
pub use catalog::{PluginCatalog, pyop_kernel_def, pyop_schema};
pub use error::KernelError;
pub use kernel::PyOpKernel;
pub use oneshot::invoke_once;

#[cfg(feature = "python")]
pub type DefaultRuntime = pyop_runtime::PythonRuntime;
#[cfg(not(feature = "python"))]
pub type DefaultRuntime = pyop_runtime::NativeRuntime;

/// Environment variable holding the plugin's log filter.
pub const LOG_ENV: &str = "PYOP_LOG";

/// A fresh, not yet initialized instance of [`DefaultRuntime`].
#[cfg(feature = "python")]
pub fn default_runtime() -> DefaultRuntime {
    pyop_runtime::PythonRuntime::new()
}

#[cfg(not(feature = "python"))]
pub fn default_runtime() -> DefaultRuntime {
    pyop_runtime::NativeRuntime::with_standard_library()
}

static SHARED: OnceLock<Result<Arc<RuntimeLifecycle<DefaultRuntime>>, String>> = OnceLock::new();
static CATALOG: OnceLock<PluginCatalog<DefaultRuntime>> = OnceLock::new();

/// The process-wide runtime lifecycle, created on first use from the
/// discovered settings.
///
/// A settings failure is remembered: every later call reports it again.
pub fn shared_lifecycle() -> Result<Arc<RuntimeLifecycle<DefaultRuntime>>, KernelError> {
    SHARED
        .get_or_init(|| match RuntimeConfig::discover() {
            Ok(config) => Ok(RuntimeLifecycle::new(default_runtime(), config)),
            Err(e) => {
                tracing::error!(error = %e, "Cannot load PyOp runtime settings");
                Err(e.to_string())
            }
        })
        .clone()
        .map_err(KernelError::Config)
}

/// Catalog whose kernels share [`shared_lifecycle`].
pub fn shared_catalog() -> &'static PluginCatalog<DefaultRuntime> {
    CATALOG.get_or_init(|| PluginCatalog::with_source(shared_lifecycle))
}

/// Finalizes the process-wide runtime, if it was ever started.
///
/// Call this once the host has dropped every PyOp kernel. Kernels created
/// afterwards fail to construct.
pub fn shutdown() -> Result<(), KernelError> {
    match SHARED.get() {
        Some(Ok(lifecycle)) => Ok(lifecycle.shutdown()?),
        _ => Ok(()),
    }
}

/// Installs a stderr subscriber filtered by `PYOP_LOG` (default `warn`).
///
/// Does nothing if the host process already installed one.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
