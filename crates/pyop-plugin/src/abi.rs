//! C entry points the host loader resolves by name.
//!
//! Containers are allocated here and must be returned to the matching
//! `Free*` function of this same library.
//!
//! Kernels start the embedded runtime on demand and it stays up after the
//! last one is released. A host that wants it finalized before unloading
//! the library calls [`ShutdownPyOpRuntime`] once every PyOp kernel has been
//! dropped.

use std::ops::Deref;
use std::ptr::NonNull;

use pyop_core::{KernelsContainer, SchemasContainer};

/// Returns every kernel this plugin provides.
///
/// The caller owns the container and releases it with
/// [`FreeKernelsContainer`].
#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub extern "C" fn GetAllKernels() -> *mut KernelsContainer {
    crate::init_logging();
    let container = crate::shared_catalog().kernels();
    tracing::debug!(kernels = container.kernels.len(), "Handing kernels to host");
    Box::into_raw(Box::new(container))
}

/// Returns the operator schemas this plugin provides.
///
/// The caller owns the container and releases it with
/// [`FreeSchemasContainer`].
#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub extern "C" fn GetAllSchemas() -> *mut SchemasContainer {
    crate::init_logging();
    let container = crate::shared_catalog().schemas();
    tracing::debug!(schemas = container.schemas.len(), "Handing schemas to host");
    Box::into_raw(Box::new(container))
}

/// Releases a container returned by [`GetAllKernels`]. Null is ignored.
///
/// # Safety
///
/// `container` must be null or a pointer obtained from [`GetAllKernels`]
/// that has not been freed yet.
#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub unsafe extern "C" fn FreeKernelsContainer(container: *mut KernelsContainer) {
    if container.is_null() {
        return;
    }
    // SAFETY: non-null pointers come from Box::into_raw in GetAllKernels and
    // the caller guarantees this is the only free.
    drop(unsafe { Box::from_raw(container) });
}

/// Releases a container returned by [`GetAllSchemas`]. Null is ignored.
///
/// # Safety
///
/// `container` must be null or a pointer obtained from [`GetAllSchemas`]
/// that has not been freed yet.
#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub unsafe extern "C" fn FreeSchemasContainer(container: *mut SchemasContainer) {
    if container.is_null() {
        return;
    }
    // SAFETY: as in FreeKernelsContainer.
    drop(unsafe { Box::from_raw(container) });
}

/// Finalizes the process-wide embedded runtime.
///
/// Returns 0 on success, including when the runtime was never started or is
/// already down, and 1 if finalization failed. Kernels created afterwards
/// fail with an engine error.
#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub extern "C" fn ShutdownPyOpRuntime() -> i32 {
    match crate::shutdown() {
        Ok(()) => 0,
        Err(e) => {
            tracing::warn!(error = %e, "PyOp runtime shutdown failed");
            1
        }
    }
}

/// Kernels container that frees itself through [`FreeKernelsContainer`].
pub struct OwnedKernels(NonNull<KernelsContainer>);

impl OwnedKernels {
    pub fn get_all() -> Option<Self> {
        NonNull::new(GetAllKernels()).map(Self)
    }

    /// # Safety
    ///
    /// `ptr` must come from [`GetAllKernels`] and must not be freed by
    /// anyone else.
    pub unsafe fn from_raw(ptr: *mut KernelsContainer) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    /// Gives up ownership without freeing.
    pub fn into_raw(self) -> *mut KernelsContainer {
        let ptr = self.0.as_ptr();
        std::mem::forget(self);
        ptr
    }
}

impl Deref for OwnedKernels {
    type Target = KernelsContainer;

    fn deref(&self) -> &KernelsContainer {
        // SAFETY: the pointer is live until this guard drops.
        unsafe { self.0.as_ref() }
    }
}

impl Drop for OwnedKernels {
    fn drop(&mut self) {
        // SAFETY: this guard is the container's only owner.
        unsafe { FreeKernelsContainer(self.0.as_ptr()) }
    }
}

/// Schemas container that frees itself through [`FreeSchemasContainer`].
pub struct OwnedSchemas(NonNull<SchemasContainer>);

impl OwnedSchemas {
    pub fn get_all() -> Option<Self> {
        NonNull::new(GetAllSchemas()).map(Self)
    }

    /// # Safety
    ///
    /// `ptr` must come from [`GetAllSchemas`] and must not be freed by
    /// anyone else.
    pub unsafe fn from_raw(ptr: *mut SchemasContainer) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn into_raw(self) -> *mut SchemasContainer {
        let ptr = self.0.as_ptr();
        std::mem::forget(self);
        ptr
    }
}

impl Deref for OwnedSchemas {
    type Target = SchemasContainer;

    fn deref(&self) -> &SchemasContainer {
        // SAFETY: the pointer is live until this guard drops.
        unsafe { self.0.as_ref() }
    }
}

impl Drop for OwnedSchemas {
    fn drop(&mut self) {
        // SAFETY: this guard is the container's only owner.
        unsafe { FreeSchemasContainer(self.0.as_ptr()) }
    }
}
