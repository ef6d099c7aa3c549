//! The underlying system heap.
//!
//! Pages and `external`-header descriptors are bulk byte arrays sourced from
//! here and returned here; the rest of the crate never calls into `libc`
//! directly. Bypassing the free list (`use_system_heap`) also routes through
//! this module so the same failure path (`out-of-memory`) applies uniformly.

use log::{debug, warn};

use crate::error::{PoolError, PoolResult};
use crate::header::Descriptor;

/// Acquires a `size`-byte page aligned to at least `align` bytes.
///
/// # Safety
/// The returned pointer is owned by the caller and must eventually be passed
/// to [`release_page`] exactly once.
pub(crate) unsafe fn acquire_page(size: usize, align: usize) -> PoolResult<*mut u8> {
    let align = align.max(std::mem::align_of::<usize>());
    let mut ptr: *mut libc::c_void = std::ptr::null_mut();
    let rc = unsafe { libc::posix_memalign(&mut ptr, align, size) };
    if rc != 0 || ptr.is_null() {
        warn!("system heap refused a {size}-byte page aligned to {align} (errno {rc})");
        return Err(PoolError::OutOfMemory);
    }
    debug!("acquired page of {size} bytes at {ptr:p}");
    Ok(ptr as *mut u8)
}

/// # Safety
/// `ptr` must have come from [`acquire_page`] and not yet have been released.
pub(crate) unsafe fn release_page(ptr: *mut u8) {
    unsafe {
        libc::free(ptr as *mut libc::c_void);
    }
}

/// Allocates a single `size`-byte object directly from the system heap,
/// bypassing pages and the free list entirely (`use_system_heap` mode).
///
/// # Safety
/// The returned pointer must eventually be passed to [`release_object`].
pub(crate) unsafe fn acquire_object(size: usize) -> PoolResult<*mut u8> {
    let ptr = unsafe { libc::malloc(size.max(1)) };
    if ptr.is_null() {
        warn!("system heap refused a {size}-byte object");
        return Err(PoolError::OutOfMemory);
    }
    Ok(ptr as *mut u8)
}

/// # Safety
/// `ptr` must have come from [`acquire_object`] and not yet have been released.
pub(crate) unsafe fn release_object(ptr: *mut u8) {
    unsafe {
        libc::free(ptr as *mut libc::c_void);
    }
}

/// Allocates an out-of-band descriptor for an `external` header slot.
///
/// # Safety
/// The returned pointer must eventually be passed to [`free_descriptor`].
pub(crate) unsafe fn alloc_descriptor(descriptor: Descriptor) -> PoolResult<*mut Descriptor> {
    let raw = unsafe { libc::malloc(std::mem::size_of::<Descriptor>()) } as *mut Descriptor;
    if raw.is_null() {
        warn!("system heap refused a descriptor allocation");
        return Err(PoolError::OutOfMemory);
    }
    unsafe {
        raw.write(descriptor);
    }
    Ok(raw)
}

/// Drops and frees a descriptor previously returned by [`alloc_descriptor`].
///
/// # Safety
/// `ptr` must have come from [`alloc_descriptor`] and not yet have been freed.
pub(crate) unsafe fn free_descriptor(ptr: *mut Descriptor) {
    unsafe {
        ptr.drop_in_place();
        libc::free(ptr as *mut libc::c_void);
    }
}
