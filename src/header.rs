//! Per-slot header writer/reader.
//!
//! A header's byte layout depends on the configured [`HeaderKind`]; these
//! functions operate on a raw pointer to the *start of the header region*,
//! which the caller derives as `user_ptr - left_pad_bytes - header_bytes`.
//!
//! `basic`:    [ alloc_counter: u32 | in_use: u8 ]
//! `extended`: [ user bytes | use_counter: u16 | alloc_counter: u32 | in_use: u8 ]
//! `external`: [ descriptor_ptr: usize ]

use crate::config::HeaderKind;
use crate::system_heap;

/// Out-of-band bookkeeping for an `external`-header slot.
pub(crate) struct Descriptor {
    pub in_use: bool,
    pub allocation_number: u32,
    pub label: Vec<u8>,
}

/// Zeros `len` header bytes at page-build time.
///
/// # Safety
/// `header_ptr` must be valid for writes of `len` bytes.
pub(crate) unsafe fn zero(header_ptr: *mut u8, len: usize) {
    if len > 0 {
        unsafe {
            std::ptr::write_bytes(header_ptr, 0, len);
        }
    }
}

/// Marks a header in-use after a slot has been popped off the free list.
///
/// `descriptor` must be `Some` (and already have `in_use`/`allocation_number`
/// set) exactly when `kind` is [`HeaderKind::External`].
///
/// # Safety
/// `header_ptr` must point at a header region matching `kind`'s size.
pub(crate) unsafe fn on_acquire(
    kind: &HeaderKind,
    header_ptr: *mut u8,
    allocation_number: u32,
    descriptor: Option<*mut Descriptor>,
) {
    match kind {
        HeaderKind::None => {}
        HeaderKind::Basic => unsafe {
            header_ptr.cast::<u32>().write_unaligned(allocation_number);
            header_ptr.add(4).write(1);
        },
        HeaderKind::Extended { user_defined_bytes } => unsafe {
            let counter_ptr = header_ptr.add(*user_defined_bytes).cast::<u16>();
            let current = counter_ptr.read_unaligned();
            counter_ptr.write_unaligned(current.wrapping_add(1));
            header_ptr
                .add(*user_defined_bytes + 2)
                .cast::<u32>()
                .write_unaligned(allocation_number);
            header_ptr.add(*user_defined_bytes + 6).write(1);
        },
        HeaderKind::External => unsafe {
            let raw = descriptor.expect("external header kind requires a pre-allocated descriptor");
            header_ptr.cast::<usize>().write_unaligned(raw as usize);
        },
    }
}

/// Marks a header not-in-use after a slot has been pushed onto the free list.
///
/// For `external` headers, this also frees the descriptor and nulls the
/// pointer stored in the page.
///
/// # Safety
/// `header_ptr` must point at a header region matching `kind`'s size.
pub(crate) unsafe fn on_release(kind: &HeaderKind, header_ptr: *mut u8) {
    match kind {
        HeaderKind::None => {}
        HeaderKind::Basic => unsafe {
            header_ptr.cast::<u32>().write_unaligned(0);
            header_ptr.add(4).write(0);
        },
        HeaderKind::Extended { user_defined_bytes } => unsafe {
            header_ptr
                .add(*user_defined_bytes + 2)
                .cast::<u32>()
                .write_unaligned(0);
            header_ptr.add(*user_defined_bytes + 6).write(0);
        },
        HeaderKind::External => unsafe {
            let raw = header_ptr.cast::<usize>().read_unaligned() as *mut Descriptor;
            if !raw.is_null() {
                (*raw).in_use = false;
                (*raw).allocation_number = 0;
                system_heap::free_descriptor(raw);
            }
            header_ptr.cast::<usize>().write_unaligned(0);
        },
    }
}

/// Reads a header's in-use bit. Must not be called for [`HeaderKind::None`];
/// callers scan the free list instead (see `ObjectPool::slot_in_use`).
///
/// # Safety
/// `header_ptr` must point at a header region matching `kind`'s size.
pub(crate) unsafe fn is_in_use(kind: &HeaderKind, header_ptr: *mut u8) -> bool {
    match kind {
        HeaderKind::None => unreachable!("HeaderKind::None has no in-use flag to read"),
        HeaderKind::Basic => unsafe { header_ptr.add(4).read() != 0 },
        HeaderKind::Extended { user_defined_bytes } => unsafe {
            header_ptr.add(*user_defined_bytes + 6).read() != 0
        },
        HeaderKind::External => unsafe {
            let raw = header_ptr.cast::<usize>().read_unaligned() as *const Descriptor;
            if raw.is_null() {
                false
            } else {
                (*raw).in_use
            }
        },
    }
}

/// Reads a header's allocation counter; used by tests and diagnostics.
///
/// # Safety
/// `header_ptr` must point at a header region matching `kind`'s size.
pub(crate) unsafe fn allocation_number(kind: &HeaderKind, header_ptr: *mut u8) -> u32 {
    match kind {
        HeaderKind::None => 0,
        HeaderKind::Basic => unsafe { header_ptr.cast::<u32>().read_unaligned() },
        HeaderKind::Extended { user_defined_bytes } => unsafe {
            header_ptr.add(*user_defined_bytes + 2).cast::<u32>().read_unaligned()
        },
        HeaderKind::External => unsafe {
            let raw = header_ptr.cast::<usize>().read_unaligned() as *const Descriptor;
            if raw.is_null() {
                0
            } else {
                (*raw).allocation_number
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_header_round_trip() {
        let mut buf = [0u8; 5];
        let ptr = buf.as_mut_ptr();
        unsafe {
            on_acquire(&HeaderKind::Basic, ptr, 1, None);
            assert!(is_in_use(&HeaderKind::Basic, ptr));
            assert_eq!(allocation_number(&HeaderKind::Basic, ptr), 1);
            on_release(&HeaderKind::Basic, ptr);
            assert!(!is_in_use(&HeaderKind::Basic, ptr));
            assert_eq!(allocation_number(&HeaderKind::Basic, ptr), 0);
        }
    }

    #[test]
    fn extended_header_use_counter_increments_per_acquire() {
        let kind = HeaderKind::Extended { user_defined_bytes: 2 };
        let mut buf = [0u8; 9];
        let ptr = buf.as_mut_ptr();
        unsafe {
            on_acquire(&kind, ptr, 1, None);
            on_release(&kind, ptr);
            on_acquire(&kind, ptr, 2, None);
            let use_counter = ptr.add(2).cast::<u16>().read_unaligned();
            assert_eq!(use_counter, 2);
            assert_eq!(allocation_number(&kind, ptr), 2);
        }
    }

    #[test]
    fn external_header_tracks_descriptor() {
        let mut buf = [0u8; 8];
        let ptr = buf.as_mut_ptr();
        unsafe {
            let descriptor = Descriptor {
                in_use: true,
                allocation_number: 5,
                label: b"x".to_vec(),
            };
            let raw = system_heap::alloc_descriptor(descriptor).unwrap();
            on_acquire(&HeaderKind::External, ptr, 5, Some(raw));
            assert!(is_in_use(&HeaderKind::External, ptr));
            assert_eq!(allocation_number(&HeaderKind::External, ptr), 5);
            on_release(&HeaderKind::External, ptr);
            assert!(!is_in_use(&HeaderKind::External, ptr));
        }
    }
}
