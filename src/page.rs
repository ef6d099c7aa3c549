//! Page list and page builder.
//!
//! A page is a single contiguous byte array sourced from the system heap;
//! the page list is singly-linked through the first `size_of::<usize>()`
//! bytes of each page, head being the most recently built page.

use log::debug;

use crate::config::ObjectPoolConfig;
use crate::error::PoolResult;
use crate::free_list::FreeList;
use crate::geometry::PageGeometry;
use crate::header;
use crate::signatures;
use crate::system_heap;

pub(crate) struct PageList {
    head: *mut u8,
}

impl PageList {
    pub(crate) fn new() -> Self {
        Self { head: std::ptr::null_mut() }
    }

    pub(crate) fn head(&self) -> *mut u8 {
        self.head
    }

    /// # Safety
    /// `page` must be valid for reads/writes of `size_of::<usize>()` bytes
    /// and must not already be linked into this list.
    pub(crate) unsafe fn push_front(&mut self, page: *mut u8) {
        debug_assert!(!page.is_null());
        debug_assert!(
            !unsafe { self.contains(page) },
            "page must not already be linked into the page list"
        );
        unsafe {
            page.cast::<usize>().write_unaligned(self.head as usize);
        }
        self.head = page;
    }

    /// Unlinks `page` from the list.
    ///
    /// # Safety
    /// `page` must currently be linked into this list, and every node must be
    /// valid for reads of `size_of::<usize>()` bytes.
    pub(crate) unsafe fn remove(&mut self, page: *mut u8) {
        debug_assert!(
            unsafe { self.contains(page) },
            "page being removed must currently be linked into the page list"
        );
        unsafe {
            if self.head == page {
                self.head = page.cast::<usize>().read_unaligned() as *mut u8;
                return;
            }
            let mut cur = self.head;
            while !cur.is_null() {
                let next = cur.cast::<usize>().read_unaligned() as *mut u8;
                if next == page {
                    let next_next = page.cast::<usize>().read_unaligned() as *mut u8;
                    cur.cast::<usize>().write_unaligned(next_next as usize);
                    return;
                }
                cur = next;
            }
        }
    }

    /// # Safety
    /// Every linked node must be valid for reads of `size_of::<usize>()` bytes.
    unsafe fn contains(&self, page: *mut u8) -> bool {
        let mut cur = self.head;
        while !cur.is_null() {
            if cur == page {
                return true;
            }
            cur = unsafe { cur.cast::<usize>().read_unaligned() as *mut u8 };
        }
        false
    }

    pub(crate) fn iter(&self) -> PageIter {
        PageIter { current: self.head }
    }
}

pub(crate) struct PageIter {
    current: *mut u8,
}

impl Iterator for PageIter {
    type Item = *mut u8;

    fn next(&mut self) -> Option<*mut u8> {
        if self.current.is_null() {
            return None;
        }
        let cur = self.current;
        self.current = unsafe { cur.cast::<usize>().read_unaligned() as *mut u8 };
        Some(cur)
    }
}

/// Acquires one page from the system heap, paints every signature region,
/// links it at the head of `pages`, and threads every slot onto `free_list`
/// such that the lowest-address slot ends up at the free list's head.
///
/// # Safety
/// `geometry` must have been computed from `config`.
pub(crate) unsafe fn build_page(
    geometry: &PageGeometry,
    config: &ObjectPoolConfig,
    pages: &mut PageList,
    free_list: &mut FreeList,
) -> PoolResult<*mut u8> {
    let align = if config.alignment > 1 { config.alignment } else { 1 };
    let page = unsafe { system_heap::acquire_page(geometry.page_bytes, align)? };

    unsafe {
        signatures::paint(page, geometry.page_bytes, signatures::UNALLOCATED);

        let left_align_start = page.add(std::mem::size_of::<usize>());
        signatures::paint(left_align_start, geometry.left_align_bytes, signatures::ALIGN);

        for i in 0..config.objects_per_page {
            let slot = page.add(geometry.slot_offset(i));
            header::zero(slot, geometry.header_bytes);

            let user = slot.add(geometry.header_bytes);
            if config.left_pad_bytes > 0 {
                signatures::paint(user.sub(config.left_pad_bytes), config.left_pad_bytes, signatures::PAD);
                signatures::paint(user.add(config.object_size), config.left_pad_bytes, signatures::PAD);
            }
            if i + 1 < config.objects_per_page && geometry.inter_align_bytes > 0 {
                let inter = user.add(config.object_size + config.left_pad_bytes);
                signatures::paint(inter, geometry.inter_align_bytes, signatures::ALIGN);
            }
        }

        pages.push_front(page);

        for i in (0..config.objects_per_page).rev() {
            let user = page.add(geometry.user_offset(i));
            free_list.push(user);
        }
    }

    debug!(
        "built page of {} bytes at {:p} with {} slots",
        geometry.page_bytes, page, config.objects_per_page
    );
    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ObjectPoolConfig;

    #[test]
    fn build_page_threads_slots_lowest_address_first() {
        let config = ObjectPoolConfig::new(8).with_objects_per_page(4);
        let geometry = PageGeometry::compute(&config).unwrap();
        let mut pages = PageList::new();
        let mut free_list = FreeList::new();
        unsafe {
            let page = build_page(&geometry, &config, &mut pages, &mut free_list).unwrap();
            assert_eq!(pages.head(), page);
            let expected_first = page.add(geometry.user_offset(0));
            assert_eq!(free_list.head(), expected_first);
            for _ in 0..4 {
                free_list.pop();
            }
            assert!(free_list.is_empty());
            system_heap::release_page(page);
        }
    }

    #[test]
    fn build_page_paints_pad_and_align_regions() {
        let config = ObjectPoolConfig::new(8)
            .with_objects_per_page(2)
            .with_alignment(8)
            .with_left_pad_bytes(2);
        let geometry = PageGeometry::compute(&config).unwrap();
        let mut pages = PageList::new();
        let mut free_list = FreeList::new();
        unsafe {
            let page = build_page(&geometry, &config, &mut pages, &mut free_list).unwrap();
            let user0 = page.add(geometry.user_offset(0));
            assert_eq!(*user0.sub(1), signatures::PAD);
            assert_eq!(*user0.add(config.object_size), signatures::PAD);
            assert_eq!(*user0, signatures::UNALLOCATED);
            system_heap::release_page(page);
        }
    }
}
