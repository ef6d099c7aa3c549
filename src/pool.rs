//! The allocator itself: acquire/release paths, inspection, and compaction.

use log::{debug, trace, warn};

use crate::config::{HeaderKind, ObjectPoolConfig};
use crate::error::{PoolError, PoolResult};
use crate::free_list::FreeList;
use crate::geometry::PageGeometry;
use crate::header;
use crate::page::{self, PageList};
use crate::signatures;
use crate::stats::PoolStatistics;
use crate::system_heap;

/// A fixed-size object pool allocator.
///
/// Single-threaded by contract: `ObjectPool` performs no internal
/// synchronization.
pub struct ObjectPool {
    config: ObjectPoolConfig,
    geometry: PageGeometry,
    pages: PageList,
    free_list: FreeList,
    stats: PoolStatistics,
    debug_checks: bool,
}

impl ObjectPool {
    /// Validates `config` and computes its page geometry. Does not build any
    /// pages; the first page is built lazily on the first `acquire`.
    pub fn new(config: ObjectPoolConfig) -> PoolResult<Self> {
        config.validate()?;
        let geometry = PageGeometry::compute(&config)?;
        let debug_checks = config.debug_checks;
        let mut stats = PoolStatistics::default();
        stats.object_size = config.object_size;
        stats.page_size = geometry.page_bytes;
        Ok(Self {
            config,
            geometry,
            pages: PageList::new(),
            free_list: FreeList::new(),
            stats,
            debug_checks,
        })
    }

    /// Returns the address of one user region, or fails. `label` is
    /// consulted only when `header_kind` is [`HeaderKind::External`].
    pub fn acquire(&mut self, label: Option<&[u8]>) -> PoolResult<*mut u8> {
        if self.config.use_system_heap {
            let ptr = unsafe { system_heap::acquire_object(self.config.object_size)? };
            self.stats.allocations += 1;
            self.stats.objects_in_use += 1;
            self.stats.most_objects = self.stats.most_objects.max(self.stats.objects_in_use);
            trace!("acquired slot {ptr:p} via system heap");
            return Ok(ptr);
        }

        let allocation_number = (self.stats.allocations + 1) as u32;

        // Any fallible step happens before the free list is touched, so a
        // failure here leaves no visible state changed.
        let descriptor = if matches!(self.config.header_kind, HeaderKind::External) {
            let descriptor = header::Descriptor {
                in_use: true,
                allocation_number,
                label: label.map(|l| l.to_vec()).unwrap_or_default(),
            };
            Some(unsafe { system_heap::alloc_descriptor(descriptor)? })
        } else {
            None
        };

        if self.free_list.is_empty() {
            let page_cap_reached =
                self.config.max_pages != 0 && self.stats.pages_in_use >= self.config.max_pages;
            if page_cap_reached {
                if let Some(raw) = descriptor {
                    unsafe { system_heap::free_descriptor(raw) };
                }
                warn!(
                    "acquire failed: page cap of {} reached",
                    self.config.max_pages
                );
                return Err(PoolError::NoPages);
            }
            let built = unsafe {
                page::build_page(&self.geometry, &self.config, &mut self.pages, &mut self.free_list)
            };
            match built {
                Ok(_) => {
                    self.stats.pages_in_use += 1;
                    self.stats.free_objects += self.config.objects_per_page;
                }
                Err(err) => {
                    if let Some(raw) = descriptor {
                        unsafe { system_heap::free_descriptor(raw) };
                    }
                    return Err(err);
                }
            }
        }

        let user = unsafe {
            self.free_list
                .pop()
                .expect("free list must be non-empty after a successful page build")
        };
        unsafe {
            signatures::paint(user, self.config.object_size, signatures::ALLOCATED);
            let header_ptr = self.header_ptr_for(user);
            header::on_acquire(&self.config.header_kind, header_ptr, allocation_number, descriptor);
        }

        self.stats.allocations += 1;
        self.stats.objects_in_use += 1;
        self.stats.most_objects = self.stats.most_objects.max(self.stats.objects_in_use);
        self.stats.free_objects -= 1;
        trace!("acquired slot {user:p}");
        Ok(user)
    }

    /// Releases a previously acquired slot. Null is a no-op.
    pub fn release(&mut self, ptr: *mut u8) -> PoolResult<()> {
        if ptr.is_null() {
            return Ok(());
        }

        if self.config.use_system_heap {
            unsafe { system_heap::release_object(ptr) };
            self.stats.deallocations += 1;
            self.stats.objects_in_use -= 1;
            trace!("released slot {ptr:p} via system heap");
            return Ok(());
        }

        if self.debug_checks {
            self.check_release(ptr)?;
        }

        unsafe {
            signatures::paint(ptr, self.config.object_size, signatures::FREED);
            let header_ptr = self.header_ptr_for(ptr);
            header::on_release(&self.config.header_kind, header_ptr);
            self.free_list.push(ptr);
        }

        self.stats.free_objects += 1;
        self.stats.deallocations += 1;
        self.stats.objects_in_use -= 1;
        trace!("released slot {ptr:p}");
        Ok(())
    }

    /// Double-free, range, alignment, and padding checks, in the order that
    /// makes each one meaningful (the double-free scan must run before any
    /// painting, or a second release of the same slot would see `FREED` and
    /// pass).
    fn check_release(&self, ptr: *mut u8) -> PoolResult<()> {
        if unsafe { self.free_list.contains(ptr) } {
            warn!("release rejected: {ptr:p} was already released");
            return Err(PoolError::MultipleFree(ptr as usize));
        }

        let page = self.find_page_containing(ptr).ok_or_else(|| {
            warn!("release rejected: {ptr:p} is outside any page");
            PoolError::BadBoundary(ptr as usize)
        })?;

        let first_user = unsafe { page.add(self.geometry.user_offset(0)) } as usize;
        let addr = ptr as usize;
        if addr < first_user {
            warn!("release rejected: {ptr:p} falls before the first slot");
            return Err(PoolError::BadBoundary(ptr as usize));
        }
        let offset = addr - first_user;
        if offset % self.geometry.slot_stride != 0 {
            warn!("release rejected: {ptr:p} is not on a slot boundary");
            return Err(PoolError::BadBoundary(ptr as usize));
        }
        let index = offset / self.geometry.slot_stride;
        if index >= self.config.objects_per_page {
            warn!("release rejected: {ptr:p} resolves to an out-of-range slot index");
            return Err(PoolError::BadBoundary(ptr as usize));
        }

        if self.config.left_pad_bytes > 0 && !unsafe { self.check_padding(ptr) } {
            warn!("release rejected: padding around {ptr:p} is corrupted");
            return Err(PoolError::CorruptedBlock(ptr as usize));
        }

        Ok(())
    }

    /// Walks every page; calls `callback(address, size)` for every in-use
    /// slot. Returns the count.
    pub fn dump_in_use(&self, mut callback: impl FnMut(*mut u8, usize)) -> usize {
        let mut count = 0;
        for page in self.pages.iter() {
            for i in 0..self.config.objects_per_page {
                let user = unsafe { page.add(self.geometry.user_offset(i)) };
                if self.slot_in_use(user) {
                    callback(user, self.config.object_size);
                    count += 1;
                }
            }
        }
        count
    }

    /// Walks every page; calls `callback(address, size)` for every slot whose
    /// padding no longer matches `PAD`. Returns the count. Returns `0`
    /// immediately when `left_pad_bytes == 0`.
    pub fn validate_padding(&self, mut callback: impl FnMut(*mut u8, usize)) -> usize {
        if self.config.left_pad_bytes == 0 {
            return 0;
        }
        let mut count = 0;
        for page in self.pages.iter() {
            for i in 0..self.config.objects_per_page {
                let user = unsafe { page.add(self.geometry.user_offset(i)) };
                if !unsafe { self.check_padding(user) } {
                    callback(user, self.config.object_size);
                    count += 1;
                }
            }
        }
        count
    }

    /// Releases every page with no slots in use. Returns the number of pages
    /// released. Every slot of a released page is excised from the free list
    /// before that page's bytes are returned to the system heap.
    pub fn free_empty_pages(&mut self) -> usize {
        let mut empty_pages = Vec::new();
        for page in self.pages.iter() {
            let all_free = (0..self.config.objects_per_page).all(|i| {
                let user = unsafe { page.add(self.geometry.user_offset(i)) };
                !self.slot_in_use(user)
            });
            if all_free {
                empty_pages.push(page);
            }
        }

        for page in &empty_pages {
            let page = *page;
            let page_start = page as usize;
            let page_end = page_start + self.geometry.page_bytes;
            unsafe {
                self.free_list
                    .retain(|addr| !(addr as usize >= page_start && (addr as usize) < page_end));
                self.pages.remove(page);
                system_heap::release_page(page);
            }
            self.stats.pages_in_use -= 1;
            self.stats.free_objects -= self.config.objects_per_page;
        }

        if !empty_pages.is_empty() {
            debug!("freed {} empty page(s)", empty_pages.len());
        }
        empty_pages.len()
    }

    pub fn set_debug_checks(&mut self, on: bool) {
        self.debug_checks = on;
    }

    pub fn configuration(&self) -> &ObjectPoolConfig {
        &self.config
    }

    pub fn statistics(&self) -> PoolStatistics {
        self.stats
    }

    /// Read-only observer for tests: the current free list head, or null.
    pub fn free_list_head(&self) -> *mut u8 {
        self.free_list.head()
    }

    /// Read-only observer for tests: the current page list head, or null.
    pub fn page_list_head(&self) -> *mut u8 {
        self.pages.head()
    }

    fn slot_in_use(&self, user: *mut u8) -> bool {
        if matches!(self.config.header_kind, HeaderKind::None) {
            !unsafe { self.free_list.contains(user) }
        } else {
            let header_ptr = unsafe { self.header_ptr_for(user) };
            unsafe { header::is_in_use(&self.config.header_kind, header_ptr) }
        }
    }

    unsafe fn header_ptr_for(&self, user: *mut u8) -> *mut u8 {
        unsafe { user.sub(self.config.left_pad_bytes + self.geometry.header_bytes) }
    }

    unsafe fn check_padding(&self, user: *mut u8) -> bool {
        let pad = self.config.left_pad_bytes;
        if pad == 0 {
            return true;
        }
        unsafe {
            let left = std::slice::from_raw_parts(user.sub(pad), pad);
            let right = std::slice::from_raw_parts(user.add(self.config.object_size), pad);
            left.iter().all(|&b| b == signatures::PAD) && right.iter().all(|&b| b == signatures::PAD)
        }
    }

    fn find_page_containing(&self, ptr: *mut u8) -> Option<*mut u8> {
        let addr = ptr as usize;
        self.pages.iter().find(|&page| {
            let start = page as usize;
            let end = start + self.geometry.page_bytes;
            addr >= start && addr < end
        })
    }
}

impl Drop for ObjectPool {
    /// Unconditionally returns every page to the system heap, ignoring any
    /// system-heap error. Callers must release all outstanding slots first;
    /// this does not defend against slots still in use (external-header
    /// descriptors for any that aren't are simply abandoned with the page).
    fn drop(&mut self) {
        if self.config.use_system_heap {
            return;
        }
        // Collect every page address before releasing any of them: once a
        // page's bytes are freed, its embedded next-page link is gone.
        let pages: Vec<*mut u8> = self.pages.iter().collect();
        for page in pages {
            unsafe { system_heap::release_page(page) };
        }
    }
}
