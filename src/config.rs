use crate::error::{PoolError, PoolResult};

/// Per-slot header bookkeeping variant. See the module docs on [`crate::header`]
/// for the exact byte layout of each kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    /// Zero bytes; in-use status is derived by scanning the free list.
    None,
    /// 4-byte allocation counter + 1-byte in-use flag.
    Basic,
    /// `user_defined_bytes` opaque bytes, 2-byte use counter, 4-byte
    /// allocation counter, 1-byte in-use flag.
    Extended { user_defined_bytes: usize },
    /// One pointer-sized slot holding the address of an out-of-band descriptor.
    External,
}

impl HeaderKind {
    pub(crate) fn header_bytes(&self) -> usize {
        match self {
            HeaderKind::None => 0,
            HeaderKind::Basic => 5,
            HeaderKind::Extended { user_defined_bytes } => user_defined_bytes + 7,
            HeaderKind::External => std::mem::size_of::<usize>(),
        }
    }
}

/// Configuration for an [`crate::ObjectPool`], decoded once at construction.
#[derive(Debug, Clone)]
pub struct ObjectPoolConfig {
    pub object_size: usize,
    pub objects_per_page: usize,
    /// 0 means unbounded.
    pub max_pages: usize,
    /// Power of two; 0 or 1 disables alignment padding.
    pub alignment: usize,
    /// Pad bytes written immediately before and after each user region.
    pub left_pad_bytes: usize,
    pub header_kind: HeaderKind,
    /// Bypass mode: acquire/release forward directly to the system heap.
    pub use_system_heap: bool,
    pub debug_checks: bool,
}

impl ObjectPoolConfig {
    pub fn new(object_size: usize) -> Self {
        Self {
            object_size,
            objects_per_page: 1,
            max_pages: 0,
            alignment: 1,
            left_pad_bytes: 0,
            header_kind: HeaderKind::None,
            use_system_heap: false,
            debug_checks: false,
        }
    }

    pub fn with_objects_per_page(mut self, n: usize) -> Self {
        self.objects_per_page = n;
        self
    }

    pub fn with_max_pages(mut self, n: usize) -> Self {
        self.max_pages = n;
        self
    }

    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_left_pad_bytes(mut self, n: usize) -> Self {
        self.left_pad_bytes = n;
        self
    }

    pub fn with_header_kind(mut self, kind: HeaderKind) -> Self {
        self.header_kind = kind;
        self
    }

    pub fn with_use_system_heap(mut self, on: bool) -> Self {
        self.use_system_heap = on;
        self
    }

    pub fn with_debug_checks(mut self, on: bool) -> Self {
        self.debug_checks = on;
        self
    }

    pub(crate) fn validate(&self) -> PoolResult<()> {
        let min_object_size = std::mem::size_of::<usize>();
        if self.object_size < min_object_size {
            return Err(PoolError::ConfigurationInvalid(format!(
                "object_size {} is smaller than a pointer ({} bytes); the free \
                 list needs room for a next-slot reference",
                self.object_size, min_object_size
            )));
        }
        if self.objects_per_page == 0 {
            return Err(PoolError::ConfigurationInvalid(
                "objects_per_page must be at least 1".into(),
            ));
        }
        if self.alignment > 1 && !self.alignment.is_power_of_two() {
            return Err(PoolError::ConfigurationInvalid(format!(
                "alignment {} is not a power of two",
                self.alignment
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_bytes_per_variant() {
        assert_eq!(HeaderKind::None.header_bytes(), 0);
        assert_eq!(HeaderKind::Basic.header_bytes(), 5);
        assert_eq!(
            HeaderKind::Extended { user_defined_bytes: 3 }.header_bytes(),
            10
        );
        assert_eq!(HeaderKind::External.header_bytes(), std::mem::size_of::<usize>());
    }

    #[test]
    fn rejects_object_size_smaller_than_pointer() {
        let config = ObjectPoolConfig::new(2);
        assert!(matches!(
            config.validate(),
            Err(PoolError::ConfigurationInvalid(_))
        ));
    }

    #[test]
    fn rejects_non_power_of_two_alignment() {
        let config = ObjectPoolConfig::new(16).with_alignment(3);
        assert!(matches!(
            config.validate(),
            Err(PoolError::ConfigurationInvalid(_))
        ));
    }

    #[test]
    fn accepts_disabled_alignment() {
        let config = ObjectPoolConfig::new(16).with_alignment(0);
        assert!(config.validate().is_ok());
        let config = ObjectPoolConfig::new(16).with_alignment(1);
        assert!(config.validate().is_ok());
    }
}
