//! Page geometry calculator.
//!
//! Computes the byte-exact layout of a page: how many pad bytes are needed
//! to keep every slot's user region aligned, the stride between slots, and
//! the total page size. Computed once per pool, at construction.

use crate::config::ObjectPoolConfig;
use crate::error::PoolResult;

#[derive(Debug, Clone, Copy)]
pub(crate) struct PageGeometry {
    pub header_bytes: usize,
    pub left_pad_bytes: usize,
    pub left_align_bytes: usize,
    pub inter_align_bytes: usize,
    pub slot_stride: usize,
    pub page_bytes: usize,
}

impl PageGeometry {
    pub(crate) fn compute(config: &ObjectPoolConfig) -> PoolResult<Self> {
        let ptr_size = std::mem::size_of::<usize>();
        let header_bytes = config.header_kind.header_bytes();

        let (left_align_bytes, inter_align_bytes) = if config.alignment <= 1 {
            (0, 0)
        } else {
            let align = config.alignment;
            let prefix = ptr_size + header_bytes + config.left_pad_bytes;
            let left = (align - prefix % align) % align;
            // A single slot has no following slot to pad toward.
            let inter = if config.objects_per_page == 1 {
                0
            } else {
                let inter_prefix = config.object_size + header_bytes + 2 * config.left_pad_bytes;
                (align - inter_prefix % align) % align
            };
            (left, inter)
        };

        let slot_stride = header_bytes
            + config.left_pad_bytes
            + config.object_size
            + config.left_pad_bytes
            + inter_align_bytes;
        let page_bytes =
            ptr_size + left_align_bytes + config.objects_per_page * slot_stride - inter_align_bytes;

        Ok(Self {
            header_bytes,
            left_pad_bytes: config.left_pad_bytes,
            left_align_bytes,
            inter_align_bytes,
            slot_stride,
            page_bytes,
        })
    }

    /// Byte offset from the page start to slot `index`'s header start.
    pub(crate) fn slot_offset(&self, index: usize) -> usize {
        std::mem::size_of::<usize>() + self.left_align_bytes + index * self.slot_stride
    }

    /// Byte offset from the page start to slot `index`'s user region start.
    pub(crate) fn user_offset(&self, index: usize) -> usize {
        self.slot_offset(index) + self.header_bytes + self.left_pad_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeaderKind;

    #[test]
    fn no_alignment_no_padding_has_zero_align_bytes() {
        let config = ObjectPoolConfig::new(8).with_objects_per_page(4);
        let geometry = PageGeometry::compute(&config).unwrap();
        assert_eq!(geometry.left_align_bytes, 0);
        assert_eq!(geometry.inter_align_bytes, 0);
        assert_eq!(geometry.slot_stride, 8);
        assert_eq!(geometry.page_bytes, std::mem::size_of::<usize>() + 4 * 8);
    }

    #[test]
    fn single_object_per_page_has_no_inter_alignment() {
        let config = ObjectPoolConfig::new(12)
            .with_objects_per_page(1)
            .with_alignment(8);
        let geometry = PageGeometry::compute(&config).unwrap();
        assert_eq!(geometry.inter_align_bytes, 0);
    }

    #[test]
    fn user_offsets_are_aligned() {
        let config = ObjectPoolConfig::new(12)
            .with_objects_per_page(3)
            .with_alignment(8);
        let geometry = PageGeometry::compute(&config).unwrap();
        for i in 0..3 {
            assert_eq!(geometry.user_offset(i) % 8, 0);
        }
    }

    #[test]
    fn extended_header_shifts_geometry() {
        let config = ObjectPoolConfig::new(16)
            .with_objects_per_page(2)
            .with_header_kind(HeaderKind::Extended { user_defined_bytes: 3 });
        let geometry = PageGeometry::compute(&config).unwrap();
        assert_eq!(geometry.header_bytes, 10);
        assert_eq!(geometry.slot_stride, 10 + 16);
    }
}
