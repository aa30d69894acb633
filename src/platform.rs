use alloc::vec;
use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};

/// The non-volatile memory region a [`Persist`](crate::Persist) instance
/// owns.
///
/// Read, write and erase come from the embedded-storage supertraits; this
/// trait adds the region size and fill byte as compile-time constants (the
/// block and page geometry is derived from them) and a probe for whether a
/// range can be written without an intervening erase.
///
/// The persister only ever passes write-granularity-aligned offsets and
/// sizes to `write` and erase-granularity-aligned ones to `erase`. The
/// region is assumed to be exclusively owned; sharing it with another
/// subsystem is undefined. See README.md for an example implementation.
pub trait NvMem: ReadNorFlash + NorFlash {
    /// Total size in bytes of the region. Must be at least
    /// [`ERASE_SIZE`](NorFlash::ERASE_SIZE).
    const SIZE: usize;

    /// Byte value observed after an erase, also used for block padding.
    const FILL_BYTE: u8 = 0xFF;

    /// Whether `len` bytes at `offset` can be written right now without an
    /// erase first. For NOR flash that means every bit still holds its
    /// erased value.
    ///
    /// The default implementation reads the range back and compares against
    /// [`FILL_BYTE`](NvMem::FILL_BYTE); drivers with a cheaper probe should
    /// override it. A failed read reports the range as not writable.
    fn writable(&mut self, offset: u32, len: usize) -> bool {
        let mut buf = vec![0u8; len];
        match self.read(offset, &mut buf) {
            Ok(()) => buf.iter().all(|&b| b == Self::FILL_BYTE),
            Err(_) => false,
        }
    }
}

// embedded-storage provides ReadNorFlash/NorFlash for &mut T; forwarding
// the extension constants lets callers hand out a borrow of their driver
// instead of moving it.
impl<T: NvMem> NvMem for &mut T {
    const SIZE: usize = T::SIZE;
    const FILL_BYTE: u8 = T::FILL_BYTE;

    fn writable(&mut self, offset: u32, len: usize) -> bool {
        T::writable(self, offset, len)
    }
}
