#![allow(dead_code)]

// filename according to https://doc.rust-lang.org/book/ch11-03-test-organization.html
use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};
use nv_persist::{Crc16, NvMem};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

pub const FILL_BYTE: u8 = 0xFF;

/// In-memory NOR flash with an operation journal and per-operation fault
/// injection. Writes can only clear bits, erases restore the fill byte.
pub struct Flash<const SIZE: usize, const ERASE: usize, const WRITE: usize> {
    pub buf: Vec<u8>,
    pub operations: Vec<Operation>,
    /// Successful reads before the next read fails.
    pub fail_read_after: usize,
    /// Successful writes before the next write fails.
    pub fail_write_after: usize,
    /// Successful erases before the next erase fails.
    pub fail_erase_after: usize,
    /// Bytes the failing write still lands on media, for torn-write tests.
    pub partial_write: usize,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Operation {
    Read { offset: u32, len: usize },
    Write { offset: u32, len: usize },
    Erase { offset: u32, len: usize },
}

impl<const SIZE: usize, const ERASE: usize, const WRITE: usize> Flash<SIZE, ERASE, WRITE> {
    pub fn new() -> Self {
        Self {
            buf: vec![FILL_BYTE; SIZE],
            operations: Vec::new(),
            fail_read_after: usize::MAX,
            fail_write_after: usize::MAX,
            fail_erase_after: usize::MAX,
            partial_write: 0,
        }
    }

    pub fn disable_faults(&mut self) {
        self.fail_read_after = usize::MAX;
        self.fail_write_after = usize::MAX;
        self.fail_erase_after = usize::MAX;
    }

    pub fn reads(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| matches!(op, Operation::Read { .. }))
            .count()
    }

    pub fn writes(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| matches!(op, Operation::Write { .. }))
            .count()
    }

    pub fn erases(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| matches!(op, Operation::Erase { .. }))
            .count()
    }

    pub fn erase_offsets(&self) -> Vec<u32> {
        self.operations
            .iter()
            .filter_map(|op| match op {
                Operation::Erase { offset, .. } => Some(*offset),
                _ => None,
            })
            .collect()
    }

    pub fn dump_operations(&self) {
        println!("Operations:");
        for op in &self.operations {
            println!("  {:?}", op);
        }
    }
}

impl<const SIZE: usize, const ERASE: usize, const WRITE: usize> Default
    for Flash<SIZE, ERASE, WRITE>
{
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct FlashError;

impl NorFlashError for FlashError {
    fn kind(&self) -> NorFlashErrorKind {
        NorFlashErrorKind::Other
    }
}

impl<const SIZE: usize, const ERASE: usize, const WRITE: usize> ErrorType
    for Flash<SIZE, ERASE, WRITE>
{
    type Error = FlashError;
}

impl<const SIZE: usize, const ERASE: usize, const WRITE: usize> ReadNorFlash
    for Flash<SIZE, ERASE, WRITE>
{
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let offset = offset as usize;
        assert!(offset + bytes.len() <= SIZE);

        if self.reads() >= self.fail_read_after {
            return Err(FlashError);
        }
        self.operations.push(Operation::Read {
            offset: offset as u32,
            len: bytes.len(),
        });

        bytes.copy_from_slice(&self.buf[offset..offset + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        SIZE
    }
}

impl<const SIZE: usize, const ERASE: usize, const WRITE: usize> NorFlash
    for Flash<SIZE, ERASE, WRITE>
{
    const WRITE_SIZE: usize = WRITE;
    const ERASE_SIZE: usize = ERASE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        assert!((from as usize).is_multiple_of(ERASE));
        assert!((to as usize).is_multiple_of(ERASE));
        assert!(to as usize <= SIZE);
        assert!(from <= to);

        if self.erases() >= self.fail_erase_after {
            return Err(FlashError);
        }
        self.operations.push(Operation::Erase {
            offset: from,
            len: (to - from) as usize,
        });

        self.buf[from as usize..to as usize].fill(FILL_BYTE);
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let offset = offset as usize;
        assert!(offset.is_multiple_of(WRITE));
        assert!(bytes.len().is_multiple_of(WRITE));
        assert!(offset + bytes.len() <= SIZE);

        if self.writes() >= self.fail_write_after {
            // Torn write: the first `partial_write` bytes still hit the die.
            let torn = self.partial_write.min(bytes.len());
            for (dst, src) in self.buf[offset..offset + torn].iter_mut().zip(bytes) {
                *dst &= *src;
            }
            return Err(FlashError);
        }
        self.operations.push(Operation::Write {
            offset: offset as u32,
            len: bytes.len(),
        });

        // NOR semantics: writes only clear bits.
        for (dst, src) in self.buf[offset..offset + bytes.len()].iter_mut().zip(bytes) {
            *dst &= *src;
        }
        Ok(())
    }
}

impl<const SIZE: usize, const ERASE: usize, const WRITE: usize> NvMem
    for Flash<SIZE, ERASE, WRITE>
{
    const SIZE: usize = SIZE;
    const FILL_BYTE: u8 = FILL_BYTE;

    fn writable(&mut self, offset: u32, len: usize) -> bool {
        let offset = offset as usize;
        self.buf[offset..offset + len].iter().all(|&b| b == FILL_BYTE)
    }
}

/// The geometry most tests run on: 4 KiB region, 1 KiB erase units, 4-byte
/// write units. With a 4-byte record that makes 8-byte blocks, 128 blocks
/// per page, 4 pages, 512 blocks.
pub type TestFlash = Flash<4096, 1024, 4>;

/// 4-byte record used by most integration tests.
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Copy, Clone, Debug, PartialEq)]
#[repr(C)]
pub struct Config {
    pub value: u32,
}

impl Config {
    pub fn new(value: u32) -> Self {
        Self { value }
    }
}

/// Byte image of a block body (data ‖ sequence ‖ crc, without padding) as
/// the persister would write it for the given version tag. Used to
/// fabricate on-media states the persister itself cannot easily produce,
/// e.g. sequence numbers close to the wraparound point.
pub fn raw_block(data: &[u8], sequence: u16, version: u8) -> Vec<u8> {
    let mut image = Vec::with_capacity(data.len() + 4);
    image.extend_from_slice(data);
    image.extend_from_slice(&sequence.to_le_bytes());

    let mut crc = Crc16::new();
    crc.seed((version as u16) | (((!version) as u16) << 8));
    let value = crc.process(&image);

    image.extend_from_slice(&value.to_le_bytes());
    image
}
