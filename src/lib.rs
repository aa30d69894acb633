#![doc = include_str!("../README.md")]
#![cfg_attr(not(target_arch = "x86_64"), no_std)]

pub mod error;
mod crc16;
mod internal;
pub mod legacy;
pub mod platform;
mod raw;

pub use crc16::Crc16;
pub use error::Error;
pub use legacy::{Prior, Priors};
pub use platform::NvMem;

extern crate alloc;

use alloc::vec;
use alloc::vec::Vec;
use core::marker::PhantomData;
use zerocopy::{FromBytes, Immutable, IntoBytes};

/// Bound for the stored record: a fixed-size, trivially copyable value type
/// whose byte image is well defined. Blanket-implemented for anything that
/// derives the zerocopy traits.
///
/// The record is persisted as its raw host-endian byte image; the on-media
/// format is not portable across differing-endian devices.
pub trait Record: FromBytes + IntoBytes + Immutable + Copy {}

impl<T: FromBytes + IntoBytes + Immutable + Copy> Record for T {}

/// A snapshot of the derived region geometry and the current commit state,
/// mainly useful for diagnostics and capacity planning.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Statistics {
    /// Bytes per record block (record + sequence + CRC + padding).
    pub block_size: usize,
    /// Bytes per page, the smallest independently erasable unit.
    pub page_size: usize,
    pub blocks_per_page: usize,
    pub pages: usize,
    /// Total blocks, i.e. saves between two erases of the same page.
    pub blocks: usize,
    /// Index of the currently committed block, if any.
    pub active_block: Option<u32>,
    /// Sequence number of the active block (0 when none).
    pub sequence: u16,
}

/// A persistent store for a single record of type `T` in the NVMem region
/// `M`, tagged with the schema version `VERSION`.
///
/// The instance caches the active block image in memory; [`load`] never
/// touches the media. `M` is taken by value, but `&mut` references to an
/// NvMem implementation are themselves NvMem, so the driver can be borrowed
/// for the lifetime of the store.
///
/// With `FAULT_TOLERANT` left at `true`, construction rejects any region
/// too small for two pages, which is what guarantees that the page erase
/// inside [`save`] can never destroy the current record. Opting out admits
/// single-page regions at the cost of a data-loss window during rotation.
///
/// [`load`]: Persist::load
/// [`save`]: Persist::save
pub struct Persist<M: NvMem, T: Record, const VERSION: u8, const FAULT_TOLERANT: bool = true> {
    nvmem: M,
    block: Vec<u8>,
    active_block: Option<u32>,
    sequence: u16,
    _record: PhantomData<T>,
}

impl<M: NvMem, T: Record, const VERSION: u8, const FAULT_TOLERANT: bool>
    Persist<M, T, VERSION, FAULT_TOLERANT>
{
    /// Wrap an already-initialized NVMem region.
    ///
    /// Geometry is derived here from `M`'s constants and the size of `T`;
    /// a region whose granularities do not nest or that cannot hold a
    /// single page is a configuration defect and is rejected up front.
    pub fn new(nvmem: M) -> Result<Self, Error> {
        if M::WRITE_SIZE > M::SIZE || M::ERASE_SIZE > M::SIZE {
            return Err(Error::InvalidGeometry);
        }
        if !M::ERASE_SIZE.is_multiple_of(M::WRITE_SIZE)
            || !M::WRITE_SIZE.is_multiple_of(M::READ_SIZE)
        {
            return Err(Error::InvalidGeometry);
        }
        if Self::NUM_BLOCKS == 0 {
            return Err(Error::InvalidGeometry);
        }
        if FAULT_TOLERANT && Self::NUM_PAGES < 2 {
            return Err(Error::NotFaultTolerant);
        }

        Ok(Self {
            nvmem,
            block: vec![0u8; Self::BLOCK_SIZE],
            active_block: None,
            sequence: 0,
            _record: PhantomData,
        })
    }

    /// Scan the region and recover the most recent committed record.
    ///
    /// Must be called before [`load`](Persist::load) or
    /// [`save`](Persist::save). Finding no valid block is not an error;
    /// the subsequent `load` reports [`Error::NoData`].
    pub fn init(&mut self) -> Result<(), Error> {
        self.reset()
    }

    /// Copy the most recent committed record out of the in-memory cache.
    pub fn load(&self) -> Result<T, Error> {
        match self.active_block {
            None => Err(Error::NoData),
            Some(_) => {
                T::read_from_bytes(&self.block[..Self::DATA_SIZE]).map_err(|_| Error::NoData)
            }
        }
    }

    /// Durably persist `data`.
    ///
    /// Saving a record identical to the active one is a no-op that touches
    /// no media. Otherwise the next writable block is allocated (rotating
    /// to, and erasing, the following page when the region is exhausted)
    /// and the new block is committed in a single write. After a failed
    /// write the region is rescanned so the previous record is active
    /// again before the error is returned.
    pub fn save(&mut self, data: &T) -> Result<(), Error> {
        if self.data_is_same(data) {
            return Ok(());
        }
        self.commit(data)
    }

    /// [`load`](Persist::load), falling back to the chain `P` of prior
    /// record generations when this generation has no data.
    ///
    /// `P` is a nested tuple of [`Prior`] markers, newest first, terminated
    /// by `()`: each prior persister is initialized over the same region
    /// and its record converted stepwise via `Into` up to `T`. A prior
    /// generation's data is left on media untouched; persist it with
    /// [`save`](Persist::save) to migrate.
    pub fn load_legacy<P: Priors<M, T>>(&mut self) -> Result<T, Error> {
        match self.load() {
            Err(Error::NoData) => P::load(&mut self.nvmem),
            result => result,
        }
    }

    pub fn statistics(&self) -> Statistics {
        Statistics {
            block_size: Self::BLOCK_SIZE,
            page_size: Self::PAGE_SIZE,
            blocks_per_page: Self::BLOCKS_PER_PAGE,
            pages: Self::NUM_PAGES,
            blocks: Self::NUM_BLOCKS,
            active_block: self.active_block,
            sequence: self.sequence,
        }
    }
}
