//! Region geometry, the recovery scanner, and the commit engine.

use core::mem::size_of;

#[cfg(feature = "defmt")]
use defmt::{trace, warn};

use crate::crc16::Crc16;
use crate::error::Error;
use crate::platform::NvMem;
use crate::raw;
use crate::{Persist, Record};

impl<M: NvMem, T: Record, const VERSION: u8, const FAULT_TOLERANT: bool>
    Persist<M, T, VERSION, FAULT_TOLERANT>
{
    pub(crate) const DATA_SIZE: usize = size_of::<T>();
    pub(crate) const SEQUENCE_OFFSET: usize = Self::DATA_SIZE;
    pub(crate) const CRC_OFFSET: usize = Self::DATA_SIZE + size_of::<u16>();

    pub(crate) const BLOCK_PADDING: usize =
        raw::pad_size(Self::DATA_SIZE + raw::BLOCK_OVERHEAD, M::WRITE_SIZE);
    pub(crate) const BLOCK_SIZE: usize =
        Self::DATA_SIZE + raw::BLOCK_OVERHEAD + Self::BLOCK_PADDING;
    pub(crate) const PAGE_SIZE: usize =
        Self::BLOCK_SIZE + raw::pad_size(Self::BLOCK_SIZE, M::ERASE_SIZE);
    pub(crate) const BLOCKS_PER_PAGE: usize = Self::PAGE_SIZE / Self::BLOCK_SIZE;
    pub(crate) const NUM_BLOCKS: usize = raw::min(
        (M::SIZE / Self::PAGE_SIZE) * Self::BLOCKS_PER_PAGE,
        raw::MAX_NUM_BLOCKS,
    );
    pub(crate) const NUM_PAGES: usize = raw::div_ceil(Self::NUM_BLOCKS, Self::BLOCKS_PER_PAGE);

    /// Region-relative byte offset of block `block_n`.
    pub(crate) fn block_location(block_n: u32) -> u32 {
        let page_n = block_n / Self::BLOCKS_PER_PAGE as u32;
        let block_in_page = block_n - page_n * Self::BLOCKS_PER_PAGE as u32;
        page_n * Self::PAGE_SIZE as u32 + block_in_page * Self::BLOCK_SIZE as u32
    }

    /// Full recovery scan: walk every block, keep the valid one with the
    /// most recent sequence number under modular comparison, then re-read
    /// the winner into the cache (the scan itself clobbers it).
    pub(crate) fn reset(&mut self) -> Result<(), Error> {
        self.sequence = 0;
        self.active_block = None;

        for block_n in 0..Self::NUM_BLOCKS as u32 {
            let location = Self::block_location(block_n);

            if self.nvmem.read(location, &mut self.block).is_err() {
                self.active_block = None;
                return Err(Error::Read);
            }

            if self.stored_crc() != self.computed_crc() {
                continue;
            }

            let sequence_n = self.stored_sequence();
            if self.active_block.is_none()
                || raw::supersedes(sequence_n, self.sequence, Self::NUM_BLOCKS)
            {
                self.active_block = Some(block_n);
                self.sequence = sequence_n;
            }
        }

        if let Some(block_n) = self.active_block {
            if self
                .nvmem
                .read(Self::block_location(block_n), &mut self.block)
                .is_err()
            {
                self.active_block = None;
                return Err(Error::Read);
            }
        }

        #[cfg(feature = "defmt")]
        match self.active_block {
            Some(block_n) => trace!("recovered block {} sequence {}", block_n, self.sequence),
            None => trace!("no valid block in region"),
        }

        Ok(())
    }

    /// Allocate the next block (erasing a page when the region is
    /// exhausted), encode and write `data`.
    pub(crate) fn commit(&mut self, data: &T) -> Result<(), Error> {
        let next_block = match self.next_writable_block(self.active_block) {
            Some(block_n) => {
                self.sequence = self.sequence.wrapping_add(1);
                block_n
            }
            None => match self.active_block {
                None => {
                    // Fresh or fully corrupted region with nothing left to
                    // preserve: reclaim all of it and start over.
                    let end = (Self::NUM_PAGES * Self::PAGE_SIZE) as u32;
                    if self.nvmem.erase(0, end).is_err() {
                        return Err(Error::Erase);
                    }
                    self.sequence = 0;
                    0
                }
                Some(active) => {
                    // Rotate: erase the page after the one holding the
                    // active block. The active page stays intact, so power
                    // loss anywhere in here still recovers the old record.
                    let current_page = active / Self::BLOCKS_PER_PAGE as u32;
                    let next_page = (current_page + 1) % Self::NUM_PAGES as u32;
                    let from = next_page * Self::PAGE_SIZE as u32;

                    #[cfg(feature = "defmt")]
                    trace!("rotating to page {}", next_page);

                    if self.nvmem.erase(from, from + Self::PAGE_SIZE as u32).is_err() {
                        return Err(Error::Erase);
                    }
                    self.sequence = self.sequence.wrapping_add(1);
                    next_page * Self::BLOCKS_PER_PAGE as u32
                }
            },
        };

        self.active_block = Some(next_block);
        self.encode_block(data);

        let location = Self::block_location(next_block);
        if self.nvmem.write(location, &self.block).is_err() {
            // Re-establish the active-block invariant from media before
            // reporting the failure, exactly as a power cycle would.
            #[cfg(feature = "defmt")]
            warn!("write of block {} failed, rescanning", next_block);

            let _ = self.reset();
            return Err(Error::Write);
        }

        #[cfg(feature = "defmt")]
        trace!("committed block {} sequence {}", next_block, self.sequence);

        Ok(())
    }

    /// Circular scan for the first writable block after `current`, probing
    /// every other block once. Returns `None` when the scan comes back
    /// around empty-handed, i.e. the region is exhausted.
    fn next_writable_block(&mut self, current: Option<u32>) -> Option<u32> {
        let num_blocks = Self::NUM_BLOCKS as u32;
        let start = current.unwrap_or(num_blocks - 1);

        let mut block_n = start;
        loop {
            block_n = (block_n + 1) % num_blocks;
            if self
                .nvmem
                .writable(Self::block_location(block_n), Self::BLOCK_SIZE)
            {
                break;
            }
            if block_n == start {
                break;
            }
        }

        (block_n != start).then_some(block_n)
    }

    pub(crate) fn data_is_same(&self, data: &T) -> bool {
        self.active_block.is_some() && self.block[..Self::DATA_SIZE] == *data.as_bytes()
    }

    fn encode_block(&mut self, data: &T) {
        self.block[..Self::DATA_SIZE].copy_from_slice(data.as_bytes());
        self.block[Self::SEQUENCE_OFFSET..Self::CRC_OFFSET]
            .copy_from_slice(&self.sequence.to_le_bytes());
        for byte in &mut self.block[Self::CRC_OFFSET + size_of::<u16>()..] {
            *byte = M::FILL_BYTE;
        }
        let crc = self.computed_crc();
        self.block[Self::CRC_OFFSET..Self::CRC_OFFSET + size_of::<u16>()]
            .copy_from_slice(&crc.to_le_bytes());
    }

    fn stored_sequence(&self) -> u16 {
        u16::from_le_bytes([
            self.block[Self::SEQUENCE_OFFSET],
            self.block[Self::SEQUENCE_OFFSET + 1],
        ])
    }

    fn stored_crc(&self) -> u16 {
        u16::from_le_bytes([self.block[Self::CRC_OFFSET], self.block[Self::CRC_OFFSET + 1]])
    }

    /// CRC over `data ‖ sequence_n`, seeded with the version tag.
    fn computed_crc(&self) -> u16 {
        let mut crc = Crc16::new();
        crc.seed(raw::version_seed(VERSION));
        crc.process(&self.block[..Self::CRC_OFFSET])
    }
}
