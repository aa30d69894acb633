//! Prior-generation readers for schema migration.
//!
//! A firmware upgrade that changes the record layout bumps the version tag
//! and lists the previous layouts as a chain of [`Prior`] markers. Because
//! every generation's CRC seed incorporates its own version tag, a region
//! last written by older firmware produces valid CRCs only for that
//! generation's reader; the generations separate cleanly without a version
//! byte in the block body.

use core::marker::PhantomData;

use crate::error::Error;
use crate::platform::NvMem;
use crate::{Persist, Record};

/// One prior generation: record type `D`, stored under `VERSION`, with the
/// geometry implied by `D`'s size. Only ever used at the type level.
pub struct Prior<D, const VERSION: u8, const FAULT_TOLERANT: bool = true>(PhantomData<D>);

/// A type-level list of prior generations, newest first, encoded as nested
/// tuples terminated by `()`:
///
/// ```text
/// (Prior<ConfigV2, 2>, (Prior<ConfigV1, 1>, ()))
/// ```
///
/// Each generation's record must convert into its successor's via `Into`;
/// the conversions chain stepwise up to the current record type.
pub trait Priors<M: NvMem, T> {
    /// Load the newest record any generation in the list can recover from
    /// `nvmem`, converted to `T`. `Error::NoData` when none can.
    fn load(nvmem: &mut M) -> Result<T, Error>;
}

impl<M: NvMem, T> Priors<M, T> for () {
    fn load(_nvmem: &mut M) -> Result<T, Error> {
        Err(Error::NoData)
    }
}

impl<M, T, D, const VERSION: u8, const FAULT_TOLERANT: bool, Rest> Priors<M, T>
    for (Prior<D, VERSION, FAULT_TOLERANT>, Rest)
where
    M: NvMem,
    D: Record + Into<T>,
    Rest: Priors<M, D>,
{
    fn load(nvmem: &mut M) -> Result<T, Error> {
        let loaded = {
            let mut prior: Persist<&mut M, D, VERSION, FAULT_TOLERANT> =
                Persist::new(&mut *nvmem)?;
            prior.init()?;
            prior.load()
        };

        match loaded {
            Ok(data) => Ok(data.into()),
            Err(Error::NoData) => Rest::load(nvmem).map(Into::into),
            Err(e) => Err(e),
        }
    }
}
