use thiserror::Error;

/// Errors that can occur during persistence operations. The list is likely to
/// stay as is but marked as non-exhaustive to allow for future additions
/// without breaking the API. A caller would typically only need to handle
/// `NoData` as the other errors are either media faults or static
/// configuration defects.
#[derive(Error, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// No committed record exists. Either the region is virgin, every block
    /// failed its CRC check, or the region was last written by a firmware
    /// revision with a different version tag.
    #[error("no data")]
    NoData,

    /// The NVMem driver reported a read failure.
    #[error("read failed")]
    Read,

    /// The NVMem driver reported a write failure. The region has been
    /// rescanned and the previous record (if any) is active again.
    #[error("write failed")]
    Write,

    /// The NVMem driver reported an erase failure.
    #[error("erase failed")]
    Erase,

    /// The region cannot hold even a single page of record blocks, or the
    /// write/erase/read granularities do not nest.
    #[error("invalid region geometry")]
    InvalidGeometry,

    /// Fault tolerance was requested but the region only fits one page, so
    /// an erase would destroy the current record before its replacement is
    /// committed.
    #[error("region is not fault tolerant")]
    NotFaultTolerant,
}
