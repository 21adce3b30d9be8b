use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the simulator
#[derive(Error, Debug)]
pub enum SimulatorError {
    #[error("Failed to load ELF file: {0}")]
    ElfLoadError(#[from] ElfError),

    #[error("Memory error: {0}")]
    MemoryError(#[from] MemoryError),

    #[error("Invalid configuration: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("Malformed trace '{0}': {1}")]
    TraceError(PathBuf, String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Plotting error: {0}")]
    PlotError(String),
}

/// Errors related to ELF file operations
#[derive(Error, Debug)]
pub enum ElfError {
    #[error("Failed to read ELF file '{0}': {1}")]
    FileReadError(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse ELF file '{0}': {1}")]
    ParseError(PathBuf, String),

    #[error("Invalid ELF format: {0}")]
    InvalidFormat(String),

    #[error("Segment at {0:#x} does not fit in the 64-bit address space")]
    AddressOutOfBounds(u64),

    #[error("Invalid ELF machine type: {0}")]
    InvalidMachine(u16),
}

/// Errors raised by the memory interface.
/// Inside the pipeline these never escape: the stage that
/// sees one turns it into an `INS` or `ADR` status.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("Memory access error at address {address:#x}: {kind}")]
    AccessError { address: u64, kind: MemoryErrorKind },

    #[error("Invalid memory alignment: address {0:#x} is not aligned to {1} bytes")]
    AlignmentError(u64, u64),
}

/// Specific kinds of memory errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryErrorKind {
    #[error("Address is not in an executable segment")]
    NotExecutable,

    #[error("Address is not in a readable segment")]
    NotReadable,

    #[error("Address is not in a writable segment")]
    NotWritable,
}

/// Reasons a cache geometry is rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("cache parameters must be given all together or not at all")]
    PartialCacheConfig,

    #[error("block size {0} must be at least 8 and a power of 2")]
    InvalidBlockSize(u64),

    #[error("associativity must be at least 1")]
    InvalidAssociativity,

    #[error("the number of sets ({0}) must be a power of 2")]
    InvalidSetCount(u64),

    #[error("capacity {0} exceeds the largest supported cache")]
    CapacityTooLarge(u64),
}

/// Type alias for Result with SimulatorError
pub type SimulatorResult<T> = Result<T, SimulatorError>;
