//! Error types for the DCT/quantization core.
//!
//! Every failure here is fatal for the current compression or
//! decompression unit. Setup-time checks surface them from `start_pass`,
//! `start_input_pass`, `start_output_pass` or script validation, never
//! from per-block code.

use std::fmt;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for core operations.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A component references a quantization table that is not present
    NoQuantTable {
        /// Quantization table slot
        table: usize,
    },
    /// A quantization value is too large for the selected integer DCT
    QuantValueOutOfRange {
        /// Quantization table slot
        table: usize,
        /// Offending value
        value: u16,
    },
    /// Requested DCT/IDCT variant is not available
    UnsupportedMethod(&'static str),
    /// Requested IDCT output block size is not supported
    BadDctSize {
        /// Component index
        component: usize,
        /// Requested output size
        size: usize,
    },
    /// Scan references components incorrectly (repeated, unordered or out of range)
    BadScanScript {
        /// Scan number within the script
        scan: usize,
    },
    /// Illegal spectral selection or successive approximation parameters
    BadProgression {
        /// Scan number within the script
        scan: usize,
        /// Spectral selection start
        ss: u8,
        /// Spectral selection end
        se: u8,
        /// Successive approximation high bit
        ah: u8,
        /// Successive approximation low bit
        al: u8,
    },
    /// Too many or too few components
    ComponentCount {
        /// Number of components requested
        count: usize,
        /// Maximum allowed
        max: usize,
    },
    /// A component (or its DC band) is never transmitted
    MissingData {
        /// Component index
        component: usize,
    },
    /// Invalid quantization table index
    InvalidQuantTableIndex(usize),
    /// Invalid component index
    InvalidComponentIndex(usize),
    /// Invalid scan specification
    InvalidScanSpec {
        /// Reason for the invalid specification
        reason: &'static str,
    },
    /// Invalid Huffman table structure
    InvalidHuffmanTable,
    /// Huffman code length overflow (exceeds max allowed)
    HuffmanCodeLengthOverflow,
    /// Operation called in the wrong pass state
    BadState(&'static str),
    /// I/O error
    IoError(String),
    /// Memory allocation failed
    AllocationFailed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NoQuantTable { table } => {
                write!(f, "Quantization table 0x{:02x} was not defined", table)
            }
            Error::QuantValueOutOfRange { table, value } => {
                write!(
                    f,
                    "Quantization value {} in table 0x{:02x} is too large for this DCT method",
                    value, table
                )
            }
            Error::UnsupportedMethod(method) => {
                write!(f, "Requested feature was omitted at compile time: {}", method)
            }
            Error::BadDctSize { component, size } => {
                write!(
                    f,
                    "IDCT output block size {} not supported (component {})",
                    size, component
                )
            }
            Error::BadScanScript { scan } => {
                write!(f, "Invalid scan script at entry {}", scan)
            }
            Error::BadProgression {
                scan,
                ss,
                se,
                ah,
                al,
            } => {
                write!(
                    f,
                    "Invalid progressive parameters Ss={} Se={} Ah={} Al={} at scan script entry {}",
                    ss, se, ah, al, scan
                )
            }
            Error::ComponentCount { count, max } => {
                write!(f, "Too many color components: {}, max {}", count, max)
            }
            Error::MissingData { component } => {
                write!(f, "Scan script does not transmit all data (component {})", component)
            }
            Error::InvalidQuantTableIndex(idx) => {
                write!(f, "Invalid quantization table index: {}", idx)
            }
            Error::InvalidComponentIndex(idx) => {
                write!(f, "Invalid component index: {}", idx)
            }
            Error::InvalidScanSpec { reason } => {
                write!(f, "Invalid scan specification: {}", reason)
            }
            Error::InvalidHuffmanTable => {
                write!(f, "Invalid Huffman table structure")
            }
            Error::HuffmanCodeLengthOverflow => {
                write!(f, "Huffman code length overflow (exceeds 16 bits)")
            }
            Error::BadState(msg) => {
                write!(f, "Improper call in state: {}", msg)
            }
            Error::IoError(msg) => {
                write!(f, "I/O error: {}", msg)
            }
            Error::AllocationFailed => {
                write!(f, "Memory allocation failed")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(e.to_string())
    }
}

impl From<std::collections::TryReserveError> for Error {
    fn from(_: std::collections::TryReserveError) -> Self {
        Error::AllocationFailed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let errors = [
            (
                Error::NoQuantTable { table: 2 },
                "Quantization table 0x02 was not defined",
            ),
            (
                Error::UnsupportedMethod("float IDCT"),
                "Requested feature was omitted at compile time: float IDCT",
            ),
            (
                Error::BadDctSize {
                    component: 1,
                    size: 3,
                },
                "IDCT output block size 3 not supported (component 1)",
            ),
            (
                Error::BadScanScript { scan: 4 },
                "Invalid scan script at entry 4",
            ),
            (
                Error::BadProgression {
                    scan: 2,
                    ss: 1,
                    se: 70,
                    ah: 0,
                    al: 0,
                },
                "Invalid progressive parameters Ss=1 Se=70 Ah=0 Al=0 at scan script entry 2",
            ),
            (
                Error::ComponentCount { count: 5, max: 4 },
                "Too many color components: 5, max 4",
            ),
            (
                Error::MissingData { component: 0 },
                "Scan script does not transmit all data (component 0)",
            ),
            (
                Error::InvalidQuantTableIndex(5),
                "Invalid quantization table index: 5",
            ),
            (
                Error::InvalidComponentIndex(4),
                "Invalid component index: 4",
            ),
            (
                Error::InvalidScanSpec {
                    reason: "test reason",
                },
                "Invalid scan specification: test reason",
            ),
            (
                Error::InvalidHuffmanTable,
                "Invalid Huffman table structure",
            ),
            (
                Error::HuffmanCodeLengthOverflow,
                "Huffman code length overflow (exceeds 16 bits)",
            ),
            (
                Error::BadState("finish_pass before prepare"),
                "Improper call in state: finish_pass before prepare",
            ),
            (Error::IoError("disk full".into()), "I/O error: disk full"),
            (Error::AllocationFailed, "Memory allocation failed"),
        ];

        for (error, expected) in errors {
            assert_eq!(error.to_string(), expected, "Display mismatch for {:?}", error);
        }
    }

    #[test]
    fn test_error_is_std_error() {
        let err: Box<dyn std::error::Error> = Box::new(Error::AllocationFailed);
        assert_eq!(err.to_string(), "Memory allocation failed");
    }

    #[test]
    fn test_error_clone_eq() {
        let e1 = Error::NoQuantTable { table: 3 };
        let e2 = e1.clone();
        assert_eq!(e1, e2);
        assert_ne!(e1, Error::NoQuantTable { table: 1 });
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "broken pipe");
        let err: Error = io.into();
        assert_eq!(err, Error::IoError("broken pipe".into()));
    }

    #[test]
    fn test_from_try_reserve_error() {
        let mut v: Vec<u8> = Vec::new();
        let reserve_err = v.try_reserve(usize::MAX).unwrap_err();
        let err: Error = reserve_err.into();
        assert_eq!(err, Error::AllocationFailed);
    }
}
