//! Error types for the pickle codec

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PickleError>;

/// Errors raised while decoding or encoding a pickle stream.
///
/// Offsets are byte positions of the opcode being executed.
#[derive(Error, Debug)]
pub enum PickleError {
    /// Underlying reader/writer failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stream ended before STOP
    #[error("unexpected end of pickle data at offset {offset}")]
    Truncated { offset: u64 },

    /// Byte is not a pickle opcode
    #[error("unknown opcode 0x{opcode:02x} ({printable:?}) at offset {offset}")]
    UnknownOpcode {
        opcode: u8,
        printable: char,
        offset: u64,
    },

    /// Opcode exists but this decoder does not execute it
    #[error("unsupported opcode {name} at offset {offset}")]
    UnsupportedOpcode { name: &'static str, offset: u64 },

    /// PROTO announced a version above the highest supported one
    #[error("unsupported pickle protocol {0}")]
    UnsupportedProtocol(u8),

    #[error("stack underflow at offset {offset}")]
    StackUnderflow { offset: u64 },

    #[error("no MARK on the stack at offset {offset}")]
    MissingMark { offset: u64 },

    #[error("memo has no entry {id} (offset {offset})")]
    MissingMemo { id: u32, offset: u64 },

    /// Operand has the wrong Python type for the opcode
    #[error("expected {expected}, found {found} at offset {offset}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
        offset: u64,
    },

    /// Legacy string could not be decoded with the configured encoding
    #[error("'{encoding}' codec can't decode byte 0x{byte:02x} in position {position} (offset {offset})")]
    Decode {
        encoding: &'static str,
        byte: u8,
        position: usize,
        offset: u64,
    },

    /// Malformed text argument of a protocol 0 opcode
    #[error("invalid literal {literal:?} for {opcode} at offset {offset}")]
    InvalidLiteral {
        opcode: &'static str,
        literal: String,
        offset: u64,
    },

    #[error("integer does not fit in 64 bits at offset {offset}")]
    IntegerOverflow { offset: u64 },

    /// Array state or payload inconsistent with its dtype and shape
    #[error("invalid ndarray: {0}")]
    InvalidArray(String),

    #[error("unsupported dtype {0:?}")]
    UnsupportedDType(String),

    /// Value cannot be represented by the encoder
    #[error("cannot pickle value: {0}")]
    Unencodable(String),
}
