use thiserror::Error;

/// Failure to unmarshal a payload. A decode that fails never yields a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unexpected end of input")]
    Truncated,

    #[error("serial size exceeds the ceiling of {max} bytes")]
    SizeExceeded { max: usize },

    #[error("list of {count} elements exceeds the ceiling of {max}")]
    ListExceeded { count: u64, max: usize },

    #[error("field value of {len} bytes exceeds the ceiling of {max}")]
    FieldSizeExceeded { len: u64, max: usize },

    #[error("field index {index} out of range for a struct with {count} fields")]
    FieldIndex { index: usize, count: usize },

    #[error("field index {index} is not in ascending order")]
    FieldOrder { index: usize },

    #[error("malformed field header {0:#04x}")]
    Header(u8),

    #[error("integer exceeds {bits} bits")]
    Overflow { bits: u32 },

    #[error("invalid boolean byte {0:#04x}")]
    Bool(u8),

    #[error("timestamp nanoseconds {0} out of range")]
    Nanos(u64),

    #[error("struct nesting exceeds the ceiling of {max} levels")]
    DepthExceeded { max: usize },
}

/// Failure to marshal a value. A marshal that fails never yields bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("serial size of {size} bytes exceeds the ceiling of {max}")]
    SizeExceeded { size: usize, max: usize },

    #[error("list of {count} elements exceeds the ceiling of {max}")]
    ListExceeded { count: usize, max: usize },

    #[error("field value of {len} bytes exceeds the ceiling of {max}")]
    FieldSizeExceeded { len: usize, max: usize },

    #[error("timestamp nanoseconds {0} out of range")]
    Nanos(u32),

    #[error("struct nesting exceeds the ceiling of {max} levels")]
    DepthExceeded { max: usize },
}
