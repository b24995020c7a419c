use core::fmt;

/// The ways a context can reject its input or its own state.
///
/// Every failure is reported by the call that detects it, and a failing
/// call never leaves partial output behind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// The key is not a length the context supports.
    InvalidKeyLength,
    /// A tag buffer was not exactly 16 bytes.
    InvalidTagLength,
    /// The customization string is longer than 127 bytes.
    InvalidCustomLength,
    /// The requested output size is zero, or too large to count in bits.
    InvalidOutputSize,
    /// The caller's buffer is shorter than the output to be written.
    OutputTooSmall,
    /// A keyed operation was started before any key was set.
    MissingKey,
    /// Data arrived outside of the absorbing state.
    NotInitialized,
    /// The context has already performed its one encryption or decryption.
    AlreadyUsed,
    /// The authentication tag did not match the data.
    InvalidTag,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::InvalidKeyLength => "unsupported key length",
            Error::InvalidTagLength => "tag buffers must be exactly 16 bytes",
            Error::InvalidCustomLength => "customization string longer than 127 bytes",
            Error::InvalidOutputSize => "requested output size not representable",
            Error::OutputTooSmall => "output buffer too small",
            Error::MissingKey => "no key was set",
            Error::NotInitialized => "context is not absorbing input",
            Error::AlreadyUsed => "context already performed its one crypto operation",
            Error::InvalidTag => "authentication tag mismatch",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for Error {}
