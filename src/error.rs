//! Error types for the rasterkit crate.

/// Errors that can occur while validating input or running a transform.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A raw buffer does not hold exactly `width * height * 4` bytes.
    #[error("buffer holds {actual} bytes, expected {expected} for a {width}x{height} RGBA image")]
    BufferLength {
        /// Declared image width in pixels.
        width: u32,
        /// Declared image height in pixels.
        height: u32,
        /// Expected byte count.
        expected: usize,
        /// Actual byte count.
        actual: usize,
    },

    /// The image has zero width or height.
    #[error("image has zero area ({width}x{height})")]
    EmptyImage {
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
    },

    /// Two inputs that must share dimensions do not.
    #[error("dimension mismatch: expected {}x{}, got {}x{}", expected.0, expected.1, actual.0, actual.1)]
    DimensionMismatch {
        /// Expected dimensions (width, height).
        expected: (u32, u32),
        /// Actual dimensions (width, height).
        actual: (u32, u32),
    },

    /// A setting would produce an invalid buffer (zero-sized output, out-of-bounds crop).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The image format is not supported.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// An error occurred while decoding or encoding an image.
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// An operation description could not be parsed.
    #[error("invalid settings: {0}")]
    Settings(#[from] serde_json::Error),
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
