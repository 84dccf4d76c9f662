use thiserror::Error;

use crate::plugin::PixelFormat;

/// Failures loading or initialising the native decoder plugin.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("movie plugin library not found (searched: {})", searched.join(", "))]
    NotFound { searched: Vec<String> },
    #[error("movie plugin symbol {name} not found: {reason}")]
    MissingSymbol { name: String, reason: String },
    #[error("movie plugin failed to initialise")]
    InitFailed,
}

/// Hard failures surfaced past the session boundary.
///
/// Everything else (bad sources, rejected loads, unsupported formats) is
/// reported through logging plus the returned bool and session state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("decoder runtime is not initialised; create a DecoderRuntimeContext before opening movies")]
    RuntimeUnavailable,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConvertError {
    #[error("no conversion shader for pixel format {0:?}")]
    UnsupportedFormat(PixelFormat),
    #[error("invalid converter size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
}
