//! Movie playback sessions over a runtime-loaded native decoder plugin.
//!
//! A [`runtime::DecoderRuntimeContext`] owns the plugin; each
//! [`session::MoviePlaybackSession`] owns one decoder instance and is driven
//! by polling once per host tick. [`movie::MoviePlayer`] adds the usual
//! load-on-start / play-on-start behaviour on top.

pub mod config;
pub mod convert;
pub mod detect;
pub mod error;
pub mod movie;
pub mod plugin;
pub mod runtime;
pub mod session;

pub use error::{ConvertError, PluginError, SessionError};
pub use runtime::{DecoderRuntimeContext, RuntimeOptions};
pub use session::{MoviePlaybackSession, MovieSource, OpenOptions, SessionState};
