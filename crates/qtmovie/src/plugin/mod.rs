//! Narrow interface over the native movie decoding plugin.
//!
//! The plugin is a black box addressed through integer instance handles. It
//! decodes on its own threads; every query here is a non-blocking read of
//! state the plugin has already published.

pub mod ffi;
#[cfg(test)]
pub mod mock;

use serde::{Deserialize, Serialize};

/// Opaque identifier for one native decode instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecoderHandle(i32);

impl DecoderHandle {
    /// Wrap a raw handle returned by the plugin. Negative values mean
    /// "no instance available".
    pub const fn from_raw(raw: i32) -> Option<Self> {
        if raw >= 0 { Some(Self(raw)) } else { None }
    }

    pub const fn raw(self) -> i32 {
        self.0
    }
}

/// Pixel layout of decoded frames as reported by the plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    #[default]
    Unknown,
    Rgba32,
    YCbCr,
    HapRgb,
    HapRgba,
    HapRgbHq,
}

impl PixelFormat {
    pub const fn from_raw(raw: i32) -> Self {
        match raw {
            1 => PixelFormat::Rgba32,
            2 => PixelFormat::YCbCr,
            3 => PixelFormat::HapRgb,
            4 => PixelFormat::HapRgba,
            5 => PixelFormat::HapRgbHq,
            _ => PixelFormat::Unknown,
        }
    }

    /// Hap variants carry DXT-compressed blocks of 4x4 texels.
    pub const fn is_block_compressed(self) -> bool {
        matches!(
            self,
            PixelFormat::HapRgb | PixelFormat::HapRgba | PixelFormat::HapRgbHq
        )
    }
}

/// Where a movie is loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SourceKind {
    #[default]
    LocalFile,
    Url,
    Memory,
}

/// Graphics API of the host renderer the plugin uploads textures into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GraphicsApi {
    OpenGl,
    Direct3D9,
    Direct3D11,
    Metal,
    #[default]
    Unknown,
}

/// What the loaded plugin build can do for the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackendCapabilities {
    /// Plugin can update host textures itself from a render-thread event.
    pub native_texture_update: bool,
    pub graphics_api: GraphicsApi,
}

/// Flags passed with every load request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadFlags {
    pub looping: bool,
    /// Let the plugin hand out YCbCr frames instead of converting to RGBA itself.
    pub allow_color_conversion: bool,
}

/// Handle-based contract of the native decoder plugin.
///
/// One implementation exists per platform binding ([`ffi::NativePlugin`]);
/// sessions only ever see this trait. Getters on a handle that is not loaded
/// return zero values.
pub trait DecoderBackend {
    fn init(&self, legacy_gl: bool) -> bool;
    fn deinit(&self);
    fn version(&self) -> f32;
    fn capabilities(&self) -> BackendCapabilities;

    fn acquire_instance(&self) -> Option<DecoderHandle>;
    fn release_instance(&self, handle: DecoderHandle);

    fn load_from_file(&self, handle: DecoderHandle, path: &str, flags: LoadFlags) -> bool;
    fn load_from_url(&self, handle: DecoderHandle, url: &str, flags: LoadFlags) -> bool;
    /// Start loading a movie held in memory.
    ///
    /// # Safety
    ///
    /// The plugin keeps `data` without copying. The `len` bytes behind it
    /// must stay valid and unmoved until `release_instance(handle)` returns.
    unsafe fn load_from_memory(
        &self,
        handle: DecoderHandle,
        data: *const u8,
        len: usize,
        flags: LoadFlags,
    ) -> bool;

    /// False once the asynchronous load has failed for good.
    fn is_loadable(&self, handle: DecoderHandle) -> bool;
    fn are_properties_loaded(&self, handle: DecoderHandle) -> bool;
    fn load_properties(&self, handle: DecoderHandle) -> bool;

    fn width(&self, handle: DecoderHandle) -> i32;
    fn height(&self, handle: DecoderHandle) -> i32;
    fn frame_count(&self, handle: DecoderHandle) -> u32;
    fn duration_seconds(&self, handle: DecoderHandle) -> f32;
    fn frame_rate(&self, handle: DecoderHandle) -> f32;
    fn pixel_format(&self, handle: DecoderHandle) -> PixelFormat;

    /// Fraction of the movie downloaded/buffered so far, 0.0..=1.0.
    fn loaded_fraction(&self, handle: DecoderHandle) -> f32;
    /// Monotonic count of frames the decoder has drawn.
    fn frames_drawn(&self, handle: DecoderHandle) -> u32;
    fn current_frame(&self, handle: DecoderHandle) -> u32;
    fn seek_frame(&self, handle: DecoderHandle, frame: u32);
    fn position_seconds(&self, handle: DecoderHandle) -> f32;
    fn seek_seconds(&self, handle: DecoderHandle, seconds: f32);
    fn set_volume(&self, handle: DecoderHandle, volume: f32);
    fn playback_rate(&self, handle: DecoderHandle) -> f32;
    fn set_playback_rate(&self, handle: DecoderHandle, rate: f32);

    fn play(&self, handle: DecoderHandle);
    fn stop(&self, handle: DecoderHandle);
    /// Advance the instance's clock; called once per tick while prepared.
    fn update(&self, handle: DecoderHandle);
    /// Visibility/focus hint.
    fn set_active(&self, handle: DecoderHandle, active: bool);
    /// Push newly decoded frames of every instance into their host textures.
    fn update_all_textures(&self);
}
