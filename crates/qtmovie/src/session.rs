//! One movie bound to one native decoder instance.
//!
//! Lifecycle: `Unknown -> Loading -> Loaded -> Playing <-> Stopped`, and back
//! to `Unknown` only through [`MoviePlaybackSession::close`]. Loading is
//! asynchronous inside the plugin; the host drives the session by calling
//! [`MoviePlaybackSession::poll`] once per tick.

use std::rc::Rc;
use std::sync::Arc;

use crate::convert::{ConverterSpec, FormatConverter, OutputTexture};
use crate::detect::FrameReadyDetector;
use crate::error::SessionError;
use crate::plugin::{DecoderHandle, LoadFlags, PixelFormat, SourceKind};
use crate::runtime::DecoderRuntimeContext;

/// Largest frame edge the session will build a converter for.
pub const MAX_MOVIE_DIMENSION: u32 = 4096;

/// Smallest in-memory buffer that can hold a container header.
pub const MIN_MEMORY_MOVIE_BYTES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum SessionState {
    #[default]
    Unknown,
    Loading,
    Loaded,
    Playing,
    Stopped,
}

#[derive(Debug, Clone)]
pub enum MovieSource {
    LocalFile(String),
    Url(String),
    /// Whole movie in memory. The buffer is held, unmoved, until the
    /// session closes because the plugin reads it in place.
    Memory { name: String, data: Arc<[u8]> },
}

impl MovieSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            MovieSource::LocalFile(_) => SourceKind::LocalFile,
            MovieSource::Url(_) => SourceKind::Url,
            MovieSource::Memory { .. } => SourceKind::Memory,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    pub looping: bool,
    pub allow_color_conversion: bool,
    /// Use the Rec. 709 matrix for YCbCr streams.
    pub use_extended_color_range: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            looping: false,
            allow_color_conversion: true,
            use_extended_color_range: true,
        }
    }
}

/// Stream description, all zero until the plugin has loaded properties.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MovieProperties {
    pub width: u32,
    pub height: u32,
    pub frame_count: u32,
    pub duration_seconds: f32,
    pub frame_rate: f32,
    pub pixel_format: PixelFormat,
}

pub struct MoviePlaybackSession {
    runtime: Rc<DecoderRuntimeContext>,
    handle: Option<DecoderHandle>,
    state: SessionState,
    source: Option<SourceKind>,
    filename: String,
    pinned: Option<Arc<[u8]>>,
    options: OpenOptions,
    properties: MovieProperties,
    is_prepared: bool,
    is_paused: bool,
    is_playing: bool,
    is_visual: bool,
    is_active: bool,
    volume: f32,
    detector: Box<dyn FrameReadyDetector>,
    converter: Option<Box<dyn FormatConverter>>,
}

impl MoviePlaybackSession {
    pub fn new(runtime: Rc<DecoderRuntimeContext>) -> Self {
        let detector = runtime.frame_ready_detector();
        Self {
            runtime,
            handle: None,
            state: SessionState::Unknown,
            source: None,
            filename: String::new(),
            pinned: None,
            options: OpenOptions::default(),
            properties: MovieProperties::default(),
            is_prepared: false,
            is_paused: true,
            is_playing: false,
            is_visual: false,
            is_active: false,
            volume: 1.0,
            detector,
            converter: None,
        }
    }

    pub fn open_file(&mut self, path: &str, options: OpenOptions) -> Result<bool, SessionError> {
        self.open(MovieSource::LocalFile(path.to_string()), options)
    }

    pub fn open_url(&mut self, url: &str, options: OpenOptions) -> Result<bool, SessionError> {
        self.open(MovieSource::Url(url.to_string()), options)
    }

    pub fn open_memory(
        &mut self,
        name: &str,
        data: impl Into<Arc<[u8]>>,
        options: OpenOptions,
    ) -> Result<bool, SessionError> {
        self.open(
            MovieSource::Memory {
                name: name.to_string(),
                data: data.into(),
            },
            options,
        )
    }

    /// Close whatever is open and start loading `source`.
    ///
    /// Returns `Ok(false)` (state stays `Unknown`) for an invalid source, a
    /// rejected load or when no decoder instance is available. Errors only
    /// when the runtime itself is gone.
    pub fn open(&mut self, source: MovieSource, options: OpenOptions) -> Result<bool, SessionError> {
        self.runtime.ensure_available()?;
        self.close();

        self.options = options;
        self.source = Some(source.kind());
        let memory = match source {
            MovieSource::LocalFile(path) => {
                let path = path.trim();
                self.filename = if path.is_empty() {
                    String::new()
                } else {
                    self.runtime.resolve_path(path)
                };
                None
            }
            MovieSource::Url(url) => {
                self.filename = url.trim().to_string();
                None
            }
            MovieSource::Memory { name, data } => {
                self.filename = name.trim().to_string();
                if data.len() < MIN_MEMORY_MOVIE_BYTES {
                    log::warn!(
                        "Movie buffer '{}' too small ({} bytes)",
                        self.filename,
                        data.len()
                    );
                    return Ok(false);
                }
                Some(data)
            }
        };

        if memory.is_none() && self.filename.is_empty() {
            log::warn!("Invalid movie file specified");
            return Ok(false);
        }

        let runtime = Rc::clone(&self.runtime);
        let backend = runtime.backend();
        let Some(handle) = runtime.acquire_instance() else {
            log::warn!("No decoder instance available for '{}'", self.filename);
            return Ok(false);
        };
        self.handle = Some(handle);
        backend.set_active(handle, self.is_active);

        let flags = LoadFlags {
            looping: options.looping,
            allow_color_conversion: options.allow_color_conversion,
        };
        let loaded = match memory {
            Some(data) => {
                let data = self.pinned.insert(data);
                // SAFETY: the buffer is stored in `self.pinned` and only dropped
                // in `close`, after the handle has been released.
                unsafe { backend.load_from_memory(handle, data.as_ptr(), data.len(), flags) }
            }
            None if self.source == Some(SourceKind::Url) => {
                backend.load_from_url(handle, &self.filename, flags)
            }
            None => backend.load_from_file(handle, &self.filename, flags),
        };

        if !loaded {
            log::warn!("Movie failed to load: {}", self.filename);
            self.close();
            return Ok(false);
        }

        self.state = SessionState::Loading;
        Ok(true)
    }

    /// Drive the session one tick. Returns true when a new frame was handed
    /// to the converter.
    pub fn poll(&mut self, force: bool) -> Result<bool, SessionError> {
        self.runtime.ensure_available()?;
        let Some(handle) = self.handle else {
            return Ok(false);
        };
        let runtime = Rc::clone(&self.runtime);
        let backend = runtime.backend();

        if !backend.is_loadable(handle) {
            log::warn!("Unable to load movie: {}", self.filename);
            self.close();
            return Ok(false);
        }

        if !self.is_prepared {
            if backend.are_properties_loaded(handle) {
                self.prepare_movie();
            }
            return Ok(false);
        }

        backend.update(handle);

        // The detector runs even when forced so its counter stays current.
        let ready = self.detector.frame_ready(backend, handle) || force;
        if ready && self.is_visual {
            if let Some(converter) = self.converter.as_mut() {
                converter.update(backend, handle);
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn prepare_movie(&mut self) -> bool {
        let Some(handle) = self.handle else {
            return false;
        };
        let runtime = Rc::clone(&self.runtime);
        let backend = runtime.backend();

        // Memory loads publish their properties with the load itself.
        if self.source != Some(SourceKind::Memory) && !backend.load_properties(handle) {
            log::warn!("Failed loading movie properties: {}", self.filename);
            self.close();
            return false;
        }

        backend.set_volume(handle, self.volume);
        self.properties = MovieProperties {
            width: u32::try_from(backend.width(handle)).unwrap_or(0),
            height: u32::try_from(backend.height(handle)).unwrap_or(0),
            frame_count: backend.frame_count(handle),
            duration_seconds: backend.duration_seconds(handle),
            frame_rate: backend.frame_rate(handle),
            pixel_format: backend.pixel_format(handle),
        };
        self.is_prepared = true;
        self.state = SessionState::Loaded;

        let p = &self.properties;
        log::info!(
            "Loaded movie {} [{}x{} @ {}hz] {:?} {} sec {} frames",
            self.filename,
            p.width,
            p.height,
            p.frame_rate,
            p.pixel_format,
            p.duration_seconds,
            p.frame_count
        );

        self.classify_stream(handle);
        true
    }

    /// Build a converter for visual streams, or settle on audio-only.
    fn classify_stream(&mut self, handle: DecoderHandle) {
        let MovieProperties {
            width,
            height,
            pixel_format,
            ..
        } = self.properties;

        if width == 0 || height == 0 {
            // No video track; most likely audio.
            self.degrade_to_audio_only();
            return;
        }
        if width > MAX_MOVIE_DIMENSION || height > MAX_MOVIE_DIMENSION {
            log::error!("Movie resolution {width}x{height} is too large");
            self.degrade_to_audio_only();
            return;
        }
        if pixel_format == PixelFormat::Unknown {
            log::warn!("Unknown video format");
            self.degrade_to_audio_only();
            return;
        }

        let runtime = Rc::clone(&self.runtime);
        let spec = ConverterSpec {
            width,
            height,
            format: pixel_format,
            extended_range: self.options.use_extended_color_range,
            swap_red_blue: runtime.swap_red_blue(),
        };
        let converter = self
            .converter
            .get_or_insert_with(|| runtime.create_converter());
        match converter.build(runtime.backend(), handle, &spec) {
            Ok(()) => self.is_visual = true,
            Err(e) => {
                log::warn!("Unable to convert video format: {e}");
                self.degrade_to_audio_only();
            }
        }
    }

    fn degrade_to_audio_only(&mut self) {
        self.properties.width = 0;
        self.properties.height = 0;
        self.is_visual = false;
        self.converter = None;
    }

    pub fn play(&mut self) {
        let Some(handle) = self.live_handle() else {
            return;
        };
        if self.is_prepared && self.is_paused {
            self.runtime.backend().play(handle);
            self.is_paused = false;
            self.is_playing = true;
            self.state = SessionState::Playing;
        }
    }

    pub fn pause(&mut self) {
        let Some(handle) = self.live_handle() else {
            return;
        };
        if !self.is_paused {
            self.runtime.backend().stop(handle);
            self.is_paused = true;
            self.is_playing = false;
            self.state = SessionState::Stopped;
        }
    }

    /// Return to `Unknown`, releasing the decoder instance and any pinned
    /// buffer. Safe from any state, including already closed. A built
    /// converter is reset and kept for the next open.
    pub fn close(&mut self) {
        // Stop the decoder before tearing the instance down.
        self.pause();

        self.is_visual = false;
        self.properties = MovieProperties::default();
        self.is_prepared = false;
        self.is_paused = true;
        self.is_playing = false;
        self.state = SessionState::Unknown;
        self.detector.reset();

        if let Some(converter) = self.converter.as_mut() {
            converter.reset();
        }

        if let Some(handle) = self.handle.take() {
            self.runtime.release_instance(handle);
        }
        // Only after the plugin let go of the instance reading it.
        self.pinned = None;
    }

    /// Close and also destroy the converter.
    pub fn dispose(&mut self) {
        self.close();
        self.converter = None;
    }

    fn live_handle(&self) -> Option<DecoderHandle> {
        self.handle.filter(|_| self.runtime.is_initialised())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn handle(&self) -> Option<DecoderHandle> {
        self.handle
    }

    pub fn source(&self) -> Option<SourceKind> {
        self.source
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn properties(&self) -> &MovieProperties {
        &self.properties
    }

    pub fn width(&self) -> u32 {
        self.properties.width
    }

    pub fn height(&self) -> u32 {
        self.properties.height
    }

    pub fn frame_rate(&self) -> f32 {
        self.properties.frame_rate
    }

    pub fn duration_seconds(&self) -> f32 {
        self.properties.duration_seconds
    }

    pub fn frame_count(&self) -> u32 {
        self.properties.frame_count
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.properties.pixel_format
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.properties.height == 0 {
            return 0.0;
        }
        self.properties.width as f32 / self.properties.height as f32
    }

    pub fn is_prepared(&self) -> bool {
        self.is_prepared
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    /// True when the stream has a picture and a converter for it.
    pub fn is_visual(&self) -> bool {
        self.is_visual
    }

    pub fn is_looping(&self) -> bool {
        self.options.looping
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn set_active(&mut self, active: bool) {
        self.is_active = active;
        if let Some(handle) = self.live_handle() {
            self.runtime.backend().set_active(handle, active);
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
        if let Some(handle) = self.live_handle() {
            self.runtime.backend().set_volume(handle, volume);
        }
    }

    pub fn playback_rate(&self) -> f32 {
        self.live_handle()
            .map_or(0.0, |h| self.runtime.backend().playback_rate(h))
    }

    pub fn set_playback_rate(&mut self, rate: f32) {
        if let Some(handle) = self.live_handle() {
            self.runtime.backend().set_playback_rate(handle, rate);
        }
    }

    /// Seconds of the movie available for playback so far.
    pub fn loaded_seconds(&self) -> f32 {
        self.live_handle().map_or(0.0, |h| {
            self.runtime.backend().loaded_fraction(h) * self.properties.duration_seconds
        })
    }

    pub fn frame(&self) -> u32 {
        self.live_handle()
            .map_or(0, |h| self.runtime.backend().current_frame(h))
    }

    /// Seek to a frame index; the decoder clamps out-of-range values.
    pub fn seek_frame(&mut self, frame: u32) {
        if let Some(handle) = self.live_handle() {
            self.runtime.backend().seek_frame(handle, frame);
        }
    }

    pub fn position_seconds(&self) -> f32 {
        self.live_handle()
            .map_or(0.0, |h| self.runtime.backend().position_seconds(h))
    }

    /// Seek to a time. Positions beyond what has been loaded so far are
    /// ignored; returns whether the seek was issued.
    pub fn seek_seconds(&mut self, seconds: f32) -> bool {
        let Some(handle) = self.live_handle() else {
            return false;
        };
        let loaded = self.loaded_seconds();
        if seconds.is_nan() || seconds > loaded {
            log::debug!("Ignoring seek to {seconds}s; only {loaded}s loaded");
            return false;
        }
        self.runtime.backend().seek_seconds(handle, seconds);
        true
    }

    /// Converted texture, once the converter holds a valid picture.
    pub fn output_texture(&self) -> Option<&OutputTexture> {
        self.converter
            .as_ref()
            .filter(|c| c.is_valid_picture())
            .and_then(|c| c.output_texture())
    }

    pub fn display_frame(&self) -> Option<u32> {
        self.converter.as_ref().and_then(|c| c.display_frame())
    }

    pub fn has_converter(&self) -> bool {
        self.converter.is_some()
    }
}

impl Drop for MoviePlaybackSession {
    fn drop(&mut self) {
        self.dispose();
    }
}
