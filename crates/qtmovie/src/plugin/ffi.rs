//! Raw FFI definitions and runtime loader for the native movie plugin.
//! Loads the plugin dynamically at runtime so no build-time SDK dependency is needed.

use std::ffi::CString;
use std::os::raw::{c_char, c_float, c_int};
use std::path::{Path, PathBuf};

use super::{
    BackendCapabilities, DecoderBackend, DecoderHandle, GraphicsApi, LoadFlags, PixelFormat,
};
use crate::error::PluginError;

/// Extra directory searched before the default locations.
pub const PLUGIN_DIR_ENV: &str = "QTMOVIE_PLUGIN_DIR";

type FnInit = unsafe extern "C" fn(bool) -> bool;
type FnVoid = unsafe extern "C" fn();
type FnVersion = unsafe extern "C" fn() -> c_float;
type FnAcquire = unsafe extern "C" fn() -> c_int;
type FnHandle = unsafe extern "C" fn(c_int);
type FnHandleBool = unsafe extern "C" fn(c_int) -> bool;
type FnHandleInt = unsafe extern "C" fn(c_int) -> c_int;
type FnHandleUint = unsafe extern "C" fn(c_int) -> u32;
type FnHandleFloat = unsafe extern "C" fn(c_int) -> c_float;
type FnSetUint = unsafe extern "C" fn(c_int, u32);
type FnSetFloat = unsafe extern "C" fn(c_int, c_float);
type FnSetBool = unsafe extern "C" fn(c_int, bool);
type FnLoadPath = unsafe extern "C" fn(c_int, *const c_char, bool, bool) -> bool;
type FnLoadMemory = unsafe extern "C" fn(c_int, *const u8, u32, bool, bool) -> bool;

/// Loaded plugin library with resolved function pointers.
pub struct NativePlugin {
    _lib: libloading::Library,
    graphics_api: GraphicsApi,
    fn_init: FnInit,
    fn_deinit: FnVoid,
    fn_version: FnVersion,
    fn_acquire: FnAcquire,
    fn_release: FnHandle,
    fn_load_file: FnLoadPath,
    fn_load_url: FnLoadPath,
    fn_load_memory: FnLoadMemory,
    fn_is_loadable: FnHandleBool,
    fn_properties_loaded: FnHandleBool,
    fn_load_properties: FnHandleBool,
    fn_width: FnHandleInt,
    fn_height: FnHandleInt,
    fn_frame_count: FnHandleInt,
    fn_duration: FnHandleFloat,
    fn_frame_rate: FnHandleFloat,
    fn_pixel_format: FnHandleInt,
    fn_loaded_fraction: FnHandleFloat,
    fn_frames_drawn: FnHandleUint,
    fn_current_frame: FnHandleUint,
    fn_seek_frame: FnSetUint,
    fn_position: FnHandleFloat,
    fn_seek_seconds: FnSetFloat,
    fn_set_volume: FnSetFloat,
    fn_playback_rate: FnHandleFloat,
    fn_set_playback_rate: FnSetFloat,
    fn_play: FnHandle,
    fn_stop: FnHandle,
    fn_update: FnHandle,
    fn_set_active: FnSetBool,
    /// Only present in builds that can write host textures directly.
    fn_update_all_textures: Option<FnVoid>,
}

/// Resolve one exported symbol.
///
/// # Safety
///
/// `T` must match the C signature of the export named `name`.
unsafe fn symbol<T: Copy>(lib: &libloading::Library, name: &'static [u8]) -> Result<T, PluginError> {
    // SAFETY: signature correctness is the caller's contract.
    unsafe { lib.get::<T>(name) }
        .map(|s| *s)
        .map_err(|e| PluginError::MissingSymbol {
            name: String::from_utf8_lossy(name.strip_suffix(b"\0").unwrap_or(name)).into_owned(),
            reason: e.to_string(),
        })
}

impl NativePlugin {
    /// Find and load the plugin library, resolving every export.
    pub fn load(graphics_api: GraphicsApi) -> Result<Self, PluginError> {
        let mut diagnostics = Vec::new();
        let lib = load_plugin_library(&mut diagnostics)?;

        // SAFETY: each type alias mirrors the plugin's exported C signature.
        unsafe {
            let fn_update_all_textures = symbol::<FnVoid>(&lib, b"UpdateAllTextures\0").ok();
            Ok(Self {
                graphics_api,
                fn_init: symbol(&lib, b"Init\0")?,
                fn_deinit: symbol(&lib, b"Deinit\0")?,
                fn_version: symbol(&lib, b"GetPluginVersion\0")?,
                fn_acquire: symbol(&lib, b"GetInstanceHandle\0")?,
                fn_release: symbol(&lib, b"FreeInstanceHandle\0")?,
                fn_load_file: symbol(&lib, b"LoadMovieFromFile\0")?,
                fn_load_url: symbol(&lib, b"LoadMovieFromURL\0")?,
                fn_load_memory: symbol(&lib, b"LoadMovieFromMemory\0")?,
                fn_is_loadable: symbol(&lib, b"IsMovieLoadable\0")?,
                fn_properties_loaded: symbol(&lib, b"IsMoviePropertiesLoaded\0")?,
                fn_load_properties: symbol(&lib, b"LoadMovieProperties\0")?,
                fn_width: symbol(&lib, b"GetWidth\0")?,
                fn_height: symbol(&lib, b"GetHeight\0")?,
                fn_frame_count: symbol(&lib, b"GetFrameCount\0")?,
                fn_duration: symbol(&lib, b"GetDurationSeconds\0")?,
                fn_frame_rate: symbol(&lib, b"GetFrameRate\0")?,
                fn_pixel_format: symbol(&lib, b"GetFramePixelFormat\0")?,
                fn_loaded_fraction: symbol(&lib, b"GetLoadedFraction\0")?,
                fn_frames_drawn: symbol(&lib, b"GetNumFramesDrawn\0")?,
                fn_current_frame: symbol(&lib, b"GetCurrentFrame\0")?,
                fn_seek_frame: symbol(&lib, b"SeekFrame\0")?,
                fn_position: symbol(&lib, b"GetCurrentPositionSeconds\0")?,
                fn_seek_seconds: symbol(&lib, b"SeekSeconds\0")?,
                fn_set_volume: symbol(&lib, b"SetVolume\0")?,
                fn_playback_rate: symbol(&lib, b"GetPlaybackRate\0")?,
                fn_set_playback_rate: symbol(&lib, b"SetPlaybackRate\0")?,
                fn_play: symbol(&lib, b"Play\0")?,
                fn_stop: symbol(&lib, b"Stop\0")?,
                fn_update: symbol(&lib, b"Update\0")?,
                fn_set_active: symbol(&lib, b"SetActive\0")?,
                fn_update_all_textures,
                _lib: lib,
            })
        }
    }

    fn load_path(&self, f: FnLoadPath, handle: DecoderHandle, path: &str, flags: LoadFlags) -> bool {
        let Ok(c_path) = CString::new(path) else {
            log::warn!("Movie path contains a NUL byte: {path:?}");
            return false;
        };
        // SAFETY: c_path outlives the call; the plugin copies the string.
        unsafe { f(handle.raw(), c_path.as_ptr(), flags.looping, flags.allow_color_conversion) }
    }
}

// SAFETY (all blocks below): plain calls through resolved function pointers of a
// library kept alive by `_lib`, with integer handles the plugin validates itself.
impl DecoderBackend for NativePlugin {
    fn init(&self, legacy_gl: bool) -> bool {
        // SAFETY: see impl note.
        unsafe { (self.fn_init)(legacy_gl) }
    }

    fn deinit(&self) {
        // SAFETY: see impl note.
        unsafe { (self.fn_deinit)() }
    }

    fn version(&self) -> f32 {
        // SAFETY: see impl note.
        unsafe { (self.fn_version)() }
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            native_texture_update: self.fn_update_all_textures.is_some(),
            graphics_api: self.graphics_api,
        }
    }

    fn acquire_instance(&self) -> Option<DecoderHandle> {
        // SAFETY: see impl note.
        DecoderHandle::from_raw(unsafe { (self.fn_acquire)() })
    }

    fn release_instance(&self, handle: DecoderHandle) {
        // SAFETY: see impl note.
        unsafe { (self.fn_release)(handle.raw()) }
    }

    fn load_from_file(&self, handle: DecoderHandle, path: &str, flags: LoadFlags) -> bool {
        self.load_path(self.fn_load_file, handle, path, flags)
    }

    fn load_from_url(&self, handle: DecoderHandle, url: &str, flags: LoadFlags) -> bool {
        self.load_path(self.fn_load_url, handle, url, flags)
    }

    unsafe fn load_from_memory(
        &self,
        handle: DecoderHandle,
        data: *const u8,
        len: usize,
        flags: LoadFlags,
    ) -> bool {
        let Ok(len) = u32::try_from(len) else {
            log::warn!("Movie buffer of {len} bytes is too large for the plugin");
            return false;
        };
        // SAFETY: the caller keeps `data` alive until the handle is released.
        unsafe {
            (self.fn_load_memory)(
                handle.raw(),
                data,
                len,
                flags.looping,
                flags.allow_color_conversion,
            )
        }
    }

    fn is_loadable(&self, handle: DecoderHandle) -> bool {
        // SAFETY: see impl note.
        unsafe { (self.fn_is_loadable)(handle.raw()) }
    }

    fn are_properties_loaded(&self, handle: DecoderHandle) -> bool {
        // SAFETY: see impl note.
        unsafe { (self.fn_properties_loaded)(handle.raw()) }
    }

    fn load_properties(&self, handle: DecoderHandle) -> bool {
        // SAFETY: see impl note.
        unsafe { (self.fn_load_properties)(handle.raw()) }
    }

    fn width(&self, handle: DecoderHandle) -> i32 {
        // SAFETY: see impl note.
        unsafe { (self.fn_width)(handle.raw()) }
    }

    fn height(&self, handle: DecoderHandle) -> i32 {
        // SAFETY: see impl note.
        unsafe { (self.fn_height)(handle.raw()) }
    }

    fn frame_count(&self, handle: DecoderHandle) -> u32 {
        // SAFETY: see impl note.
        let count = unsafe { (self.fn_frame_count)(handle.raw()) };
        u32::try_from(count).unwrap_or(0)
    }

    fn duration_seconds(&self, handle: DecoderHandle) -> f32 {
        // SAFETY: see impl note.
        unsafe { (self.fn_duration)(handle.raw()) }
    }

    fn frame_rate(&self, handle: DecoderHandle) -> f32 {
        // SAFETY: see impl note.
        unsafe { (self.fn_frame_rate)(handle.raw()) }
    }

    fn pixel_format(&self, handle: DecoderHandle) -> PixelFormat {
        // SAFETY: see impl note.
        PixelFormat::from_raw(unsafe { (self.fn_pixel_format)(handle.raw()) })
    }

    fn loaded_fraction(&self, handle: DecoderHandle) -> f32 {
        // SAFETY: see impl note.
        unsafe { (self.fn_loaded_fraction)(handle.raw()) }
    }

    fn frames_drawn(&self, handle: DecoderHandle) -> u32 {
        // SAFETY: see impl note.
        unsafe { (self.fn_frames_drawn)(handle.raw()) }
    }

    fn current_frame(&self, handle: DecoderHandle) -> u32 {
        // SAFETY: see impl note.
        unsafe { (self.fn_current_frame)(handle.raw()) }
    }

    fn seek_frame(&self, handle: DecoderHandle, frame: u32) {
        // SAFETY: see impl note.
        unsafe { (self.fn_seek_frame)(handle.raw(), frame) }
    }

    fn position_seconds(&self, handle: DecoderHandle) -> f32 {
        // SAFETY: see impl note.
        unsafe { (self.fn_position)(handle.raw()) }
    }

    fn seek_seconds(&self, handle: DecoderHandle, seconds: f32) {
        // SAFETY: see impl note.
        unsafe { (self.fn_seek_seconds)(handle.raw(), seconds) }
    }

    fn set_volume(&self, handle: DecoderHandle, volume: f32) {
        // SAFETY: see impl note.
        unsafe { (self.fn_set_volume)(handle.raw(), volume) }
    }

    fn playback_rate(&self, handle: DecoderHandle) -> f32 {
        // SAFETY: see impl note.
        unsafe { (self.fn_playback_rate)(handle.raw()) }
    }

    fn set_playback_rate(&self, handle: DecoderHandle, rate: f32) {
        // SAFETY: see impl note.
        unsafe { (self.fn_set_playback_rate)(handle.raw(), rate) }
    }

    fn play(&self, handle: DecoderHandle) {
        // SAFETY: see impl note.
        unsafe { (self.fn_play)(handle.raw()) }
    }

    fn stop(&self, handle: DecoderHandle) {
        // SAFETY: see impl note.
        unsafe { (self.fn_stop)(handle.raw()) }
    }

    fn update(&self, handle: DecoderHandle) {
        // SAFETY: see impl note.
        unsafe { (self.fn_update)(handle.raw()) }
    }

    fn set_active(&self, handle: DecoderHandle, active: bool) {
        // SAFETY: see impl note.
        unsafe { (self.fn_set_active)(handle.raw(), active) }
    }

    fn update_all_textures(&self) {
        if let Some(f) = self.fn_update_all_textures {
            // SAFETY: see impl note.
            unsafe { f() }
        }
    }
}

/// Try to load the plugin library from a specific directory.
fn try_load_from_dir(dir: &Path, diagnostics: &mut Vec<String>) -> Option<libloading::Library> {
    for name in platform_lib_names() {
        let full = dir.join(name);
        // SAFETY: loading runs the library's initialisers; the plugin has none with preconditions.
        match unsafe { libloading::Library::new(&full) } {
            Ok(lib) => {
                log::info!("Movie plugin loaded from {}", full.display());
                return Some(lib);
            }
            Err(e) => {
                log::debug!("Movie plugin: {} failed: {e}", full.display());
                diagnostics.push(format!("{}", full.display()));
            }
        }
    }
    None
}

/// Directories next to the running binary, where deployed builds ship the plugin.
fn exe_dirs() -> Vec<PathBuf> {
    let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
    else {
        return Vec::new();
    };
    vec![dir.join("Plugins"), dir]
}

/// Try to find and load the plugin shared library.
/// Appends searched paths to `diagnostics`.
fn load_plugin_library(diagnostics: &mut Vec<String>) -> Result<libloading::Library, PluginError> {
    // 1. Explicit override.
    if let Ok(folder) = std::env::var(PLUGIN_DIR_ENV) {
        diagnostics.push(format!("{PLUGIN_DIR_ENV}={folder}"));
        if let Some(lib) = try_load_from_dir(Path::new(&folder), diagnostics) {
            return Ok(lib);
        }
    }

    // 2. Alongside the executable.
    for dir in exe_dirs() {
        if let Some(lib) = try_load_from_dir(&dir, diagnostics) {
            return Ok(lib);
        }
    }

    // 3. Bare library names via system linker.
    diagnostics.push("system linker search".to_string());
    for name in platform_lib_names() {
        // SAFETY: as in try_load_from_dir.
        match unsafe { libloading::Library::new(name) } {
            Ok(lib) => return Ok(lib),
            Err(e) => {
                log::debug!("Movie plugin: system linker {name} failed: {e}");
            }
        }
    }

    Err(PluginError::NotFound {
        searched: std::mem::take(diagnostics),
    })
}

fn platform_lib_names() -> &'static [&'static str] {
    #[cfg(target_os = "linux")]
    {
        &["libAVProQuickTime.so"]
    }
    #[cfg(target_os = "macos")]
    {
        &[
            "AVProQuickTime.bundle/Contents/MacOS/AVProQuickTime",
            "libAVProQuickTime.dylib",
        ]
    }
    #[cfg(target_os = "windows")]
    {
        &["AVProQuickTime.dll", "AVProQuickTime-x64.dll"]
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        &[]
    }
}
