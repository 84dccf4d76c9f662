//! Scripted in-memory decoder used by the unit tests.

use std::cell::{Ref, RefCell};
use std::collections::HashSet;

use super::{
    BackendCapabilities, DecoderBackend, DecoderHandle, GraphicsApi, LoadFlags, PixelFormat,
};

pub struct MockState {
    pub init_ok: bool,
    pub initialised: bool,
    pub capabilities: BackendCapabilities,
    /// Maximum simultaneous instances; `None` is unlimited.
    pub max_instances: Option<usize>,
    next_handle: i32,
    pub live: HashSet<i32>,
    pub acquired_total: usize,
    pub reject_load: bool,
    pub loadable: bool,
    pub properties_ready: bool,
    pub load_properties_ok: bool,
    pub last_load: Option<(String, LoadFlags)>,
    pub memory_len: Option<usize>,
    pub width: i32,
    pub height: i32,
    pub frame_count: u32,
    pub duration: f32,
    pub frame_rate: f32,
    pub pixel_format: PixelFormat,
    pub loaded_fraction: f32,
    pub frames_drawn: u32,
    pub current_frame: u32,
    pub position: f32,
    pub volume: f32,
    pub rate: f32,
    pub playing: bool,
    pub active: Option<bool>,
    pub updates: u32,
    pub texture_events: u32,
    pub calls: Vec<&'static str>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            init_ok: true,
            initialised: false,
            capabilities: BackendCapabilities::default(),
            max_instances: None,
            next_handle: 0,
            live: HashSet::new(),
            acquired_total: 0,
            reject_load: false,
            loadable: true,
            properties_ready: false,
            load_properties_ok: true,
            last_load: None,
            memory_len: None,
            width: 0,
            height: 0,
            frame_count: 0,
            duration: 0.0,
            frame_rate: 0.0,
            pixel_format: PixelFormat::Unknown,
            loaded_fraction: 0.0,
            frames_drawn: 0,
            current_frame: 0,
            position: 0.0,
            volume: 1.0,
            rate: 1.0,
            playing: false,
            active: None,
            updates: 0,
            texture_events: 0,
            calls: Vec::new(),
        }
    }
}

#[derive(Default)]
pub struct MockBackend {
    state: RefCell<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend whose movies report the given stream description once loaded.
    pub fn with_movie(width: i32, height: i32, format: PixelFormat, fps: f32, secs: f32) -> Self {
        let mock = Self::new();
        mock.configure(|s| {
            s.width = width;
            s.height = height;
            s.pixel_format = format;
            s.frame_rate = fps;
            s.duration = secs;
            s.frame_count = (fps * secs) as u32;
            s.loaded_fraction = 1.0;
        });
        mock
    }

    pub fn with_capabilities(self, native_texture_update: bool, graphics_api: GraphicsApi) -> Self {
        self.configure(|s| {
            s.capabilities = BackendCapabilities {
                native_texture_update,
                graphics_api,
            };
        });
        self
    }

    pub fn configure(&self, f: impl FnOnce(&mut MockState)) {
        f(&mut self.state.borrow_mut());
    }

    pub fn state(&self) -> Ref<'_, MockState> {
        self.state.borrow()
    }

    fn record(&self, call: &'static str) -> std::cell::RefMut<'_, MockState> {
        let mut s = self.state.borrow_mut();
        s.calls.push(call);
        s
    }

    fn begin_load(&self, call: &'static str, handle: DecoderHandle, what: &str, flags: LoadFlags) -> bool {
        let mut s = self.record(call);
        assert!(s.live.contains(&handle.raw()), "load on released handle");
        s.last_load = Some((what.to_string(), flags));
        !s.reject_load
    }
}

impl DecoderBackend for MockBackend {
    fn init(&self, _legacy_gl: bool) -> bool {
        let mut s = self.record("init");
        s.initialised = s.init_ok;
        s.init_ok
    }

    fn deinit(&self) {
        let mut s = self.record("deinit");
        s.initialised = false;
        s.live.clear();
    }

    fn version(&self) -> f32 {
        1.5
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.state.borrow().capabilities
    }

    fn acquire_instance(&self) -> Option<DecoderHandle> {
        let mut s = self.record("acquire");
        if s.max_instances.is_some_and(|max| s.live.len() >= max) {
            return None;
        }
        let raw = s.next_handle;
        s.next_handle += 1;
        s.live.insert(raw);
        s.acquired_total += 1;
        DecoderHandle::from_raw(raw)
    }

    fn release_instance(&self, handle: DecoderHandle) {
        let mut s = self.record("release");
        s.live.remove(&handle.raw());
        s.memory_len = None;
        s.playing = false;
    }

    fn load_from_file(&self, handle: DecoderHandle, path: &str, flags: LoadFlags) -> bool {
        self.begin_load("load_file", handle, path, flags)
    }

    fn load_from_url(&self, handle: DecoderHandle, url: &str, flags: LoadFlags) -> bool {
        self.begin_load("load_url", handle, url, flags)
    }

    unsafe fn load_from_memory(
        &self,
        handle: DecoderHandle,
        _data: *const u8,
        len: usize,
        flags: LoadFlags,
    ) -> bool {
        let ok = self.begin_load("load_memory", handle, "<memory>", flags);
        self.state.borrow_mut().memory_len = Some(len);
        ok
    }

    fn is_loadable(&self, _handle: DecoderHandle) -> bool {
        self.state.borrow().loadable
    }

    fn are_properties_loaded(&self, _handle: DecoderHandle) -> bool {
        self.state.borrow().properties_ready
    }

    fn load_properties(&self, _handle: DecoderHandle) -> bool {
        self.record("load_properties").load_properties_ok
    }

    fn width(&self, _handle: DecoderHandle) -> i32 {
        self.state.borrow().width
    }

    fn height(&self, _handle: DecoderHandle) -> i32 {
        self.state.borrow().height
    }

    fn frame_count(&self, _handle: DecoderHandle) -> u32 {
        self.state.borrow().frame_count
    }

    fn duration_seconds(&self, _handle: DecoderHandle) -> f32 {
        self.state.borrow().duration
    }

    fn frame_rate(&self, _handle: DecoderHandle) -> f32 {
        self.state.borrow().frame_rate
    }

    fn pixel_format(&self, _handle: DecoderHandle) -> PixelFormat {
        self.state.borrow().pixel_format
    }

    fn loaded_fraction(&self, _handle: DecoderHandle) -> f32 {
        self.state.borrow().loaded_fraction
    }

    fn frames_drawn(&self, _handle: DecoderHandle) -> u32 {
        self.state.borrow().frames_drawn
    }

    fn current_frame(&self, _handle: DecoderHandle) -> u32 {
        self.state.borrow().current_frame
    }

    fn seek_frame(&self, _handle: DecoderHandle, frame: u32) {
        self.record("seek_frame").current_frame = frame;
    }

    fn position_seconds(&self, _handle: DecoderHandle) -> f32 {
        self.state.borrow().position
    }

    fn seek_seconds(&self, _handle: DecoderHandle, seconds: f32) {
        self.record("seek_seconds").position = seconds;
    }

    fn set_volume(&self, _handle: DecoderHandle, volume: f32) {
        self.record("set_volume").volume = volume;
    }

    fn playback_rate(&self, _handle: DecoderHandle) -> f32 {
        self.state.borrow().rate
    }

    fn set_playback_rate(&self, _handle: DecoderHandle, rate: f32) {
        self.record("set_playback_rate").rate = rate;
    }

    fn play(&self, _handle: DecoderHandle) {
        self.record("play").playing = true;
    }

    fn stop(&self, _handle: DecoderHandle) {
        self.record("stop").playing = false;
    }

    fn update(&self, _handle: DecoderHandle) {
        self.state.borrow_mut().updates += 1;
    }

    fn set_active(&self, _handle: DecoderHandle, active: bool) {
        self.record("set_active").active = Some(active);
    }

    fn update_all_textures(&self) {
        self.state.borrow_mut().texture_events += 1;
    }
}
