//! Process-wide decoder runtime shared by every playback session.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::convert::{ConverterFactory, FormatConverter, ShaderConverterFactory};
use crate::detect::{DrawnFrameCounter, EveryTick, FrameReadyDetector};
use crate::error::{PluginError, SessionError};
use crate::plugin::{BackendCapabilities, DecoderBackend, DecoderHandle, GraphicsApi};

/// How decoded frames reach host textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionMethod {
    /// Plugin writes host textures from a render-thread event.
    NativeTextureUpdate,
    /// OpenGL plugin event, same push model.
    GlPluginEvent,
    /// Legacy OpenGL path; frames are pulled by polling.
    GlLegacy,
    /// Frames are pulled and converted by host-side code.
    Scripted,
}

impl ConversionMethod {
    /// Pick the method for a backend. Returns the method and whether the
    /// conversion shaders must swap red and blue.
    pub fn select(caps: BackendCapabilities, legacy_gl: bool) -> (Self, bool) {
        match (caps.native_texture_update, caps.graphics_api) {
            (true, api) => (
                ConversionMethod::NativeTextureUpdate,
                api == GraphicsApi::Direct3D11,
            ),
            (false, GraphicsApi::OpenGl) if legacy_gl => (ConversionMethod::GlLegacy, false),
            (false, GraphicsApi::OpenGl) => (ConversionMethod::GlPluginEvent, false),
            (false, _) => (ConversionMethod::Scripted, true),
        }
    }

    pub fn is_push_based(self) -> bool {
        matches!(
            self,
            ConversionMethod::NativeTextureUpdate | ConversionMethod::GlPluginEvent
        )
    }
}

/// Host-side knobs for the runtime.
#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    /// Root that relative local-file paths resolve against. `None` keeps
    /// them relative to the working directory (interactive/dev runs).
    pub asset_root: Option<PathBuf>,
    /// Host renders through the legacy OpenGL pipeline.
    pub legacy_gl: bool,
}

impl RuntimeOptions {
    /// Deployed build: resolve relative paths next to the executable.
    pub fn deployed() -> Self {
        let asset_root = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf));
        Self {
            asset_root,
            legacy_gl: false,
        }
    }

    pub fn editor() -> Self {
        Self::default()
    }
}

/// Companion runtime every session needs: owns plugin init/deinit and
/// the choices that depend on what the backend can do.
pub struct DecoderRuntimeContext {
    backend: Rc<dyn DecoderBackend>,
    options: RuntimeOptions,
    converters: Box<dyn ConverterFactory>,
    conversion: ConversionMethod,
    swap_red_blue: bool,
    version: f32,
    initialised: Cell<bool>,
    /// Instances handed out to sessions and not yet released.
    instances: RefCell<HashSet<DecoderHandle>>,
}

impl DecoderRuntimeContext {
    pub fn init(
        backend: Rc<dyn DecoderBackend>,
        options: RuntimeOptions,
    ) -> Result<Rc<Self>, PluginError> {
        Self::init_with(backend, options, Box::new(ShaderConverterFactory))
    }

    pub fn init_with(
        backend: Rc<dyn DecoderBackend>,
        options: RuntimeOptions,
        converters: Box<dyn ConverterFactory>,
    ) -> Result<Rc<Self>, PluginError> {
        if !backend.init(options.legacy_gl) {
            log::error!("Movie plugin failed to initialise");
            backend.deinit();
            return Err(PluginError::InitFailed);
        }
        let version = backend.version();
        log::info!("Movie plugin version {version:.2} initialised");

        let caps = backend.capabilities();
        let (conversion, swap_red_blue) = ConversionMethod::select(caps, options.legacy_gl);
        log::info!(
            "Texture conversion: {conversion:?} ({:?}, swap red/blue: {swap_red_blue})",
            caps.graphics_api
        );

        Ok(Rc::new(Self {
            backend,
            options,
            converters,
            conversion,
            swap_red_blue,
            version,
            initialised: Cell::new(true),
            instances: RefCell::new(HashSet::new()),
        }))
    }

    /// Release every outstanding instance, then deinitialise the plugin.
    /// Sessions still holding this context fail fast afterwards.
    pub fn shutdown(&self) {
        if self.initialised.replace(false) {
            let mut outstanding: Vec<DecoderHandle> = self.instances.borrow_mut().drain().collect();
            outstanding.sort_by_key(|h| h.raw());
            for handle in outstanding {
                log::debug!("Releasing decoder instance {} on shutdown", handle.raw());
                self.backend.release_instance(handle);
            }
            self.backend.deinit();
            log::info!("Movie plugin deinitialised");
        }
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised.get()
    }

    pub fn ensure_available(&self) -> Result<(), SessionError> {
        if self.is_initialised() {
            Ok(())
        } else {
            Err(SessionError::RuntimeUnavailable)
        }
    }

    pub fn backend(&self) -> &dyn DecoderBackend {
        self.backend.as_ref()
    }

    /// Take a decoder instance and track it until `release_instance`.
    pub fn acquire_instance(&self) -> Option<DecoderHandle> {
        let handle = self.backend.acquire_instance()?;
        self.instances.borrow_mut().insert(handle);
        Some(handle)
    }

    /// Give an instance back. A handle already reclaimed by `shutdown` is
    /// only forgotten.
    pub fn release_instance(&self, handle: DecoderHandle) {
        if self.instances.borrow_mut().remove(&handle) {
            self.backend.release_instance(handle);
        } else {
            log::debug!("Decoder instance {} already released", handle.raw());
        }
    }

    pub fn live_instances(&self) -> usize {
        self.instances.borrow().len()
    }

    pub fn conversion_method(&self) -> ConversionMethod {
        self.conversion
    }

    pub fn swap_red_blue(&self) -> bool {
        self.swap_red_blue
    }

    pub fn version(&self) -> f32 {
        self.version
    }

    pub fn frame_ready_detector(&self) -> Box<dyn FrameReadyDetector> {
        if self.conversion.is_push_based() {
            Box::new(EveryTick)
        } else {
            Box::new(DrawnFrameCounter::default())
        }
    }

    pub fn create_converter(&self) -> Box<dyn FormatConverter> {
        self.converters.create()
    }

    pub fn resolve_path(&self, path: &str) -> String {
        match &self.options.asset_root {
            Some(root) if Path::new(path).is_relative() => {
                root.join(path).to_string_lossy().into_owned()
            }
            _ => path.to_string(),
        }
    }

    /// Once per host frame, before sessions poll.
    pub fn tick(&self) {
        if self.is_initialised() && self.conversion.is_push_based() {
            self.backend.update_all_textures();
        }
    }
}

impl Drop for DecoderRuntimeContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}
