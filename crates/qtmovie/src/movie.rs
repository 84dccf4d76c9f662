//! Component-style driver around a playback session: load on start,
//! auto-play once buffered, keep volume in sync and measure frame rate.

use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::MovieConfig;
use crate::convert::OutputTexture;
use crate::error::SessionError;
use crate::plugin::SourceKind;
use crate::runtime::DecoderRuntimeContext;
use crate::session::{MoviePlaybackSession, MovieSource, SessionState};

/// Converted frames per second, recomputed once a second has elapsed.
#[derive(Debug)]
pub struct FpsCounter {
    frames: u32,
    window_start: Instant,
    fps: f32,
}

impl FpsCounter {
    pub fn new(now: Instant) -> Self {
        Self {
            frames: 0,
            window_start: now,
            fps: 0.0,
        }
    }

    pub fn frame(&mut self, now: Instant) {
        self.frames += 1;
        let elapsed = now.duration_since(self.window_start);
        if elapsed >= Duration::from_secs(1) {
            self.fps = self.frames as f32 / elapsed.as_secs_f32();
            self.frames = 0;
            self.window_start = now;
        }
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }
}

pub struct MoviePlayer {
    runtime: Rc<DecoderRuntimeContext>,
    pub config: MovieConfig,
    session: Option<MoviePlaybackSession>,
    movie_data: Option<Arc<[u8]>>,
    enabled: bool,
    /// Cleared after the first automatic play.
    autoplay_pending: bool,
    fps: FpsCounter,
}

impl MoviePlayer {
    pub fn new(runtime: Rc<DecoderRuntimeContext>, config: MovieConfig) -> Self {
        let autoplay_pending = config.play_on_start;
        Self {
            runtime,
            config,
            session: None,
            movie_data: None,
            enabled: true,
            autoplay_pending,
            fps: FpsCounter::new(Instant::now()),
        }
    }

    /// Buffer used when the configured source is `Memory`.
    pub fn set_movie_data(&mut self, data: impl Into<Arc<[u8]>>) {
        self.movie_data = Some(data.into());
    }

    pub fn start(&mut self) -> Result<(), SessionError> {
        self.runtime.ensure_available()?;
        if self.config.load_on_start {
            self.load_movie()?;
        }
        Ok(())
    }

    pub fn load_movie(&mut self) -> Result<bool, SessionError> {
        let runtime = Rc::clone(&self.runtime);
        let session = self
            .session
            .get_or_insert_with(|| MoviePlaybackSession::new(runtime));
        session.set_active(self.enabled);

        let options = self.config.open_options();
        let location = self.config.location();
        let loaded = match self.config.source {
            SourceKind::LocalFile => session.open(MovieSource::LocalFile(location), options)?,
            SourceKind::Url => session.open(MovieSource::Url(location), options)?,
            SourceKind::Memory => match &self.movie_data {
                Some(data) => session.open(
                    MovieSource::Memory {
                        name: self.config.filename.clone(),
                        data: Arc::clone(data),
                    },
                    options,
                )?,
                None => false,
            },
        };

        if loaded {
            session.set_volume(self.config.volume);
        } else {
            log::warn!("Couldn't load movie {}", self.config.filename);
            self.unload_movie();
        }
        Ok(loaded)
    }

    /// Once per host tick. Returns whether a new frame was converted.
    pub fn update(&mut self, now: Instant) -> Result<bool, SessionError> {
        self.config.volume = self.config.volume.clamp(0.0, 1.0);

        let Some(session) = self.session.as_mut() else {
            return Ok(false);
        };

        if session.volume() != self.config.volume {
            session.set_volume(self.config.volume);
        }

        if !session.is_playing()
            && self.autoplay_pending
            && session.state() >= SessionState::Loaded
            && session.loaded_seconds() > 0.0
        {
            session.play();
            self.autoplay_pending = false;
        }

        let updated = session.poll(false)?;
        if updated {
            self.fps.frame(now);
        }
        Ok(updated)
    }

    pub fn play(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.play();
        }
    }

    pub fn pause(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.pause();
        }
    }

    pub fn unload_movie(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.dispose();
        }
    }

    /// Visibility hint forwarded to the decoder.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if let Some(session) = self.session.as_mut() {
            session.set_active(enabled);
        }
    }

    pub fn session(&self) -> Option<&MoviePlaybackSession> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut MoviePlaybackSession> {
        self.session.as_mut()
    }

    pub fn output_texture(&self) -> Option<&OutputTexture> {
        self.session.as_ref().and_then(MoviePlaybackSession::output_texture)
    }

    pub fn fps(&self) -> f32 {
        self.fps.fps()
    }

    /// No movie left to drive: never loaded, unloaded, or closed after a
    /// failed asynchronous load.
    pub fn is_finished(&self) -> bool {
        self.session
            .as_ref()
            .is_none_or(|s| s.state() == SessionState::Unknown)
    }
}

impl Drop for MoviePlayer {
    fn drop(&mut self) {
        self.unload_movie();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PixelFormat;
    use crate::plugin::mock::MockBackend;
    use crate::runtime::RuntimeOptions;

    fn player(mock: &Rc<MockBackend>, config: MovieConfig) -> MoviePlayer {
        let rt = DecoderRuntimeContext::init(mock.clone(), RuntimeOptions::editor()).unwrap();
        MoviePlayer::new(rt, config)
    }

    fn clip_backend() -> Rc<MockBackend> {
        Rc::new(MockBackend::with_movie(640, 360, PixelFormat::YCbCr, 30.0, 10.0))
    }

    #[test]
    fn fps_counter_recomputes_each_second() {
        let t0 = Instant::now();
        let mut fps = FpsCounter::new(t0);
        for i in 1..=29 {
            fps.frame(t0 + Duration::from_millis(i * 33));
        }
        assert_eq!(fps.fps(), 0.0);
        fps.frame(t0 + Duration::from_millis(1000));
        assert!((fps.fps() - 30.0).abs() < 0.01);
    }

    #[test]
    fn start_loads_and_autoplays_once_buffered() {
        let mock = clip_backend();
        mock.configure(|s| s.loaded_fraction = 0.0);
        let mut p = player(&mock, MovieConfig::default());
        p.start().unwrap();
        assert_eq!(p.session().unwrap().state(), SessionState::Loading);
        assert_eq!(mock.state().last_load.as_ref().unwrap().0, "movie.mov");

        mock.configure(|s| s.properties_ready = true);
        let now = Instant::now();
        p.update(now).unwrap();
        assert_eq!(p.session().unwrap().state(), SessionState::Loaded);

        // Nothing buffered yet: no autoplay.
        p.update(now).unwrap();
        assert!(!p.session().unwrap().is_playing());

        mock.configure(|s| s.loaded_fraction = 0.1);
        p.update(now).unwrap();
        assert!(p.session().unwrap().is_playing());

        // Autoplay only fires once.
        p.pause();
        p.update(now).unwrap();
        assert!(!p.session().unwrap().is_playing());
    }

    #[test]
    fn start_without_load_on_start_does_nothing() {
        let mock = clip_backend();
        let config = MovieConfig {
            load_on_start: false,
            ..MovieConfig::default()
        };
        let mut p = player(&mock, config);
        p.start().unwrap();
        assert!(p.session().is_none());
        assert!(!p.update(Instant::now()).unwrap());
    }

    #[test]
    fn failed_load_unloads_session() {
        let mock = clip_backend();
        mock.configure(|s| s.reject_load = true);
        let mut p = player(&mock, MovieConfig::default());
        assert!(!p.load_movie().unwrap());
        assert!(p.session().is_none());
    }

    #[test]
    fn memory_source_without_data_fails() {
        let mock = clip_backend();
        let config = MovieConfig {
            source: SourceKind::Memory,
            ..MovieConfig::default()
        };
        let mut p = player(&mock, config);
        assert!(!p.load_movie().unwrap());
        assert_eq!(mock.state().acquired_total, 0);

        p.set_movie_data(vec![0u8; 128]);
        assert!(p.load_movie().unwrap());
        assert_eq!(mock.state().memory_len, Some(128));
    }

    #[test]
    fn volume_is_clamped_and_synced() {
        let mock = clip_backend();
        let mut p = player(&mock, MovieConfig::default());
        p.start().unwrap();
        p.config.volume = 3.0;
        p.update(Instant::now()).unwrap();
        assert_eq!(p.config.volume, 1.0);

        p.config.volume = 0.3;
        p.update(Instant::now()).unwrap();
        assert_eq!(mock.state().volume, 0.3);
        assert_eq!(p.session().unwrap().volume(), 0.3);

        let nudged = 0.3 + f32::EPSILON / 2.0;
        p.config.volume = nudged;
        p.update(Instant::now()).unwrap();
        assert_eq!(mock.state().volume, nudged);
    }

    #[test]
    fn async_load_failure_finishes_player() {
        let mock = clip_backend();
        let mut p = player(&mock, MovieConfig::default());
        assert!(p.is_finished());
        p.start().unwrap();
        assert!(!p.is_finished());

        mock.configure(|s| s.loadable = false);
        p.update(Instant::now()).unwrap();
        assert!(p.session().is_some());
        assert_eq!(p.session().unwrap().state(), SessionState::Unknown);
        assert!(p.is_finished());
    }

    #[test]
    fn enabled_flag_reaches_decoder() {
        let mock = clip_backend();
        let mut p = player(&mock, MovieConfig::default());
        p.set_enabled(false);
        p.start().unwrap();
        assert_eq!(mock.state().active, Some(false));
        p.set_enabled(true);
        assert_eq!(mock.state().active, Some(true));
    }

    #[test]
    fn update_reports_converted_frames() {
        let mock = clip_backend();
        let mut p = player(&mock, MovieConfig::default());
        p.start().unwrap();
        mock.configure(|s| s.properties_ready = true);
        let now = Instant::now();
        assert!(!p.update(now).unwrap());
        assert!(p.update(now).unwrap());
        assert!(p.output_texture().is_some());
        assert!(!p.update(now).unwrap());

        p.unload_movie();
        assert!(p.session().is_none());
        assert!(mock.state().live.is_empty());
    }
}
