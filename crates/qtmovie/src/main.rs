use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};

use qtmovie::config::MovieConfig;
use qtmovie::movie::MoviePlayer;
use qtmovie::plugin::ffi::NativePlugin;
use qtmovie::plugin::{GraphicsApi, SourceKind};
use qtmovie::{DecoderRuntimeContext, RuntimeOptions};

const TICK: Duration = Duration::from_millis(16);

/// Command-line overrides on top of the saved movie config.
#[derive(Debug, Default)]
struct CliArgs {
    source: Option<(SourceKind, String)>,
    looping: bool,
    ticks: Option<u64>,
    dev: bool,
    /// Persist the resulting config for later runs.
    save: bool,
}

impl CliArgs {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut out = Self::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .with_context(|| format!("{flag} expects a value"))
            };
            match arg.as_str() {
                "--file" => out.source = Some((SourceKind::LocalFile, value("--file")?)),
                "--url" => out.source = Some((SourceKind::Url, value("--url")?)),
                "--memory" => out.source = Some((SourceKind::Memory, value("--memory")?)),
                "--ticks" => {
                    let n = value("--ticks")?;
                    out.ticks = Some(n.parse().with_context(|| format!("invalid tick count {n:?}"))?);
                }
                "--loop" => out.looping = true,
                "--dev" => out.dev = true,
                "--save" => out.save = true,
                other => bail!("unknown argument {other:?}"),
            }
        }
        Ok(out)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = CliArgs::parse(std::env::args().skip(1))?;

    let mut config = MovieConfig::load();
    let mut memory_path = None;
    if let Some((kind, location)) = args.source {
        config.source = kind;
        config.folder.clear();
        if kind == SourceKind::Memory {
            let path = PathBuf::from(&location);
            config.filename = path
                .file_name()
                .map_or_else(|| location.clone(), |n| n.to_string_lossy().into_owned());
            memory_path = Some(path);
        } else {
            config.filename = location;
        }
    }
    config.looping |= args.looping;
    if args.save {
        config.save();
    }

    let options = if args.dev {
        RuntimeOptions::editor()
    } else {
        RuntimeOptions::deployed()
    };
    let plugin = NativePlugin::load(GraphicsApi::Unknown).context("loading movie plugin")?;
    let runtime = DecoderRuntimeContext::init(Rc::new(plugin), options)?;

    let mut player = MoviePlayer::new(Rc::clone(&runtime), config);
    if let Some(path) = memory_path {
        let data = std::fs::read(&path)
            .with_context(|| format!("reading movie {}", path.display()))?;
        player.set_movie_data(data);
    }
    player.start()?;

    let mut last_report = Instant::now();
    let mut tick = 0u64;
    while args.ticks.is_none_or(|max| tick < max) {
        let now = Instant::now();
        runtime.tick();
        player.update(now)?;

        let Some(session) = player.session().filter(|_| !player.is_finished()) else {
            log::warn!("Movie unloaded, stopping");
            break;
        };
        if now.duration_since(last_report) >= Duration::from_secs(1) {
            log::info!(
                "{:?} frame {} / {} at {:.2}s ({:.1} fps)",
                session.state(),
                session.frame(),
                session.frame_count(),
                session.position_seconds(),
                player.fps()
            );
            last_report = now;
        }

        tick += 1;
        std::thread::sleep(TICK);
    }

    player.unload_movie();
    runtime.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliArgs> {
        CliArgs::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parses_sources_and_flags() {
        let a = parse(&["--url", "http://example.com/a.mov", "--loop", "--ticks", "10"]).unwrap();
        assert_eq!(a.source, Some((SourceKind::Url, "http://example.com/a.mov".into())));
        assert!(a.looping);
        assert_eq!(a.ticks, Some(10));
        assert!(!a.dev);

        let a = parse(&["--memory", "clip.mov", "--dev"]).unwrap();
        assert_eq!(a.source, Some((SourceKind::Memory, "clip.mov".into())));
        assert!(a.dev);
        assert!(!a.save);

        let a = parse(&["--file", "clip.mov", "--save"]).unwrap();
        assert!(a.save);
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse(&["--file"]).is_err());
        assert!(parse(&["--ticks", "many"]).is_err());
        assert!(parse(&["--verbose"]).is_err());
    }
}
