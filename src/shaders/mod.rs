//! Shader sources and hot-reload
//!
//! WGSL sources live next to this file. They are embedded at compile time
//! as a fallback, loaded from disk at runtime when available, and watched
//! for changes so pipelines can be rebuilt without restarting.

use std::path::{Path, PathBuf};

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::sync::mpsc::{channel, Receiver, TryRecvError};
use std::time::{Duration, Instant};

/// Embedded cubemap capture shader (displacement + face rotation)
pub const CUBE_CAPTURE_SHADER: &str = include_str!("cube_capture.wgsl");

/// Embedded cubemap sampling shader (warp map / equirect compositing)
pub const CUBE_SAMPLE_SHADER: &str = include_str!("cube_sample.wgsl");

/// Shaders known to the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderKind {
    CubeCapture,
    CubeSample,
}

impl ShaderKind {
    pub fn file_name(self) -> &'static str {
        match self {
            ShaderKind::CubeCapture => "cube_capture.wgsl",
            ShaderKind::CubeSample => "cube_sample.wgsl",
        }
    }

    pub fn embedded(self) -> &'static str {
        match self {
            ShaderKind::CubeCapture => CUBE_CAPTURE_SHADER,
            ShaderKind::CubeSample => CUBE_SAMPLE_SHADER,
        }
    }

    pub fn path(self) -> PathBuf {
        shaders_dir().join(self.file_name())
    }

    /// Shader that a changed file belongs to
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.file_name()?.to_str()? {
            "cube_capture.wgsl" => Some(ShaderKind::CubeCapture),
            "cube_sample.wgsl" => Some(ShaderKind::CubeSample),
            _ => None,
        }
    }
}

/// Get the path to the shaders directory
pub fn shaders_dir() -> PathBuf {
    // In development, this is relative to the cargo manifest directory
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(manifest_dir).join("src").join("shaders")
}

/// Load a shader from disk, falling back to the embedded copy
pub fn load_shader(kind: ShaderKind) -> String {
    match std::fs::read_to_string(kind.path()) {
        Ok(source) => source,
        Err(e) => {
            tracing::debug!("Using embedded {} ({})", kind.file_name(), e);
            kind.embedded().to_string()
        }
    }
}

/// Watches shader files for changes and signals when reloading is needed
pub struct ShaderWatcher {
    /// The file watcher (kept alive to maintain watch)
    _watcher: RecommendedWatcher,
    /// Receiver for file change events
    receiver: Receiver<Result<Event, notify::Error>>,
    /// Last time we detected a change (for debouncing)
    last_change: Option<Instant>,
    /// Ignore rapid successive changes (editors often write twice)
    debounce_duration: Duration,
    /// Path that changed (for reporting)
    pending_path: Option<PathBuf>,
}

impl ShaderWatcher {
    /// Watch the shaders directory for changes to `.wgsl` files
    pub fn new() -> Result<Self, notify::Error> {
        Self::watch(&shaders_dir())
    }

    /// Watch an arbitrary directory for changes to `.wgsl` files
    pub fn watch(dir: &Path) -> Result<Self, notify::Error> {
        let (tx, rx) = channel();

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;

        tracing::info!("Shader hot-reload enabled, watching: {}", dir.display());
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        Ok(Self {
            _watcher: watcher,
            receiver: rx,
            last_change: None,
            debounce_duration: Duration::from_millis(100),
            pending_path: None,
        })
    }

    /// Poll for shader changes
    ///
    /// Returns `Some(path)` once a `.wgsl` file changed and the debounce
    /// interval has passed since the last change.
    pub fn poll(&mut self) -> Option<PathBuf> {
        loop {
            match self.receiver.try_recv() {
                Ok(Ok(event)) => {
                    for path in event.paths {
                        if path.extension().is_some_and(|ext| ext == "wgsl") {
                            self.last_change = Some(Instant::now());
                            self.pending_path = Some(path);
                        }
                    }
                }
                Ok(Err(e)) => {
                    tracing::warn!("Shader watcher error: {:?}", e);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::error!("Shader watcher channel disconnected");
                    break;
                }
            }
        }

        if let (Some(last), Some(path)) = (self.last_change, self.pending_path.take()) {
            if last.elapsed() >= self.debounce_duration {
                self.last_change = None;
                tracing::info!("Shader changed: {}", path.display());
                return Some(path);
            }
            // Not settled yet
            self.pending_path = Some(path);
        }

        None
    }

    /// Poll and map the change to a known shader
    pub fn poll_kind(&mut self) -> Option<ShaderKind> {
        self.poll().and_then(|path| ShaderKind::from_path(&path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shaders_dir_exists() {
        let path = shaders_dir();
        assert!(path.exists(), "Shaders directory should exist at {:?}", path);
    }

    #[test]
    fn test_shader_files_exist() {
        for kind in [ShaderKind::CubeCapture, ShaderKind::CubeSample] {
            assert!(kind.path().exists(), "{:?} should exist", kind.path());
        }
    }

    #[test]
    fn test_embedded_shaders_have_entry_points() {
        for source in [CUBE_CAPTURE_SHADER, CUBE_SAMPLE_SHADER] {
            assert!(source.contains("fn vs_main"));
            assert!(source.contains("fn fs_main"));
        }
        assert!(CUBE_CAPTURE_SHADER.contains("displacement_model"));
        assert!(CUBE_SAMPLE_SHADER.contains("texture_cube"));
    }

    #[test]
    fn test_load_shader_from_disk() {
        let source = load_shader(ShaderKind::CubeSample);
        assert_eq!(source, CUBE_SAMPLE_SHADER);
    }

    #[test]
    fn test_kind_from_path() {
        assert_eq!(
            ShaderKind::from_path(Path::new("/tmp/cube_capture.wgsl")),
            Some(ShaderKind::CubeCapture)
        );
        assert_eq!(ShaderKind::from_path(Path::new("/tmp/other.wgsl")), None);
    }
}
