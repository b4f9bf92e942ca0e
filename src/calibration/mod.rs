//! Projector calibration configuration
//!
//! Parses the line-based calibration file describing each projector of a
//! render machine and loads the per-projector warp data it points to.
//!
//! The format is one `fieldname value` pair per line. A line with field name
//! `id` starts a new projector; the lines that follow fill in that projector
//! until the next `id`:
//!
//! ```text
//! id 1
//! width 1920
//! height 1200
//! filepath /opt/calibration/map1.bin
//! l 0
//! b 0
//! w 0.5
//! h 1
//! active 1
//! ```
//!
//! Problems are soft: they are logged and collected as [`ParseWarning`]s while
//! parsing continues.

mod warp_map;

pub use warp_map::{read_warp_data, warp_float_count, WarpLoadOutcome, WarpMap, WarpMapError, MAX_WARP_DIMENSION};

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Errors returned when a calibration file cannot be read at all
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("couldn't open calibration file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Non-fatal problem found while parsing a calibration file
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseWarning {
    /// A field appeared before any `id` line
    #[error("line {line}: field '{field}' appears before any 'id' line")]
    FieldBeforeId { line: usize, field: String },
    /// A known field had a value that could not be parsed
    #[error("line {line}: invalid value '{value}' for field '{field}'")]
    InvalidValue { line: usize, field: String, value: String },
}

/// Calibration record for one projector
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectorRecord {
    /// Projector ID
    pub id: i32,
    /// Path to the raw float warp data
    pub filepath: String,
    /// Projector width in pixels
    pub width: u32,
    /// Projector height in pixels
    pub height: u32,
    /// Viewport bottom edge (fraction of framebuffer height, from the bottom)
    pub b: f32,
    /// Viewport height (fraction)
    pub h: f32,
    /// Viewport left edge (fraction of framebuffer width)
    pub l: f32,
    /// Viewport width (fraction)
    pub w: f32,
    /// Active stereo supported
    pub active: bool,
    /// Warp data, `width * height * 4` floats once loaded (RGBA per pixel)
    pub data: Vec<f32>,
}

impl ProjectorRecord {
    /// Number of floats the warp data should hold, `None` on overflow
    pub fn expected_floats(&self) -> Option<usize> {
        warp_float_count(self.width, self.height)
    }

    /// Dimensions within [`MAX_WARP_DIMENSION`]
    pub fn dimensions_supported(&self) -> bool {
        self.width <= MAX_WARP_DIMENSION && self.height <= MAX_WARP_DIMENSION
    }

    pub fn has_data(&self) -> bool {
        !self.data.is_empty()
    }
}

/// Projectors driven by one render machine, in file order
#[derive(Debug, Clone, Default)]
pub struct CalibrationConfig {
    projectors: Vec<ProjectorRecord>,
    warnings: Vec<ParseWarning>,
    source: Option<PathBuf>,
}

impl CalibrationConfig {
    /// Read and parse a calibration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::info!("Reading calibration file: {}", path.display());
        let mut config = Self::parse(&contents);
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Load a calibration file, falling back to an empty configuration
    ///
    /// The open failure is logged; the renderer then runs with generated
    /// warp maps.
    pub fn load_or_empty(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}", e);
                Self::default()
            }
        }
    }

    /// Parse calibration text
    pub fn parse(contents: &str) -> Self {
        let mut projectors: Vec<ProjectorRecord> = Vec::new();
        let mut warnings = Vec::new();

        for (index, raw_line) in contents.lines().enumerate() {
            let line_number = index + 1;
            let line = raw_line.trim_end_matches('\r');
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue;
            }

            let (field, value) = match line.split_once(' ') {
                Some((field, value)) => (field, value.trim()),
                None => (line.trim(), ""),
            };

            if field == "id" {
                let mut record = ProjectorRecord::default();
                match value.parse() {
                    Ok(id) => record.id = id,
                    Err(_) => warnings.push(invalid_value(line_number, field, value)),
                }
                projectors.push(record);
                continue;
            }

            let Some(current) = projectors.last_mut() else {
                warnings.push(ParseWarning::FieldBeforeId {
                    line: line_number,
                    field: field.to_string(),
                });
                continue;
            };

            let parsed = match field {
                "width" => parse_into(value, &mut current.width),
                "height" => parse_into(value, &mut current.height),
                "filepath" => {
                    current.filepath = value.to_string();
                    !value.is_empty()
                }
                "b" => parse_into(value, &mut current.b),
                "h" => parse_into(value, &mut current.h),
                "l" => parse_into(value, &mut current.l),
                "w" => parse_into(value, &mut current.w),
                "active" => match parse_flag(value) {
                    Some(flag) => {
                        current.active = flag;
                        true
                    }
                    None => false,
                },
                _ => true,
            };

            if !parsed {
                warnings.push(invalid_value(line_number, field, value));
            }
        }

        for warning in &warnings {
            tracing::warn!("Calibration file has invalid format: {}", warning);
        }

        Self {
            projectors,
            warnings,
            source: None,
        }
    }

    /// Load the warp data of every projector
    ///
    /// Projectors without dimensions or whose file cannot be opened keep
    /// empty data. Returns one outcome per projector, in config order.
    pub fn load_data(&mut self) -> Vec<WarpLoadOutcome> {
        self.projectors
            .iter_mut()
            .map(|projector| {
                if projector.width == 0 || projector.height == 0 {
                    tracing::warn!("id {} has no width/height data", projector.id);
                    return WarpLoadOutcome::NoDimensions;
                }
                let expected = match projector.expected_floats() {
                    Some(expected) if projector.dimensions_supported() => expected,
                    _ => {
                        tracing::warn!(
                            "id {} is {}x{}, larger than the {}px warp map limit; skipped",
                            projector.id,
                            projector.width,
                            projector.height,
                            MAX_WARP_DIMENSION
                        );
                        return WarpLoadOutcome::TooLarge {
                            width: projector.width,
                            height: projector.height,
                        };
                    }
                };

                match read_warp_data(Path::new(&projector.filepath), expected) {
                    Ok((data, outcome)) => {
                        match &outcome {
                            WarpLoadOutcome::Truncated { read, expected } => tracing::warn!(
                                "Warp data for id {} is short: {} of {} floats, remainder zero-filled",
                                projector.id,
                                read,
                                expected
                            ),
                            WarpLoadOutcome::Oversized { expected, available } => tracing::warn!(
                                "Warp data for id {} has {} floats, using the first {}",
                                projector.id,
                                available,
                                expected
                            ),
                            _ => tracing::debug!("Loaded warp data for id {}", projector.id),
                        }
                        projector.data = data;
                        outcome
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load warp data for id {}: {}", projector.id, e);
                        WarpLoadOutcome::Failed(e)
                    }
                }
            })
            .collect()
    }

    pub fn projectors(&self) -> &[ProjectorRecord] {
        &self.projectors
    }

    pub fn projector(&self, index: usize) -> Option<&ProjectorRecord> {
        self.projectors.get(index)
    }

    pub fn len(&self) -> usize {
        self.projectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projectors.is_empty()
    }

    /// Warnings collected while parsing
    pub fn warnings(&self) -> &[ParseWarning] {
        &self.warnings
    }

    /// File this configuration was read from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Human-readable listing of all loaded projector settings
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Projector Configuration Info");
        let _ = writeln!(out, " Num Projectors: {}", self.projectors.len());
        for p in &self.projectors {
            let _ = writeln!(out, "  id: {}", p.id);
            let _ = writeln!(out, "    filepath: {}", p.filepath);
            let _ = writeln!(out, "    width: {}", p.width);
            let _ = writeln!(out, "    height: {}", p.height);
            let _ = writeln!(out, "    b: {}", p.b);
            let _ = writeln!(out, "    h: {}", p.h);
            let _ = writeln!(out, "    l: {}", p.l);
            let _ = writeln!(out, "    w: {}", p.w);
            let _ = writeln!(out, "    active: {}", p.active);
        }
        out
    }
}

fn invalid_value(line: usize, field: &str, value: &str) -> ParseWarning {
    ParseWarning::InvalidValue {
        line,
        field: field.to_string(),
        value: value.to_string(),
    }
}

/// Parse the first whitespace-separated token of `value` into `target`
///
/// On failure `target` keeps its previous value.
fn parse_into<T: std::str::FromStr>(value: &str, target: &mut T) -> bool {
    match value.split_whitespace().next().map(str::parse) {
        Some(Ok(parsed)) => {
            *target = parsed;
            true
        }
        _ => false,
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.split_whitespace().next()? {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_PROJECTORS: &str = "\
id 1
width 1920
height 1200
filepath /data/proj1.bin
b 0
h 1
l 0
w 0.5
active 1
id 2
width 1280
height 800
filepath /data/proj2.bin
b 0
h 1
l 0.5
w 0.5
active 0
";

    #[test]
    fn test_parse_two_blocks_in_file_order() {
        let config = CalibrationConfig::parse(TWO_PROJECTORS);
        assert_eq!(config.len(), 2);
        assert!(config.warnings().is_empty());

        let first = &config.projectors()[0];
        assert_eq!(first.id, 1);
        assert_eq!(first.width, 1920);
        assert_eq!(first.height, 1200);
        assert_eq!(first.filepath, "/data/proj1.bin");
        assert_eq!(first.l, 0.0);
        assert_eq!(first.w, 0.5);
        assert_eq!(first.h, 1.0);
        assert!(first.active);

        let second = &config.projectors()[1];
        assert_eq!(second.id, 2);
        assert_eq!(second.width, 1280);
        assert_eq!(second.height, 800);
        assert_eq!(second.l, 0.5);
        assert!(!second.active);
        assert!(second.data.is_empty());
    }

    #[test]
    fn test_field_before_id_warns() {
        let config = CalibrationConfig::parse("width 100\nid 3\nheight 50\n");
        assert_eq!(config.len(), 1);
        assert_eq!(
            config.warnings(),
            &[ParseWarning::FieldBeforeId {
                line: 1,
                field: "width".to_string()
            }]
        );
        // The field before the id is dropped, not applied to the next record
        assert_eq!(config.projectors()[0].width, 0);
        assert_eq!(config.projectors()[0].height, 50);
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let config = CalibrationConfig::parse("id 1\nbrightness 12\nwidth 8\n");
        assert!(config.warnings().is_empty());
        assert_eq!(config.projectors()[0].width, 8);
    }

    #[test]
    fn test_invalid_value_keeps_default() {
        let config = CalibrationConfig::parse("id 1\nwidth wide\nactive maybe\n");
        assert_eq!(config.warnings().len(), 2);
        assert_eq!(config.projectors()[0].width, 0);
        assert!(!config.projectors()[0].active);
    }

    #[test]
    fn test_blank_lines_comments_and_crlf() {
        let config = CalibrationConfig::parse("# render machine gr01\r\n\r\nid 7\r\nw 0.25\r\n\r\n");
        assert!(config.warnings().is_empty());
        assert_eq!(config.projectors()[0].id, 7);
        assert_eq!(config.projectors()[0].w, 0.25);
    }

    #[test]
    fn test_filepath_keeps_spaces() {
        let config = CalibrationConfig::parse("id 1\nfilepath /Volumes/Calibration Data/map.bin\n");
        assert_eq!(config.projectors()[0].filepath, "/Volumes/Calibration Data/map.bin");
    }

    #[test]
    fn test_load_missing_file() {
        let path = std::env::temp_dir().join("omni_render_missing_calibration.txt");
        let _ = std::fs::remove_file(&path);
        assert!(matches!(CalibrationConfig::load(&path), Err(ConfigError::Open { .. })));
        assert!(CalibrationConfig::load_or_empty(&path).is_empty());
    }

    #[test]
    fn test_load_data_reads_exact_and_skips_missing() {
        let dir = std::env::temp_dir().join("omni_render_calibration_load");
        std::fs::create_dir_all(&dir).unwrap();

        let map = WarpMap::equirectangular(4, 2);
        let map_path = dir.join("proj1.bin");
        map.write(&map_path).unwrap();

        let text = format!(
            "id 1\nwidth 4\nheight 2\nfilepath {}\nid 2\nwidth 4\nheight 2\nfilepath {}\nid 3\n",
            map_path.display(),
            dir.join("does_not_exist.bin").display()
        );
        let config_path = dir.join("config.txt");
        std::fs::write(&config_path, text).unwrap();

        let mut config = CalibrationConfig::load(&config_path).unwrap();
        assert_eq!(config.source(), Some(config_path.as_path()));

        let outcomes = config.load_data();
        assert_eq!(outcomes.len(), 3);
        assert!(matches!(outcomes[0], WarpLoadOutcome::Loaded));
        assert!(matches!(outcomes[1], WarpLoadOutcome::Failed(_)));
        assert!(matches!(outcomes[2], WarpLoadOutcome::NoDimensions));

        assert_eq!(config.projectors()[0].data.len(), 4 * 2 * 4);
        assert_eq!(config.projectors()[0].data, map.data);
        assert!(!config.projectors()[1].has_data());
        assert!(!config.projectors()[2].has_data());
    }

    #[test]
    fn test_load_data_skips_huge_dimensions() {
        let dir = std::env::temp_dir().join("omni_render_calibration_huge");
        std::fs::create_dir_all(&dir).unwrap();
        let map_path = dir.join("tiny.bin");
        std::fs::write(&map_path, [0u8; 16]).unwrap();

        let text = format!(
            "id 1\nwidth 4294967295\nheight 4294967295\nfilepath {path}\n\
             id 2\nwidth 200000\nheight 200000\nfilepath {path}\n\
             id 3\nwidth 2\nheight 2\nfilepath {path}\n",
            path = map_path.display()
        );
        let mut config = CalibrationConfig::parse(&text);
        let outcomes = config.load_data();

        assert!(matches!(
            outcomes[0],
            WarpLoadOutcome::TooLarge {
                width: u32::MAX,
                height: u32::MAX
            }
        ));
        assert!(matches!(outcomes[1], WarpLoadOutcome::TooLarge { width: 200_000, .. }));
        assert!(matches!(outcomes[2], WarpLoadOutcome::Truncated { read: 4, expected: 16 }));
        assert!(!config.projectors()[0].has_data());
        assert!(!config.projectors()[1].has_data());
        assert_eq!(config.projectors()[2].data.len(), 16);
    }

    #[test]
    fn test_summary_lists_projectors() {
        let config = CalibrationConfig::parse(TWO_PROJECTORS);
        let summary = config.summary();
        assert!(summary.contains("Num Projectors: 2"));
        assert!(summary.contains("id: 1"));
        assert!(summary.contains("filepath: /data/proj2.bin"));
    }
}
