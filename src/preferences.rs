//! Reader preferences: value object, per-field default table, persistence.
//!
//! Loading is lenient. Each field is looked up under its canonical key and
//! then under the key the browser reader used (`rotateTimes`, `pageMode`, ...).
//! Absent or `null` fields take the default from the table; present fields
//! keep their value even when it is `0` or `false`. A present value that
//! cannot be parsed falls back to the default with a warning.
//!
//! Saving always writes the canonical snake_case form.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::classify::ClassificationPolicy;
use crate::transform::{Orientation, Rotation};

/// Default number of pages kept warm on each side of the reader.
pub const DEFAULT_PRELOAD_RADIUS: usize = 2;

// ═══════════════════════════════════════════════════════════
// Enumerated settings
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitMode {
    #[default]
    Best,
    Width,
    Height,
    Natural,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// Which way "left" and "right" turn pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingDirection {
    /// Left-to-right: right advances.
    #[default]
    Forward,
    /// Right-to-left: left advances.
    Reversed,
}

impl ReadingDirection {
    pub fn toggled(self) -> Self {
        match self {
            Self::Forward => Self::Reversed,
            Self::Reversed => Self::Forward,
        }
    }
}

/// Scroll behavior of the display layer after a page turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollPolicy {
    #[default]
    ResetToTop,
    KeepPosition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutMode {
    #[default]
    Single,
    Double,
}

impl LayoutMode {
    /// Extra forward page the prefetch window covers for the pairing partner.
    pub fn forward_extra(self) -> usize {
        match self {
            Self::Single => 0,
            Self::Double => 1,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Preferences
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Preferences {
    pub rotation: Rotation,
    pub hflip: bool,
    pub vflip: bool,
    pub fit_mode: FitMode,
    pub theme: Theme,
    pub direction: ReadingDirection,
    pub scroll_policy: ScrollPolicy,
    pub show_scrollbar: bool,
    pub layout: LayoutMode,
    pub preload_radius: usize,
    pub force_rotation_aware: bool,
    pub auto_background: bool,
    pub page_shadow: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            rotation: Rotation::NONE,
            hflip: false,
            vflip: false,
            fit_mode: FitMode::Best,
            theme: Theme::Light,
            direction: ReadingDirection::Forward,
            scroll_policy: ScrollPolicy::ResetToTop,
            show_scrollbar: true,
            layout: LayoutMode::Single,
            preload_radius: DEFAULT_PRELOAD_RADIUS,
            force_rotation_aware: true,
            auto_background: true,
            page_shadow: true,
        }
    }
}

impl Preferences {
    /// Build from a stored JSON object using the per-field default table.
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let d = Self::default();
        Self {
            rotation: pick(map, &["rotation", "rotateTimes"], d.rotation, parse_rotation),
            hflip: pick(map, &["hflip"], d.hflip, parse_bool),
            vflip: pick(map, &["vflip"], d.vflip, parse_bool),
            fit_mode: pick(map, &["fit_mode", "fitMode"], d.fit_mode, parse_fit_mode),
            theme: pick(map, &["theme"], d.theme, parse_theme),
            direction: pick(map, &["direction"], d.direction, parse_direction),
            scroll_policy: pick(map, &["scroll_policy", "nextPage"], d.scroll_policy, parse_scroll),
            show_scrollbar: pick(map, &["show_scrollbar", "scrollbar"], d.show_scrollbar, parse_bool),
            layout: pick(map, &["layout", "pageMode"], d.layout, parse_layout),
            preload_radius: pick(map, &["preload_radius", "preloadPageNb"], d.preload_radius, parse_radius),
            force_rotation_aware: pick(
                map,
                &["force_rotation_aware", "forceRotationAware"],
                d.force_rotation_aware,
                parse_bool,
            ),
            auto_background: pick(map, &["auto_background", "autoBackground"], d.auto_background, parse_bool),
            page_shadow: pick(map, &["page_shadow", "pageShadow"], d.page_shadow, parse_bool),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, PreferencesError> {
        match serde_json::from_str::<Value>(json)? {
            Value::Object(map) => Ok(Self::from_map(&map)),
            _ => Err(PreferencesError::NotAnObject),
        }
    }

    pub fn to_json_string(&self) -> Result<String, PreferencesError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn orientation(&self) -> Orientation {
        Orientation::new(self.rotation, self.hflip, self.vflip)
    }

    pub fn classification_policy(&self) -> ClassificationPolicy {
        ClassificationPolicy::from_flag(self.force_rotation_aware)
    }

    /// Rotation the spread classifier should use right now.
    pub fn classification_rotation(&self) -> Rotation {
        self.classification_policy().effective_rotation(self.rotation)
    }

    /// none -> horizontal -> vertical -> both -> none
    pub fn cycle_flip(&mut self) {
        (self.hflip, self.vflip) = match (self.hflip, self.vflip) {
            (false, false) => (true, false),
            (true, false) => (false, true),
            (false, true) => (true, true),
            (true, true) => (false, false),
        };
    }
}

impl<'de> Deserialize<'de> for Preferences {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = Map::deserialize(deserializer)?;
        Ok(Self::from_map(&map))
    }
}

// ── Field table helpers ──────────────────────────────────

fn pick<T: Copy>(
    map: &Map<String, Value>,
    keys: &[&str],
    default: T,
    parse: fn(&Value) -> Option<T>,
) -> T {
    let present = keys
        .iter()
        .find_map(|k| map.get(*k).filter(|v| !v.is_null()).map(|v| (*k, v)));

    match present {
        None => default,
        Some((key, value)) => parse(value).unwrap_or_else(|| {
            warn!(key, value = %value, "Invalid preference value, using default");
            default
        }),
    }
}

fn parse_rotation(v: &Value) -> Option<Rotation> {
    v.as_i64().map(Rotation::from_quarter_turns)
}

fn parse_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64()? {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        },
        _ => None,
    }
}

fn parse_fit_mode(v: &Value) -> Option<FitMode> {
    match v {
        Value::String(s) => match s.as_str() {
            "best" => Some(FitMode::Best),
            "width" => Some(FitMode::Width),
            "height" => Some(FitMode::Height),
            "natural" => Some(FitMode::Natural),
            _ => None,
        },
        // Key codes of the B/W/H/N shortcuts.
        Value::Number(n) => match n.as_i64()? {
            66 => Some(FitMode::Best),
            87 => Some(FitMode::Width),
            72 => Some(FitMode::Height),
            78 => Some(FitMode::Natural),
            _ => None,
        },
        _ => None,
    }
}

fn parse_theme(v: &Value) -> Option<Theme> {
    match v.as_str()? {
        "light" => Some(Theme::Light),
        "dark" => Some(Theme::Dark),
        _ => None,
    }
}

fn parse_direction(v: &Value) -> Option<ReadingDirection> {
    match v {
        Value::String(s) => match s.as_str() {
            "forward" => Some(ReadingDirection::Forward),
            "reversed" => Some(ReadingDirection::Reversed),
            _ => None,
        },
        Value::Number(n) => match n.as_i64()? {
            0 => Some(ReadingDirection::Forward),
            1 => Some(ReadingDirection::Reversed),
            _ => None,
        },
        _ => None,
    }
}

fn parse_scroll(v: &Value) -> Option<ScrollPolicy> {
    match v {
        Value::String(s) => match s.as_str() {
            "reset_to_top" => Some(ScrollPolicy::ResetToTop),
            "keep_position" => Some(ScrollPolicy::KeepPosition),
            _ => None,
        },
        Value::Number(n) => match n.as_i64()? {
            0 => Some(ScrollPolicy::ResetToTop),
            1 => Some(ScrollPolicy::KeepPosition),
            _ => None,
        },
        _ => None,
    }
}

fn parse_layout(v: &Value) -> Option<LayoutMode> {
    match v {
        Value::String(s) => match s.as_str() {
            "single" => Some(LayoutMode::Single),
            "double" => Some(LayoutMode::Double),
            _ => None,
        },
        Value::Number(n) => match n.as_i64()? {
            1 => Some(LayoutMode::Single),
            2 => Some(LayoutMode::Double),
            _ => None,
        },
        _ => None,
    }
}

fn parse_radius(v: &Value) -> Option<usize> {
    match v {
        Value::Number(n) => n.as_u64().and_then(|r| usize::try_from(r).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════
// Persistence
// ═══════════════════════════════════════════════════════════

#[derive(Error, Debug)]
pub enum PreferencesError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Stored preferences are not a JSON object")]
    NotAnObject,
}

/// Load/save boundary for preferences.
pub trait PreferenceStore: Send + Sync {
    /// `Ok(None)` when nothing has been stored yet.
    fn load(&self) -> Result<Option<Preferences>, PreferencesError>;
    fn save(&self, preferences: &Preferences) -> Result<(), PreferencesError>;
}

/// Load preferences, falling back to defaults on any error.
pub fn load_or_default(store: &dyn PreferenceStore) -> Preferences {
    match store.load() {
        Ok(Some(prefs)) => prefs,
        Ok(None) => Preferences::default(),
        Err(e) => {
            warn!(error = %e, "Failed to load preferences, using defaults");
            Preferences::default()
        }
    }
}

/// JSON file on disk.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default location under the application data dir.
    pub fn default_location() -> Self {
        Self::new(crate::config::preferences_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceStore for JsonFileStore {
    fn load(&self) -> Result<Option<Preferences>, PreferencesError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Preferences::from_json_str(&text).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, preferences: &Preferences) -> Result<(), PreferencesError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Write-then-rename so a crash never leaves a truncated file.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, preferences.to_json_string()?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// In-memory store holding the serialized form.
#[derive(Default)]
pub struct MemoryStore {
    json: Mutex<Option<String>>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with previously persisted JSON (possibly in the legacy format).
    pub fn with_json(json: impl Into<String>) -> Self {
        Self {
            json: Mutex::new(Some(json.into())),
            saves: Mutex::new(0),
        }
    }

    pub fn stored_json(&self) -> Option<String> {
        self.json.lock().ok().and_then(|g| g.clone())
    }

    pub fn save_count(&self) -> usize {
        self.saves.lock().map(|g| *g).unwrap_or(0)
    }
}

impl PreferenceStore for MemoryStore {
    fn load(&self) -> Result<Option<Preferences>, PreferencesError> {
        match self.stored_json() {
            Some(json) => Preferences::from_json_str(&json).map(Some),
            None => Ok(None),
        }
    }

    fn save(&self, preferences: &Preferences) -> Result<(), PreferencesError> {
        let json = preferences.to_json_string()?;
        if let Ok(mut slot) = self.json.lock() {
            *slot = Some(json);
        }
        if let Ok(mut saves) = self.saves.lock() {
            *saves += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn from(value: Value) -> Preferences {
        Preferences::from_map(value.as_object().unwrap())
    }

    #[test]
    fn empty_object_is_all_defaults() {
        assert_eq!(from(json!({})), Preferences::default());
    }

    #[test]
    fn defaults_match_table() {
        let d = Preferences::default();
        assert_eq!(d.rotation, Rotation::NONE);
        assert_eq!(d.fit_mode, FitMode::Best);
        assert_eq!(d.layout, LayoutMode::Single);
        assert_eq!(d.preload_radius, 2);
        assert!(d.show_scrollbar);
        assert!(d.force_rotation_aware);
    }

    #[test]
    fn explicit_zero_and_false_are_kept() {
        let prefs = from(json!({
            "preload_radius": 0,
            "show_scrollbar": false,
            "force_rotation_aware": false,
            "page_shadow": false,
        }));
        assert_eq!(prefs.preload_radius, 0);
        assert!(!prefs.show_scrollbar);
        assert!(!prefs.force_rotation_aware);
        assert!(!prefs.page_shadow);
    }

    #[test]
    fn null_counts_as_absent() {
        let prefs = from(json!({ "preload_radius": null, "theme": null }));
        assert_eq!(prefs.preload_radius, DEFAULT_PRELOAD_RADIUS);
        assert_eq!(prefs.theme, Theme::Light);
    }

    #[test]
    fn legacy_browser_keys_are_understood() {
        let prefs = from(json!({
            "hflip": true,
            "vflip": false,
            "rotateTimes": 3,
            "fitMode": 87,
            "theme": "dark",
            "direction": 1,
            "nextPage": 1,
            "scrollbar": 0,
            "pageMode": 2,
            "preloadPageNb": 4,
        }));
        assert_eq!(prefs.rotation, Rotation::THREE_QUARTERS);
        assert!(prefs.hflip);
        assert_eq!(prefs.fit_mode, FitMode::Width);
        assert_eq!(prefs.theme, Theme::Dark);
        assert_eq!(prefs.direction, ReadingDirection::Reversed);
        assert_eq!(prefs.scroll_policy, ScrollPolicy::KeepPosition);
        assert!(!prefs.show_scrollbar);
        assert_eq!(prefs.layout, LayoutMode::Double);
        assert_eq!(prefs.preload_radius, 4);
    }

    #[test]
    fn canonical_key_wins_over_legacy_alias() {
        let prefs = from(json!({ "layout": "single", "pageMode": 2 }));
        assert_eq!(prefs.layout, LayoutMode::Single);
    }

    #[test]
    fn invalid_values_fall_back_per_field() {
        let prefs = from(json!({
            "layout": "triple",
            "fit_mode": 12,
            "preload_radius": -3,
            "hflip": "yes",
            "theme": "dark",
        }));
        assert_eq!(prefs.layout, LayoutMode::Single);
        assert_eq!(prefs.fit_mode, FitMode::Best);
        assert_eq!(prefs.preload_radius, DEFAULT_PRELOAD_RADIUS);
        assert!(!prefs.hflip);
        // Valid neighbours are unaffected.
        assert_eq!(prefs.theme, Theme::Dark);
    }

    #[test]
    fn negative_legacy_rotation_wraps() {
        let prefs = from(json!({ "rotateTimes": -1 }));
        assert_eq!(prefs.rotation, Rotation::THREE_QUARTERS);
    }

    #[test]
    fn save_writes_canonical_form() {
        let mut prefs = Preferences::default();
        prefs.layout = LayoutMode::Double;
        prefs.rotation = Rotation::QUARTER;
        let json: Value = serde_json::from_str(&prefs.to_json_string().unwrap()).unwrap();
        assert_eq!(json["layout"], "double");
        assert_eq!(json["rotation"], 1);
        assert_eq!(json["scroll_policy"], "reset_to_top");

        let back = Preferences::from_json_str(&json.to_string()).unwrap();
        assert_eq!(back, prefs);
    }

    #[test]
    fn serde_deserialize_uses_field_table() {
        let prefs: Preferences = serde_json::from_str(r#"{"pageMode": 2}"#).unwrap();
        assert_eq!(prefs.layout, LayoutMode::Double);
        assert_eq!(prefs.preload_radius, DEFAULT_PRELOAD_RADIUS);
    }

    #[test]
    fn non_object_json_is_rejected() {
        assert!(matches!(
            Preferences::from_json_str("[1,2]"),
            Err(PreferencesError::NotAnObject)
        ));
        assert!(matches!(
            Preferences::from_json_str("{oops"),
            Err(PreferencesError::Json(_))
        ));
    }

    #[test]
    fn flip_cycle_visits_all_states() {
        let mut prefs = Preferences::default();
        let mut seen = Vec::new();
        for _ in 0..4 {
            prefs.cycle_flip();
            seen.push((prefs.hflip, prefs.vflip));
        }
        assert_eq!(seen, vec![(true, false), (false, true), (true, true), (false, false)]);
    }

    #[test]
    fn classification_rotation_respects_flag() {
        let mut prefs = Preferences::default();
        prefs.rotation = Rotation::QUARTER;
        assert_eq!(prefs.classification_rotation(), Rotation::QUARTER);
        prefs.force_rotation_aware = false;
        assert_eq!(prefs.classification_rotation(), Rotation::NONE);
    }

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("prefs.json"));

        assert!(store.load().unwrap().is_none());

        let mut prefs = Preferences::default();
        prefs.theme = Theme::Dark;
        prefs.preload_radius = 0;
        store.save(&prefs).unwrap();

        assert_eq!(store.load().unwrap(), Some(prefs));
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn corrupt_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, "not json").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(store.load().is_err());
        assert_eq!(load_or_default(&store), Preferences::default());
    }

    #[test]
    fn memory_store_counts_saves() {
        let store = MemoryStore::with_json(r#"{"theme":"dark"}"#);
        assert_eq!(load_or_default(&store).theme, Theme::Dark);

        store.save(&Preferences::default()).unwrap();
        assert_eq!(store.save_count(), 1);
        assert_eq!(load_or_default(&store), Preferences::default());
    }
}
