use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use crate::error::{RenderError, RenderResult};

/// String-keyed map that preserves JSON declaration order.
///
/// Zone declaration order is paint order (later zones draw on top) and
/// color-rule declaration order is match precedence, so the usual sorted maps
/// would silently reorder both.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderedMap<V> {
    entries: Vec<(String, V)>,
}

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        self.entries.push((key.into(), value));
    }

    /// First entry with the given key.
    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys that appear more than once, in first-occurrence order.
    pub fn duplicate_keys(&self) -> Vec<&str> {
        let mut seen = Vec::<&str>::new();
        let mut dups = Vec::<&str>::new();
        for (k, _) in &self.entries {
            if seen.contains(&k.as_str()) {
                if !dups.contains(&k.as_str()) {
                    dups.push(k);
                }
            } else {
                seen.push(k);
            }
        }
        dups
    }
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for OrderedMap<V> {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl<V: serde::Serialize> serde::Serialize for OrderedMap<V> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de, V: serde::Deserialize<'de>> serde::Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MapVisitor<V>(PhantomData<V>);

        impl<'de, V: serde::Deserialize<'de>> serde::de::Visitor<'de> for MapVisitor<V> {
            type Value = OrderedMap<V>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a string-keyed object")
            }

            fn visit_map<A: serde::de::MapAccess<'de>>(
                self,
                mut access: A,
            ) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, V>()? {
                    entries.push((key, value));
                }
                Ok(OrderedMap { entries })
            }
        }

        deserializer.deserialize_map(MapVisitor(PhantomData))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CanvasConfig {
    #[serde(default = "default_canvas_width")]
    pub width: u32,
    #[serde(default = "default_canvas_height")]
    pub height: u32,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: default_canvas_width(),
            height: default_canvas_height(),
        }
    }
}

fn default_canvas_width() -> u32 {
    1280
}

fn default_canvas_height() -> u32 {
    720
}

/// Rectangle in canvas coordinates. May extend outside the canvas; renderers
/// clip rather than reject.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ZonePosition {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TextSize {
    #[serde(default = "default_size_min")]
    pub min: u32,
    #[serde(default = "default_size_max")]
    pub max: u32,
    #[serde(default = "default_true")]
    pub auto: bool,
}

impl Default for TextSize {
    fn default() -> Self {
        Self {
            min: default_size_min(),
            max: default_size_max(),
            auto: true,
        }
    }
}

fn default_size_min() -> u32 {
    48
}

fn default_size_max() -> u32 {
    96
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TextEffects {
    #[serde(default = "default_black")]
    pub stroke_color: String,
    #[serde(default = "default_stroke_width")]
    pub stroke_width: u32,
    #[serde(default)]
    pub shadow_enabled: bool,
    #[serde(default = "default_black")]
    pub shadow_color: String,
    #[serde(default = "default_shadow_blur")]
    pub shadow_blur: u32,
    #[serde(default = "default_shadow_offset")]
    pub shadow_offset: (i32, i32),
}

impl Default for TextEffects {
    fn default() -> Self {
        Self {
            stroke_color: default_black(),
            stroke_width: default_stroke_width(),
            shadow_enabled: false,
            shadow_color: default_black(),
            shadow_blur: default_shadow_blur(),
            shadow_offset: default_shadow_offset(),
        }
    }
}

fn default_black() -> String {
    "#000000".to_string()
}

fn default_stroke_width() -> u32 {
    4
}

fn default_shadow_blur() -> u32 {
    8
}

fn default_shadow_offset() -> (i32, i32) {
    (2, 2)
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TextBackground {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_black")]
    pub color: String,
    #[serde(default = "default_box_opacity")]
    pub opacity: f32,
    #[serde(default = "default_box_padding")]
    pub padding: u32,
    #[serde(default)]
    pub border_radius: u32,
}

impl Default for TextBackground {
    fn default() -> Self {
        Self {
            enabled: false,
            color: default_black(),
            opacity: default_box_opacity(),
            padding: default_box_padding(),
            border_radius: 0,
        }
    }
}

fn default_box_opacity() -> f32 {
    0.7
}

fn default_box_padding() -> u32 {
    20
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutMode {
    #[default]
    Horizontal,
    StackedWords,
    StackedChars,
    Rotated,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    Left,
    #[default]
    Center,
    Right,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VAlign {
    Top,
    #[default]
    Middle,
    Bottom,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextTransform {
    #[default]
    None,
    Uppercase,
    Lowercase,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TextZone {
    pub position: ZonePosition,
    #[serde(default = "default_font")]
    pub font: String,
    #[serde(default)]
    pub size: TextSize,
    #[serde(default = "default_color_rules")]
    pub color_rules: OrderedMap<String>,
    #[serde(default)]
    pub effects: TextEffects,
    #[serde(default)]
    pub layout_mode: LayoutMode,
    /// Degrees; only read when `layout_mode` is `rotated`.
    #[serde(default)]
    pub rotation: i32,
    #[serde(default)]
    pub align: Align,
    #[serde(default)]
    pub valign: VAlign,
    /// Extra pixels between characters.
    #[serde(default)]
    pub letter_spacing: u32,
    #[serde(default = "default_line_height")]
    pub line_height: f32,
    /// Extra pixels between stacked words/chars.
    #[serde(default)]
    pub stack_gap: i32,
    #[serde(default)]
    pub transform: TextTransform,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    #[serde(default)]
    pub text_background: TextBackground,
}

fn default_font() -> String {
    "Impact".to_string()
}

fn default_color_rules() -> OrderedMap<String> {
    let mut m = OrderedMap::new();
    m.insert("default", "#FFFFFF".to_string());
    m
}

fn default_line_height() -> f32 {
    1.2
}

fn default_opacity() -> f32 {
    1.0
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BadgeZone {
    pub position: ZonePosition,
    #[serde(default)]
    pub variants: BTreeMap<String, String>,
    #[serde(default)]
    pub visible_when: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ImageZone {
    pub position: ZonePosition,
    #[serde(default)]
    pub mapping: BTreeMap<String, String>,
}

/// Tagged zone union. Unrecognized `type` tags land on `Unknown` so the
/// template still loads and the zone is skipped at render time.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum Zone {
    #[serde(rename = "text")]
    Text(TextZone),
    #[serde(rename = "badge")]
    Badge(BadgeZone),
    #[serde(rename = "image")]
    Image(ImageZone),
    #[serde(other, rename = "unknown")]
    Unknown,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundMode {
    #[default]
    Fixed,
    /// Resolved upstream; the renderer only ever sees a concrete filename or
    /// override bytes.
    Ai,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionPolicy {
    #[default]
    First,
    Rotate,
    Random,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BackgroundConfig {
    #[serde(default)]
    pub mode: BackgroundMode,
    #[serde(default)]
    pub fixed_images: Vec<String>,
    /// Carried for schema fidelity; selection happens upstream.
    #[serde(default)]
    pub selection: SelectionPolicy,
    #[serde(default)]
    pub offset_x: i32,
    #[serde(default)]
    pub offset_y: i32,
    #[serde(default = "default_scale")]
    pub scale: f32,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            mode: BackgroundMode::Fixed,
            fixed_images: Vec::new(),
            selection: SelectionPolicy::First,
            offset_x: 0,
            offset_y: 0,
            scale: default_scale(),
        }
    }
}

fn default_scale() -> f32 {
    1.0
}

/// Foreground cutout layer composited between background and zones.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SubjectConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub offset_x: i32,
    #[serde(default)]
    pub offset_y: i32,
    #[serde(default = "default_scale")]
    pub scale: f32,
    #[serde(default)]
    pub flip_horizontal: bool,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
}

impl Default for SubjectConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            image: String::new(),
            offset_x: 0,
            offset_y: 0,
            scale: default_scale(),
            flip_horizontal: false,
            opacity: default_opacity(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Template {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub canvas: CanvasConfig,
    #[serde(default)]
    pub background: BackgroundConfig,
    #[serde(default)]
    pub subject: SubjectConfig,
    #[serde(default)]
    pub zones: OrderedMap<Zone>,
    #[serde(default)]
    pub overlays: Vec<String>,
}

fn default_version() -> u32 {
    1
}

impl Template {
    pub fn validate(&self) -> RenderResult<()> {
        if self.canvas.width == 0 || self.canvas.height == 0 {
            return Err(RenderError::validation("canvas width/height must be > 0"));
        }
        let dups = self.zones.duplicate_keys();
        if !dups.is_empty() {
            return Err(RenderError::validation(format!(
                "duplicate zone names: {}",
                dups.join(", ")
            )));
        }
        Ok(())
    }
}

/// Per-render key/value input. The reserved `severity` key drives color rules
/// and badge visibility.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EpisodeData {
    values: BTreeMap<String, String>,
}

impl EpisodeData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Coerce an arbitrary JSON object into string values. Non-objects yield
    /// an empty mapping.
    pub fn from_json(value: &serde_json::Value) -> Self {
        let mut out = Self::new();
        if let Some(obj) = value.as_object() {
            for (k, v) in obj {
                out.values.insert(k.clone(), coerce_value(v));
            }
        }
        out
    }

    /// Missing keys read as the empty string.
    pub fn get(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn severity(&self) -> &str {
        self.get("severity")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EpisodeData {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

fn coerce_value(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}
