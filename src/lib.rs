#![forbid(unsafe_code)]

pub mod assets;
pub mod backdrop;
pub mod blur;
pub mod error;
pub mod fonts;
pub mod fx;
pub mod model;
pub mod raster;
pub mod render;
pub mod text;
pub mod zones;

pub use assets::{AssetCategory, AssetSource, FsAssetSource, MemoryAssetSource};
pub use error::{RenderError, RenderResult};
pub use fonts::{FontCache, FontHandle};
pub use model::{
    Align, BackgroundConfig, BackgroundMode, BadgeZone, CanvasConfig, EpisodeData, ImageZone,
    LayoutMode, OrderedMap, SelectionPolicy, SubjectConfig, Template, TextBackground, TextEffects,
    TextSize, TextTransform, TextZone, VAlign, Zone, ZonePosition,
};
pub use raster::Surface;
pub use render::{DEFAULT_FILL, RenderOptions, Renderer};
