//! Spritesheet (texture atlas) metadata.
//!
//! Atlases ship with a JSON file next to the image describing where each
//! frame lives. Both layouts emitted by common packers are accepted:
//!
//! ```json
//! { "frames": { "icon_0": { "frame": { "x": 0, "y": 0, "w": 32, "h": 32 } } } }
//! { "frames": [ { "filename": "icon_0", "frame": { "x": 0, "y": 0, "w": 32, "h": 32 } } ] }
//! ```
//!
//! Frames are returned in document order; the applier scans them in that order.

use crate::error::{Error, Result};
use camino::Utf8Path;
use serde::Deserialize;

/// A rectangle inside an atlas image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AtlasFrame {
    pub x: u32,
    pub y: u32,
    #[serde(rename = "w")]
    pub width: u32,
    #[serde(rename = "h")]
    pub height: u32,
}

impl AtlasFrame {
    /// Whether the frame lies entirely inside an image of the given size.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self
                .x
                .checked_add(self.width)
                .is_some_and(|right| right <= width)
            && self
                .y
                .checked_add(self.height)
                .is_some_and(|bottom| bottom <= height)
    }
}

#[derive(Deserialize)]
struct FrameRecord {
    frame: AtlasFrame,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Frames {
    Map(serde_json::Map<String, serde_json::Value>),
    List(Vec<FrameRecord>),
}

#[derive(Deserialize)]
struct SpritesheetMeta {
    frames: Frames,
}

/// Parse spritesheet metadata into its frame rectangles, in document order.
pub fn parse_frames(bytes: &[u8]) -> serde_json::Result<Vec<AtlasFrame>> {
    let meta: SpritesheetMeta = serde_json::from_slice(bytes)?;

    match meta.frames {
        Frames::List(records) => Ok(records.into_iter().map(|r| r.frame).collect()),
        Frames::Map(map) => map
            .into_iter()
            .map(|(_, value)| serde_json::from_value::<FrameRecord>(value).map(|r| r.frame))
            .collect(),
    }
}

/// Load the frames from a metadata file.
///
/// Returns `Ok(None)` when there is no metadata file, meaning the image is a
/// single sprite.
pub fn load_frames(meta_path: &Utf8Path) -> Result<Option<Vec<AtlasFrame>>> {
    if !meta_path.as_std_path().is_file() {
        return Ok(None);
    }

    let bytes = std::fs::read(meta_path.as_std_path())?;
    parse_frames(&bytes)
        .map(Some)
        .map_err(|source| Error::SpritesheetMeta {
            path: meta_path.to_path_buf(),
            source,
        })
}
