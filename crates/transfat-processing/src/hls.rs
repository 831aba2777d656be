//! HLS rendition ladder and playlist helpers.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use transfat_core::Config;

/// One output tier. Height is fixed; width follows the source aspect ratio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rendition {
    pub name: String,
    /// Nominal width advertised in the master playlist.
    pub width: u32,
    pub height: u32,
    pub bitrate_kbps: u32,
    pub maxrate_kbps: u32,
    pub bufsize_kbps: u32,
}

impl Rendition {
    /// Built-in tiers, looked up by name (`1080p`, `720p`, `480p`, `360p`).
    pub fn preset(name: &str) -> Option<Self> {
        let (width, height, bitrate, maxrate, bufsize) = match name {
            "1080p" => (1920, 1080, 6000, 6300, 9000),
            "720p" => (1280, 720, 4000, 4200, 6000),
            "480p" => (854, 480, 1500, 1600, 2400),
            "360p" => (640, 360, 800, 856, 1200),
            _ => return None,
        };
        Some(Self {
            name: name.to_string(),
            width,
            height,
            bitrate_kbps: bitrate,
            maxrate_kbps: maxrate,
            bufsize_kbps: bufsize,
        })
    }

    pub fn playlist_name(&self) -> String {
        format!("{}.m3u8", self.name)
    }

    pub fn segment_pattern(&self) -> String {
        format!("{}_%03d.ts", self.name)
    }

    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone)]
pub struct HlsConfig {
    pub segment_duration: u64,
    pub renditions: Vec<Rendition>,
    pub thumbnail_offset_secs: u64,
}

impl Default for HlsConfig {
    fn default() -> Self {
        Self {
            segment_duration: 10,
            renditions: ["720p", "480p"]
                .iter()
                .filter_map(|name| Rendition::preset(name))
                .collect(),
            thumbnail_offset_secs: 5,
        }
    }
}

impl HlsConfig {
    pub fn from_config(config: &Config) -> Result<Self> {
        let renditions = config
            .hls_renditions()
            .iter()
            .map(|name| {
                Rendition::preset(name).ok_or_else(|| anyhow!("Unknown HLS rendition: {}", name))
            })
            .collect::<Result<Vec<_>>>()?;
        if renditions.is_empty() {
            return Err(anyhow!("At least one HLS rendition is required"));
        }

        Ok(Self {
            segment_duration: config.hls_segment_duration().max(1),
            renditions,
            thumbnail_offset_secs: config.thumbnail_offset_secs(),
        })
    }
}

pub fn master_playlist(renditions: &[Rendition]) -> String {
    let mut playlist = String::from("#EXTM3U\n#EXT-X-VERSION:3\n\n");
    for rendition in renditions {
        playlist.push_str(&format!(
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}\n{}\n\n",
            rendition.bitrate_kbps * 1000,
            rendition.resolution(),
            rendition.playlist_name()
        ));
    }
    playlist
}

/// Content type for a published file, by extension.
pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("m3u8") => "application/x-mpegURL",
        Some("ts") => "video/MP2T",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}
