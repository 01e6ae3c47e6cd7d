use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::db::SqliteStore;
use crate::error::{Error, Result};

pub const INTERVAL_RANGE: RangeInclusive<u32> = 1..=300;
pub const COLUMN_RANGE: RangeInclusive<u32> = 2..=5;

const KEY_INTERVAL: &str = "seconds";
const KEY_MUTE: &str = "mute_videos";
const KEY_ORDERING: &str = "ordering";
const KEY_DISPLAY_MODE: &str = "too_wide_images_rule";
const KEY_SWIPE: &str = "swipe";
const KEY_COLUMNS: &str = "gallery_columns";
const KEY_THUMBNAIL_RATIO: &str = "thumbnail_ratio";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackOrder {
    #[default]
    Sequential,
    Random,
    Shuffle,
}

impl PlaybackOrder {
    fn pref_value(self) -> &'static str {
        match self {
            PlaybackOrder::Sequential => "selection",
            PlaybackOrder::Random | PlaybackOrder::Shuffle => "random",
        }
    }

    fn from_pref(value: &str) -> Self {
        match value {
            "random" => PlaybackOrder::Shuffle,
            _ => PlaybackOrder::Sequential,
        }
    }
}

impl fmt::Display for PlaybackOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PlaybackOrder::Sequential => "Sequential",
            PlaybackOrder::Random => "Random",
            PlaybackOrder::Shuffle => "Shuffle",
        })
    }
}

impl FromStr for PlaybackOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" => Ok(PlaybackOrder::Sequential),
            "random" => Ok(PlaybackOrder::Random),
            "shuffle" => Ok(PlaybackOrder::Shuffle),
            _ => Err(Error::InvalidSetting {
                key: KEY_ORDERING,
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayMode {
    #[default]
    Fit,
    Fill,
    Stretch,
    Center,
    ScrollForward,
    ScrollBackward,
}

impl DisplayMode {
    fn pref_value(self) -> &'static str {
        match self {
            DisplayMode::Fit => "scale_down",
            DisplayMode::Fill => "scale_up",
            DisplayMode::Stretch => "stretch",
            DisplayMode::Center => "center",
            DisplayMode::ScrollForward => "scroll_forward",
            DisplayMode::ScrollBackward => "scroll_backward",
        }
    }

    fn from_pref(value: &str) -> Self {
        match value {
            "scale_up" => DisplayMode::Fill,
            "stretch" => DisplayMode::Stretch,
            "center" => DisplayMode::Center,
            "scroll_forward" => DisplayMode::ScrollForward,
            "scroll_backward" => DisplayMode::ScrollBackward,
            _ => DisplayMode::Fit,
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DisplayMode::Fit => "Fit",
            DisplayMode::Fill => "Fill",
            DisplayMode::Stretch => "Stretch",
            DisplayMode::Center => "Center",
            DisplayMode::ScrollForward => "Scroll Forward",
            DisplayMode::ScrollBackward => "Scroll Backward",
        })
    }
}

impl FromStr for DisplayMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace(['-', '_'], " ").as_str() {
            "fit" => Ok(DisplayMode::Fit),
            "fill" => Ok(DisplayMode::Fill),
            "stretch" => Ok(DisplayMode::Stretch),
            "center" => Ok(DisplayMode::Center),
            "scroll forward" => Ok(DisplayMode::ScrollForward),
            "scroll backward" => Ok(DisplayMode::ScrollBackward),
            _ => Err(Error::InvalidSetting {
                key: KEY_DISPLAY_MODE,
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThumbnailRatio {
    Portrait9x16,
    #[default]
    Portrait3x4,
    Square,
    Landscape16x9,
    Natural,
}

impl ThumbnailRatio {
    /// Width over height, `None` for the natural aspect of each item.
    pub fn aspect(self) -> Option<f32> {
        match self {
            ThumbnailRatio::Portrait9x16 => Some(9.0 / 16.0),
            ThumbnailRatio::Portrait3x4 => Some(3.0 / 4.0),
            ThumbnailRatio::Square => Some(1.0),
            ThumbnailRatio::Landscape16x9 => Some(16.0 / 9.0),
            ThumbnailRatio::Natural => None,
        }
    }
}

impl fmt::Display for ThumbnailRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ThumbnailRatio::Portrait9x16 => "9:16",
            ThumbnailRatio::Portrait3x4 => "3:4",
            ThumbnailRatio::Square => "1:1",
            ThumbnailRatio::Landscape16x9 => "16:9",
            ThumbnailRatio::Natural => "Natural",
        })
    }
}

impl FromStr for ThumbnailRatio {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "9:16" => Ok(ThumbnailRatio::Portrait9x16),
            "3:4" => Ok(ThumbnailRatio::Portrait3x4),
            "1:1" => Ok(ThumbnailRatio::Square),
            "16:9" => Ok(ThumbnailRatio::Landscape16x9),
            "natural" => Ok(ThumbnailRatio::Natural),
            _ => Err(Error::InvalidSetting {
                key: KEY_THUMBNAIL_RATIO,
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub interval_secs: u32,
    pub mute_videos: bool,
    pub playback_order: PlaybackOrder,
    pub display_mode: DisplayMode,
    pub swipe_to_change: bool,
    pub gallery_columns: u32,
    pub thumbnail_ratio: ThumbnailRatio,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            mute_videos: false,
            playback_order: PlaybackOrder::Sequential,
            display_mode: DisplayMode::Fit,
            swipe_to_change: false,
            gallery_columns: 3,
            thumbnail_ratio: ThumbnailRatio::Portrait3x4,
        }
    }
}

pub struct SettingsStore {
    db: SqliteStore,
    current: Settings,
}

impl SettingsStore {
    /// Loads every setting, substituting defaults for missing or unreadable
    /// values.
    pub fn load(db: SqliteStore) -> Result<Self> {
        let defaults = Settings::default();
        let current = Settings {
            interval_secs: db
                .get_pref(KEY_INTERVAL)?
                .and_then(|v| v.parse().ok())
                .filter(|v| INTERVAL_RANGE.contains(v))
                .unwrap_or(defaults.interval_secs),
            mute_videos: read_bool(&db, KEY_MUTE)?.unwrap_or(defaults.mute_videos),
            playback_order: db
                .get_pref(KEY_ORDERING)?
                .map(|v| PlaybackOrder::from_pref(&v))
                .unwrap_or(defaults.playback_order),
            display_mode: db
                .get_pref(KEY_DISPLAY_MODE)?
                .map(|v| DisplayMode::from_pref(&v))
                .unwrap_or(defaults.display_mode),
            swipe_to_change: read_bool(&db, KEY_SWIPE)?.unwrap_or(defaults.swipe_to_change),
            gallery_columns: db
                .get_pref(KEY_COLUMNS)?
                .and_then(|v| v.parse().ok())
                .filter(|v| COLUMN_RANGE.contains(v))
                .unwrap_or(defaults.gallery_columns),
            thumbnail_ratio: db
                .get_pref(KEY_THUMBNAIL_RATIO)?
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.thumbnail_ratio),
        };
        debug!("loaded settings: {current:?}");
        Ok(Self { db, current })
    }

    pub fn current(&self) -> &Settings {
        &self.current
    }

    pub fn set_interval(&mut self, secs: u32) -> Result<()> {
        if !INTERVAL_RANGE.contains(&secs) {
            return Err(Error::InvalidSetting {
                key: KEY_INTERVAL,
                value: secs.to_string(),
            });
        }
        self.current.interval_secs = secs;
        self.db.set_pref(KEY_INTERVAL, &secs.to_string())
    }

    pub fn set_mute_videos(&mut self, muted: bool) -> Result<()> {
        self.current.mute_videos = muted;
        self.db.set_pref(KEY_MUTE, bool_str(muted))
    }

    pub fn set_playback_order(&mut self, order: PlaybackOrder) -> Result<()> {
        self.current.playback_order = order;
        self.db.set_pref(KEY_ORDERING, order.pref_value())
    }

    pub fn set_display_mode(&mut self, mode: DisplayMode) -> Result<()> {
        self.current.display_mode = mode;
        self.db.set_pref(KEY_DISPLAY_MODE, mode.pref_value())
    }

    pub fn set_swipe_to_change(&mut self, enabled: bool) -> Result<()> {
        self.current.swipe_to_change = enabled;
        self.db.set_pref(KEY_SWIPE, bool_str(enabled))
    }

    pub fn set_gallery_columns(&mut self, columns: u32) -> Result<()> {
        if !COLUMN_RANGE.contains(&columns) {
            return Err(Error::InvalidSetting {
                key: KEY_COLUMNS,
                value: columns.to_string(),
            });
        }
        self.current.gallery_columns = columns;
        self.db.set_pref(KEY_COLUMNS, &columns.to_string())
    }

    pub fn set_thumbnail_ratio(&mut self, ratio: ThumbnailRatio) -> Result<()> {
        self.current.thumbnail_ratio = ratio;
        self.db.set_pref(KEY_THUMBNAIL_RATIO, &ratio.to_string())
    }

    pub fn set_from_str(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "interval" | KEY_INTERVAL => self.set_interval(parse_value(KEY_INTERVAL, value)?),
            "mute" | KEY_MUTE => self.set_mute_videos(parse_bool(KEY_MUTE, value)?),
            "order" | "playback-order" | KEY_ORDERING => self.set_playback_order(value.parse()?),
            "display-mode" | KEY_DISPLAY_MODE => self.set_display_mode(value.parse()?),
            "swipe" => self.set_swipe_to_change(parse_bool(KEY_SWIPE, value)?),
            "columns" | KEY_COLUMNS => self.set_gallery_columns(parse_value(KEY_COLUMNS, value)?),
            "thumbnail-ratio" | KEY_THUMBNAIL_RATIO => self.set_thumbnail_ratio(value.parse()?),
            _ => Err(Error::InvalidArgument(format!("unknown setting: {key}"))),
        }
    }
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

fn read_bool(db: &SqliteStore, key: &str) -> Result<Option<bool>> {
    Ok(db.get_pref(key)?.and_then(|v| v.parse().ok()))
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => Err(Error::InvalidSetting {
            key,
            value: value.to_string(),
        }),
    }
}

fn parse_value(key: &'static str, value: &str) -> Result<u32> {
    value.parse().map_err(|_| Error::InvalidSetting {
        key,
        value: value.to_string(),
    })
}
