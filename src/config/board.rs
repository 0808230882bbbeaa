// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

const DEFAULT_GRID_ROWS: i32 = 4;
const DEFAULT_GRID_COLS: i32 = 4;
const DEFAULT_BUTTON_FONT_SIZE: i32 = 14;
const DEFAULT_BUTTON_PADDING: i32 = 6;
const MIN_BUTTON_FONT_SIZE: i32 = 8;
const MAX_BUTTON_FONT_SIZE: i32 = 48;

/// The largest number of rows or columns a board can have.
pub const MAX_GRID_DIM: i32 = 64;

/// The color of a pad that doesn't set one.
pub const DEFAULT_PAD_COLOR: &str = "#2d2d2d";

/// How a pad behaves when it is triggered while already playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PadMode {
    /// Retriggering silences the pad's previous playback.
    Cut,
    /// Every trigger layers a new playback.
    #[default]
    Overlap,
}

impl PadMode {
    /// Parses a mode name. Only "cut", in any case, selects [`PadMode::Cut`].
    pub fn parse(mode: Option<&str>) -> PadMode {
        match mode {
            Some(mode) if mode.trim().eq_ignore_ascii_case("cut") => PadMode::Cut,
            _ => PadMode::Overlap,
        }
    }
}

impl fmt::Display for PadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PadMode::Cut => write!(f, "Cut"),
            PadMode::Overlap => write!(f, "Overlap"),
        }
    }
}

impl Serialize for PadMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PadMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<PadMode, D::Error> {
        let mode = Option::<String>::deserialize(deserializer)?;
        Ok(PadMode::parse(mode.as_deref()))
    }
}

/// One cell of the board. Pads are identified by their position in the grid.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Pad {
    label: Option<String>,
    file_path: Option<PathBuf>,
    mode: PadMode,
    /// Gain from 0 to 1. Zero or less plays at full volume.
    volume: f32,
    color: Option<String>,
    /// Reserved for keyboard bindings.
    hotkey: Option<String>,
}

impl Default for Pad {
    fn default() -> Self {
        Pad {
            label: None,
            file_path: None,
            mode: PadMode::Overlap,
            volume: 1.0,
            color: Some(DEFAULT_PAD_COLOR.to_string()),
            hotkey: None,
        }
    }
}

impl Pad {
    /// Creates a new pad.
    pub fn new(
        label: Option<String>,
        file_path: Option<PathBuf>,
        mode: PadMode,
        volume: f32,
        color: Option<String>,
    ) -> Pad {
        Pad {
            label,
            file_path,
            mode,
            volume,
            color,
            hotkey: None,
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// The audio file, if one is assigned. An empty path counts as unassigned.
    pub fn file_path(&self) -> Option<&Path> {
        self.file_path
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }

    pub fn mode(&self) -> PadMode {
        self.mode
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn color(&self) -> Option<&str> {
        self.color.as_deref()
    }

    pub fn hotkey(&self) -> Option<&str> {
        self.hotkey.as_deref()
    }

    /// The text shown on the pad: its label, or "Pad N" (1-based) when the label is blank.
    pub fn display_label(&self, slot: usize) -> String {
        match self.label() {
            Some(label) if !label.trim().is_empty() => label.to_string(),
            _ => format!("Pad {}", slot + 1),
        }
    }

    /// The pad's color, or the default when it is blank.
    pub fn color_or_default(&self) -> &str {
        match self.color() {
            Some(color) if !color.trim().is_empty() => color,
            _ => DEFAULT_PAD_COLOR,
        }
    }
}

/// The persisted board: grid geometry, button styling and the pads in row-major order.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct BoardConfig {
    grid_rows: i32,
    grid_cols: i32,
    button_font_size: i32,
    button_padding: i32,
    #[serde(deserialize_with = "null_as_default")]
    pads: Vec<Pad>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        BoardConfig {
            grid_rows: DEFAULT_GRID_ROWS,
            grid_cols: DEFAULT_GRID_COLS,
            button_font_size: DEFAULT_BUTTON_FONT_SIZE,
            button_padding: DEFAULT_BUTTON_PADDING,
            pads: vec![
                Pad::new(
                    Some("Intro".to_string()),
                    None,
                    PadMode::Cut,
                    1.0,
                    Some("#3b82f6".to_string()),
                ),
                Pad::new(
                    Some("Clap".to_string()),
                    None,
                    PadMode::Overlap,
                    0.9,
                    Some("#16a34a".to_string()),
                ),
            ],
        }
    }
}

impl BoardConfig {
    /// Creates a new board configuration. Call [`BoardConfig::reconcile`] before laying it out.
    pub fn new(
        grid_rows: i32,
        grid_cols: i32,
        button_font_size: i32,
        button_padding: i32,
        pads: Vec<Pad>,
    ) -> BoardConfig {
        BoardConfig {
            grid_rows,
            grid_cols,
            button_font_size,
            button_padding,
            pads,
        }
    }

    /// The number of rows, between one and [`MAX_GRID_DIM`].
    pub fn rows(&self) -> usize {
        self.grid_rows.clamp(1, MAX_GRID_DIM) as usize
    }

    /// The number of columns, between one and [`MAX_GRID_DIM`].
    pub fn cols(&self) -> usize {
        self.grid_cols.clamp(1, MAX_GRID_DIM) as usize
    }

    pub fn button_font_size(&self) -> i32 {
        self.button_font_size
    }

    pub fn button_padding(&self) -> i32 {
        self.button_padding
    }

    pub fn pads(&self) -> &[Pad] {
        &self.pads
    }

    pub fn pad(&self, slot: usize) -> Option<&Pad> {
        self.pads.get(slot)
    }

    /// Replaces the pad at the given slot. Returns false if the slot is outside the grid.
    pub fn set_pad(&mut self, slot: usize, pad: Pad) -> bool {
        match self.pads.get_mut(slot) {
            Some(existing) => {
                *existing = pad;
                true
            }
            None => false,
        }
    }

    /// Makes the pad list match the grid: one pad per cell in row-major order. Pads past the
    /// end of a shrunken grid are dropped, and a grown grid is filled with default pads.
    pub fn reconcile(&mut self) {
        self.grid_rows = self.grid_rows.clamp(1, MAX_GRID_DIM);
        self.grid_cols = self.grid_cols.clamp(1, MAX_GRID_DIM);

        let total = self.rows() * self.cols();
        self.pads.truncate(total);
        self.pads.resize_with(total, Pad::default);
    }

    /// Applies new grid settings from the user. Rows and columns are kept between one and
    /// [`MAX_GRID_DIM`], the font size
    /// is kept between 8 and 48 and padding is never negative.
    pub fn apply_grid(
        &mut self,
        rows: i32,
        cols: i32,
        font_size: Option<i32>,
        padding: Option<i32>,
    ) {
        self.grid_rows = rows.clamp(1, MAX_GRID_DIM);
        self.grid_cols = cols.clamp(1, MAX_GRID_DIM);
        if let Some(font_size) = font_size {
            self.button_font_size = font_size.clamp(MIN_BUTTON_FONT_SIZE, MAX_BUTTON_FONT_SIZE);
        }
        if let Some(padding) = padding {
            self.button_padding = padding.max(0);
        }
        self.reconcile();
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_pad_mode_parse() {
        assert_eq!(PadMode::parse(Some("Cut")), PadMode::Cut);
        assert_eq!(PadMode::parse(Some("cUT")), PadMode::Cut);
        assert_eq!(PadMode::parse(Some("Overlap")), PadMode::Overlap);
        assert_eq!(PadMode::parse(Some("loop")), PadMode::Overlap);
        assert_eq!(PadMode::parse(Some("")), PadMode::Overlap);
        assert_eq!(PadMode::parse(None), PadMode::Overlap);
    }

    #[test]
    fn test_pad_deserialize() {
        let pad: Pad = serde_json::from_str(
            r##"{"Label": "Kick", "FilePath": "/tmp/kick.wav", "Mode": "cut", "Volume": 0.5, "Extra": 1}"##,
        )
        .expect("parse pad");
        assert_eq!(pad.label(), Some("Kick"));
        assert_eq!(pad.file_path(), Some(Path::new("/tmp/kick.wav")));
        assert_eq!(pad.mode(), PadMode::Cut);
        assert_eq!(pad.volume(), 0.5);
        assert_eq!(pad.color(), Some(DEFAULT_PAD_COLOR));

        let pad: Pad = serde_json::from_str(r#"{"Mode": null, "FilePath": ""}"#).expect("parse pad");
        assert_eq!(pad.mode(), PadMode::Overlap);
        assert_eq!(pad.file_path(), None);
        assert_eq!(pad.volume(), 1.0);
    }

    #[test]
    fn test_pad_serialize() {
        let pad = Pad::new(
            Some("Intro".to_string()),
            None,
            PadMode::Cut,
            1.0,
            Some("#3b82f6".to_string()),
        );
        let value = serde_json::to_value(&pad).expect("serialize");
        assert_eq!(value["Label"], "Intro");
        assert_eq!(value["Mode"], "Cut");
        assert_eq!(value["Color"], "#3b82f6");
        assert!(value["FilePath"].is_null());
    }

    #[test]
    fn test_display_label_and_color() {
        let pad = Pad::new(Some("  ".to_string()), None, PadMode::Cut, 1.0, Some("".to_string()));
        assert_eq!(pad.display_label(2), "Pad 3");
        assert_eq!(pad.color_or_default(), DEFAULT_PAD_COLOR);

        let pad = Pad::new(Some("Horn".to_string()), None, PadMode::Cut, 1.0, None);
        assert_eq!(pad.display_label(0), "Horn");
    }

    #[test]
    fn test_default_config() {
        let config = BoardConfig::default();
        assert_eq!((config.rows(), config.cols()), (4, 4));
        assert_eq!(config.button_font_size(), 14);
        assert_eq!(config.button_padding(), 6);
        assert_eq!(config.pads().len(), 2);
        assert_eq!(config.pads()[0].label(), Some("Intro"));
        assert_eq!(config.pads()[0].mode(), PadMode::Cut);
        assert_eq!(config.pads()[1].label(), Some("Clap"));
        assert_eq!(config.pads()[1].volume(), 0.9);
        assert_eq!(config.pads()[1].color(), Some("#16a34a"));
    }

    #[test]
    fn test_reconcile_grows_and_shrinks() {
        let mut config = BoardConfig::default();
        config.reconcile();
        assert_eq!(config.pads().len(), 16);
        assert_eq!(config.pads()[0].label(), Some("Intro"));
        assert_eq!(config.pads()[2], Pad::default());

        config.apply_grid(1, 1, None, None);
        assert_eq!(config.pads().len(), 1);
        assert_eq!(config.pads()[0].label(), Some("Intro"));

        // Shrinking drops pads for good.
        config.apply_grid(2, 2, None, None);
        assert_eq!(config.pads()[1], Pad::default());
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let mut config = BoardConfig::new(0, -3, 14, 6, vec![Pad::default(); 5]);
        config.reconcile();
        let once = config.clone();
        config.reconcile();
        assert_eq!(config, once);
        assert_eq!((config.rows(), config.cols()), (1, 1));
        assert_eq!(config.pads().len(), 1);
    }

    #[test]
    fn test_apply_grid_clamps() {
        let mut config = BoardConfig::default();
        config.apply_grid(-1, 0, Some(100), Some(-4));
        assert_eq!((config.rows(), config.cols()), (1, 1));
        assert_eq!(config.button_font_size(), 48);
        assert_eq!(config.button_padding(), 0);

        config.apply_grid(3, 5, Some(2), None);
        assert_eq!(config.pads().len(), 15);
        assert_eq!(config.button_font_size(), 8);
        assert_eq!(config.button_padding(), 0);
    }

    #[test]
    fn test_oversized_grid_is_clamped() {
        let mut config: BoardConfig =
            serde_json::from_str(r#"{"GridRows": 2147483647, "GridCols": 2147483647}"#)
                .expect("parse");
        config.reconcile();
        assert_eq!((config.rows(), config.cols()), (64, 64));
        assert_eq!(config.pads().len(), 64 * 64);

        config.apply_grid(50000, 3, None, None);
        assert_eq!((config.rows(), config.cols()), (64, 3));
        assert_eq!(config.pads().len(), 192);
    }

    #[test]
    fn test_set_pad() {
        let mut config = BoardConfig::default();
        config.reconcile();
        let pad = Pad::new(Some("Horn".to_string()), None, PadMode::Cut, 0.7, None);
        assert!(config.set_pad(15, pad.clone()));
        assert_eq!(config.pad(15), Some(&pad));
        assert!(!config.set_pad(16, pad));
    }
}
