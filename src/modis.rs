//! MODIS vegetation index quality decoding and masking.
//!
//! The 16-bit `vi_quality` word packs these fields:
//!
//! | field            | bits  |
//! |------------------|-------|
//! | VI quality       | 0-1   |
//! | VI usefulness    | 2-5   |
//! | aerosol quantity | 6-7   |
//! | adjacent cloud   | 8     |
//! | mixed clouds     | 10    |
//! | snow/ice         | 14    |
//! | shadow           | 15    |

use anyhow::Result;
use tracing::debug;

use crate::raster::{band, Raster};

/// `(shift, mask)` per field.
mod layout {
    pub const VI_QUALITY: (u16, u16) = (0, 0b11);
    pub const VI_USEFULNESS: (u16, u16) = (2, 0b1111);
    pub const AEROSOL_QUANTITY: (u16, u16) = (6, 0b11);
    pub const ADJACENT_CLOUD: (u16, u16) = (8, 0b1);
    pub const MIXED_CLOUDS: (u16, u16) = (10, 0b1);
    pub const SNOW_ICE: (u16, u16) = (14, 0b1);
    pub const SHADOW: (u16, u16) = (15, 0b1);
}

const CLOUDY: u8 = 0b10;
const NOT_PRODUCED: u8 = 0b11;
const LOWEST_POOR_USEFULNESS: u8 = 0b1100;
const HIGH_AEROSOL: u8 = 0b11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityFlags {
    pub vi_quality: u8,
    pub vi_usefulness: u8,
    pub aerosol_quantity: u8,
    pub adjacent_cloud: bool,
    pub mixed_clouds: bool,
    pub snow_ice: bool,
    pub shadow: bool,
}

fn field(word: u16, (shift, mask): (u16, u16)) -> u8 {
    ((word >> shift) & mask) as u8
}

impl QualityFlags {
    pub fn decode(word: u16) -> Self {
        QualityFlags {
            vi_quality: field(word, layout::VI_QUALITY),
            vi_usefulness: field(word, layout::VI_USEFULNESS),
            aerosol_quantity: field(word, layout::AEROSOL_QUANTITY),
            adjacent_cloud: field(word, layout::ADJACENT_CLOUD) == 1,
            mixed_clouds: field(word, layout::MIXED_CLOUDS) == 1,
            snow_ice: field(word, layout::SNOW_ICE) == 1,
            shadow: field(word, layout::SHADOW) == 1,
        }
    }

    pub fn is_usable(&self) -> bool {
        !(matches!(self.vi_quality, CLOUDY | NOT_PRODUCED)
            || self.vi_usefulness >= LOWEST_POOR_USEFULNESS
            || self.aerosol_quantity == HIGH_AEROSOL
            || self.adjacent_cloud
            || self.mixed_clouds
            || self.snow_ice
            || self.shadow)
    }
}

/// The stored quality value as a 16-bit word, if it is one.
fn quality_word(value: f32) -> Option<u16> {
    if value.is_finite() && value.fract() == 0.0 && (0.0..=u16::MAX as f32).contains(&value) {
        Some(value as u16)
    } else {
        None
    }
}

/// Clears `ndvi` wherever the quality word is missing or unusable.
/// Returns the number of samples masked.
pub fn mask_unusable(raster: &mut Raster) -> Result<usize> {
    let quality = raster.band(band::VI_QUALITY)?.clone();
    let ndvi = raster.band_mut(band::NDVI)?;

    let mut masked = 0;
    for (value, word) in ndvi.iter_mut().zip(quality) {
        let usable = word
            .and_then(quality_word)
            .is_some_and(|w| QualityFlags::decode(w).is_usable());
        if !usable && value.is_some() {
            *value = None;
            masked += 1;
        }
    }
    debug!("Masked {} ndvi samples", masked);

    Ok(masked)
}

// -- Tests -------------------------------------------------------------------
