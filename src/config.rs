//! Engine configuration
//!
//! [`EngineConfig`] gathers everything [`MixingEngine::apply_config`]
//! needs: output rate, console region, TND isolation mode, enabled
//! expansions and per-chip levels. It is `serde`-serialisable so hosts can
//! keep it in their own settings files.
//!
//! [`MixingEngine::apply_config`]: crate::MixingEngine::apply_config

use crate::chip::{ChipKind, ExpansionMask};
use crate::constants::{NTSC_CLOCK_RATE, NTSC_FRAME_LENGTH, PAL_CLOCK_RATE, PAL_FRAME_LENGTH};
use crate::{NesSndError, Result};
use serde::{Deserialize, Serialize};

/// Console timing region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Region {
    /// 60 Hz 2A03
    #[default]
    Ntsc,
    /// 50 Hz 2A07
    Pal,
}

impl Region {
    /// CPU clock in Hz.
    pub const fn clock_rate(self) -> u32 {
        match self {
            Region::Ntsc => NTSC_CLOCK_RATE,
            Region::Pal => PAL_CLOCK_RATE,
        }
    }

    /// Frame length before the first dithering toggle.
    pub const fn base_frame_length(self) -> i64 {
        match self {
            Region::Ntsc => NTSC_FRAME_LENGTH,
            Region::Pal => PAL_FRAME_LENGTH,
        }
    }

    /// True for PAL.
    pub const fn is_pal(self) -> bool {
        matches!(self, Region::Pal)
    }
}

/// How the triangle, noise and DMC channels are buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TndMode {
    /// One shared TND buffer (legacy)
    #[default]
    Single,
    /// One buffer per channel so each can be muted after the non-linearity
    Separate,
    /// Separate buffers; when only DMC is enabled, triangle and noise are
    /// dropped before mixing so they do not bleed into it
    SeparateTnOnly,
}

impl TndMode {
    /// True for both separate modes.
    pub const fn is_separate(self) -> bool {
        !matches!(self, TndMode::Single)
    }
}

/// Per-chip output levels (1.0 = nominal).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChipVolumes {
    /// Base APU (also scales the non-linear TND mix)
    pub apu: f64,
    /// VRC6
    pub vrc6: f64,
    /// VRC7
    pub vrc7: f64,
    /// FDS
    pub fds: f64,
    /// MMC5
    pub mmc5: f64,
    /// Namco 163
    pub namco: f64,
    /// Sunsoft 5B
    pub sunsoft: f64,
    /// YM2413
    pub ym2413: f64,
}

impl ChipVolumes {
    /// Level of one chip.
    pub fn get(&self, kind: ChipKind) -> f64 {
        match kind {
            ChipKind::BaseApu => self.apu,
            ChipKind::Vrc6 => self.vrc6,
            ChipKind::Vrc7 => self.vrc7,
            ChipKind::Fds => self.fds,
            ChipKind::Mmc5 => self.mmc5,
            ChipKind::Namco => self.namco,
            ChipKind::Sunsoft => self.sunsoft,
            ChipKind::Ym2413 => self.ym2413,
        }
    }

    /// Set the level of one chip.
    pub fn set(&mut self, kind: ChipKind, volume: f64) {
        let slot = match kind {
            ChipKind::BaseApu => &mut self.apu,
            ChipKind::Vrc6 => &mut self.vrc6,
            ChipKind::Vrc7 => &mut self.vrc7,
            ChipKind::Fds => &mut self.fds,
            ChipKind::Mmc5 => &mut self.mmc5,
            ChipKind::Namco => &mut self.namco,
            ChipKind::Sunsoft => &mut self.sunsoft,
            ChipKind::Ym2413 => &mut self.ym2413,
        };
        *slot = volume;
    }
}

impl Default for ChipVolumes {
    fn default() -> Self {
        Self {
            apu: 1.0,
            vrc6: 1.0,
            vrc7: 1.0,
            fds: 1.0,
            mmc5: 1.0,
            namco: 1.0,
            sunsoft: 1.0,
            ym2413: 1.0,
        }
    }
}

/// Complete engine setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Console region
    pub region: Region,
    /// TND buffering mode
    pub tnd_mode: TndMode,
    /// Enabled expansion chips
    pub expansions: ExpansionMask,
    /// Per-chip levels
    pub volumes: ChipVolumes,
    /// Treble equalisation (dB) applied to every chip, if any
    pub treble_db: Option<f64>,
}

impl EngineConfig {
    /// NTSC configuration at `sample_rate`.
    pub fn ntsc(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ..Self::default()
        }
    }

    /// PAL configuration at `sample_rate`.
    pub fn pal(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            region: Region::Pal,
            ..Self::default()
        }
    }

    /// Builder: TND mode.
    pub fn with_tnd_mode(mut self, mode: TndMode) -> Self {
        self.tnd_mode = mode;
        self
    }

    /// Builder: enabled expansions.
    pub fn with_expansions(mut self, expansions: ExpansionMask) -> Self {
        self.expansions = expansions;
        self
    }

    /// Builder: level of one chip.
    pub fn with_volume(mut self, kind: ChipKind, volume: f64) -> Self {
        self.volumes.set(kind, volume);
        self
    }

    /// Builder: treble equalisation for every chip.
    pub fn with_treble(mut self, treble_db: f64) -> Self {
        self.treble_db = Some(treble_db);
        self
    }

    /// Check values before they reach the buffers.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(NesSndError::InvalidSampleRate { rate: 0 });
        }
        for kind in std::iter::once(ChipKind::BaseApu).chain(ChipKind::EXPANSIONS) {
            let v = self.volumes.get(kind);
            if !v.is_finite() || v < 0.0 {
                return Err(NesSndError::ConfigError(format!(
                    "volume for {kind} must be a finite non-negative number, got {v}"
                )));
            }
        }
        if let Some(treble) = self.treble_db {
            if !treble.is_finite() {
                return Err(NesSndError::ConfigError(format!("treble must be finite, got {treble}")));
            }
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            region: Region::Ntsc,
            tnd_mode: TndMode::Single,
            expansions: ExpansionMask::empty(),
            volumes: ChipVolumes::default(),
            treble_db: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_clocks() {
        assert_eq!(Region::Ntsc.clock_rate(), 1_789_773);
        assert_eq!(Region::Pal.clock_rate(), 1_662_607);
        assert_eq!(Region::Pal.base_frame_length(), 33_247);
    }

    #[test]
    fn test_builder() {
        let cfg = EngineConfig::pal(48_000)
            .with_tnd_mode(TndMode::Separate)
            .with_expansions(ExpansionMask::FDS)
            .with_volume(ChipKind::Fds, 0.5);
        assert_eq!(cfg.region, Region::Pal);
        assert!(cfg.tnd_mode.is_separate());
        assert_eq!(cfg.volumes.get(ChipKind::Fds), 0.5);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(EngineConfig::ntsc(0).validate().is_err());
        let cfg = EngineConfig::default().with_volume(ChipKind::Vrc6, f64::NAN);
        assert!(matches!(cfg.validate(), Err(NesSndError::ConfigError(_))));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"sample_rate": 22050, "tnd_mode": "Separate"}"#).unwrap();
        assert_eq!(cfg.sample_rate, 22_050);
        assert_eq!(cfg.tnd_mode, TndMode::Separate);
        assert_eq!(cfg.region, Region::Ntsc);
        assert_eq!(cfg.volumes, ChipVolumes::default());
    }
}
