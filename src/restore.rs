//! Old-photo restoration: damage detection and repair passes, clean-up
//! kernels and optional toning.

use serde::Deserialize;

use crate::buffer::{ensure_non_empty, PixelBuffer};
use crate::classify::{damage_mask, DamageKind};
use crate::error::Result;
use crate::inpaint::repair_mask;
use crate::kernels;
use crate::remap::{tint, Tint};

/// Settings for [`restore`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RestoreSettings {
    /// Repair dark, off-neutral scratch pixels.
    pub remove_scratches: bool,
    /// Repair strongly off-neutral stain pixels.
    pub remove_stains: bool,
    /// Repair crushed, blown-out or imbalanced pixels.
    pub repair_damage: bool,
    /// Median denoise pass.
    pub denoise: bool,
    /// Laplacian detail pass.
    pub enhance_details: bool,
    /// Final toning, if any.
    pub tint: Option<Tint>,
    /// Toning strength, 0 to 1.
    pub tint_strength: f32,
    /// Repair blend strength, 0 to 1.
    pub intensity: f32,
}

impl Default for RestoreSettings {
    fn default() -> Self {
        Self {
            remove_scratches: true,
            remove_stains: true,
            repair_damage: false,
            denoise: true,
            enhance_details: false,
            tint: None,
            tint_strength: 0.6,
            intensity: 0.8,
        }
    }
}

/// Pixel counts found by each repair pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Scratch pixels repaired.
    pub scratches: usize,
    /// Stain pixels repaired.
    pub stains: usize,
    /// Generic damage pixels repaired.
    pub damaged: usize,
}

impl RestoreReport {
    /// Total repaired pixels.
    #[must_use]
    pub fn total(&self) -> usize {
        self.scratches + self.stains + self.damaged
    }
}

fn repair_pass(buffer: &mut PixelBuffer, kind: DamageKind, intensity: f32) -> Result<usize> {
    let mask = damage_mask(buffer, kind);
    if mask.count() == 0 {
        return Ok(0);
    }
    repair_mask(buffer, &mask, intensity)
}

/// Run the enabled passes in order: scratches, stains, damage, denoise,
/// detail enhancement, tint. Each repair pass rescans the current buffer.
///
/// # Errors
///
/// Returns [`crate::Error::EmptyImage`] for a zero-area buffer.
pub fn restore(buffer: &mut PixelBuffer, settings: &RestoreSettings) -> Result<RestoreReport> {
    ensure_non_empty(buffer)?;
    let mut report = RestoreReport::default();

    if settings.remove_scratches {
        report.scratches = repair_pass(buffer, DamageKind::Scratch, settings.intensity)?;
    }
    if settings.remove_stains {
        report.stains = repair_pass(buffer, DamageKind::Stain, settings.intensity)?;
    }
    if settings.repair_damage {
        report.damaged = repair_pass(buffer, DamageKind::Damage, settings.intensity)?;
    }
    if settings.denoise {
        kernels::denoise(buffer, kernels::DENOISE_WEIGHT);
    }
    if settings.enhance_details {
        kernels::sharpen(buffer, kernels::SHARPEN_WEIGHT);
    }
    if let Some(tone) = settings.tint {
        tint(buffer, tone, settings.tint_strength);
    }

    tracing::debug!(
        scratches = report.scratches,
        stains = report.stains,
        damaged = report.damaged,
        "photo restored"
    );
    Ok(report)
}
