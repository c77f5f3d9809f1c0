//! Post-processing: power-law cosine fades, peak normalization and the
//! clip sequencer.

use crate::error::{Error, Result};
use std::f64::consts::PI;

/// Whether the fade envelope runs before or after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FadeOrder {
    #[default]
    FadeThenNormalize,
    NormalizeThenFade,
}

/// Whether normalization considers the whole export or each clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NormalizeScope {
    #[default]
    Global,
    PerClip,
}

/// Export-time processing parameters.
#[derive(Debug, Clone, Copy)]
pub struct ExportSettings {
    pub sample_rate: u32,
    pub fade_in_ms: f64,
    pub fade_out_ms: f64,
    pub fade_in_power: f64,
    pub fade_out_power: f64,
    pub fade_order: FadeOrder,
    pub normalize_enabled: bool,
    pub normalize_target: f64,
    pub normalize_scope: NormalizeScope,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            fade_in_ms: 0.0,
            fade_out_ms: 0.0,
            fade_in_power: 1.0,
            fade_out_power: 1.0,
            fade_order: FadeOrder::default(),
            normalize_enabled: true,
            normalize_target: 1.0,
            normalize_scope: NormalizeScope::default(),
        }
    }
}

impl ExportSettings {
    /// Validates the closed-set and positivity constraints. Numeric
    /// range violations that can be clamped are not errors elsewhere in
    /// the crate, but these fields have no meaningful clamp.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.sample_rate, 44_100 | 48_000) {
            return Err(Error::BadParameter(format!(
                "unsupported sample rate {}",
                self.sample_rate
            )));
        }
        if self.fade_in_power <= 0.0 || self.fade_out_power <= 0.0 {
            return Err(Error::BadParameter(
                "fade powers must be positive".into(),
            ));
        }
        if !(self.normalize_target > 0.0 && self.normalize_target <= 1.0) {
            return Err(Error::BadParameter(
                "normalize target must be in (0, 1]".into(),
            ));
        }
        Ok(())
    }

    fn fade_in_samples(&self) -> usize {
        ms_to_samples(self.fade_in_ms, self.sample_rate)
    }

    fn fade_out_samples(&self) -> usize {
        ms_to_samples(self.fade_out_ms, self.sample_rate)
    }
}

/// The layout of a multi-clip export.
#[derive(Debug, Clone, Copy)]
pub struct ClipPlan {
    pub clip_count: usize,
    pub clip_duration_ms: f64,
    pub inter_clip_silence_ms: f64,
    pub silence_enabled: bool,
    pub final_silence_enabled: bool,
}

impl ClipPlan {
    pub fn clip_samples(&self, sample_rate: u32) -> usize {
        ms_to_samples(self.clip_duration_ms, sample_rate)
    }

    pub fn silence_samples(&self, sample_rate: u32) -> usize {
        ms_to_samples(self.inter_clip_silence_ms, sample_rate)
    }

    /// Total length of the sequenced export: all clips, the silence
    /// between them, and optionally one final silence block.
    pub fn total_samples(&self, sample_rate: u32) -> usize {
        let clips = self.clip_count * self.clip_samples(sample_rate);
        if !self.silence_enabled || self.clip_count == 0 {
            return clips;
        }

        let silence_blocks =
            self.clip_count - 1 + usize::from(self.final_silence_enabled);
        clips + silence_blocks * self.silence_samples(sample_rate)
    }
}

pub fn ms_to_samples(ms: f64, sample_rate: u32) -> usize {
    (ms * f64::from(sample_rate) / 1000.0).floor().max(0.0) as usize
}

/// The power-law cosine fade envelope value for sample `i` of `len`.
/// Fade lengths are in samples; zero lengths disable the respective
/// fade, making the envelope the identity.
pub fn fade_envelope(
    i: usize,
    len: usize,
    fade_in: usize,
    fade_out: usize,
    power_in: f64,
    power_out: f64,
) -> f64 {
    if fade_in > 0 && i < fade_in {
        let t = i as f64 / fade_in as f64;
        return (0.5 * (1.0 - (PI * t).cos())).powf(power_in);
    }

    if fade_out > 0 && i >= len - fade_out.min(len) {
        let t = (len - 1 - i) as f64 / fade_out as f64;
        return (0.5 * (1.0 - (PI * t).cos())).powf(power_out);
    }

    1.0
}

/// Applies the fade envelope in place. When the combined fade lengths
/// meet or exceed the buffer, both are rescaled by `(len - 1) /
/// (fade_in + fade_out)` so they still fit.
pub fn apply_fades(
    buffer: &mut [f64],
    fade_in: usize,
    fade_out: usize,
    power_in: f64,
    power_out: f64,
) {
    let len = buffer.len();
    if len == 0 || (fade_in == 0 && fade_out == 0) {
        return;
    }

    let (fade_in, fade_out) = if fade_in + fade_out >= len {
        let scale = (len - 1) as f64 / (fade_in + fade_out) as f64;
        (
            (fade_in as f64 * scale) as usize,
            (fade_out as f64 * scale) as usize,
        )
    }
    else {
        (fade_in, fade_out)
    };

    for i in 0..fade_in.min(len) {
        buffer[i] *= fade_envelope(i, len, fade_in, fade_out, power_in, power_out);
    }
    for i in len.saturating_sub(fade_out)..len {
        buffer[i] *= fade_envelope(i, len, fade_in, fade_out, power_in, power_out);
    }
}

/// The largest absolute sample value.
pub fn peak(buffer: &[f64]) -> f64 {
    buffer.iter().fold(0.0, |m, &x| m.max(x.abs()))
}

/// Scales the buffer so its peak is exactly `target`. All-zero buffers
/// pass through unchanged.
pub fn normalize_peak(buffer: &mut [f64], target: f64) {
    let max = peak(buffer);
    if max == 0.0 {
        return;
    }

    let scale = target / max;
    buffer.iter_mut().for_each(|x| *x *= scale);
}

/// Concatenates clips with inter-clip silence per the plan.
pub fn sequence_clips(
    clips: &[Vec<f64>],
    plan: &ClipPlan,
    sample_rate: u32,
) -> Vec<f64> {
    let silence = if plan.silence_enabled {
        plan.silence_samples(sample_rate)
    }
    else {
        0
    };

    let mut out = Vec::with_capacity(plan.total_samples(sample_rate));

    for (index, clip) in clips.iter().enumerate() {
        out.extend_from_slice(clip);

        let is_last = index + 1 == clips.len();
        if silence > 0 && (!is_last || plan.final_silence_enabled) {
            out.resize(out.len() + silence, 0.0);
        }
    }

    out
}

/// The full post-processing pipeline over rendered clips: per-clip
/// normalization (when scoped so), sequencing, then fades and global
/// normalization in the configured order over the assembled signal.
pub fn post_process(
    mut clips: Vec<Vec<f64>>,
    plan: &ClipPlan,
    settings: &ExportSettings,
) -> Result<Vec<f64>> {
    settings.validate()?;

    let per_clip = settings.normalize_enabled
        && settings.normalize_scope == NormalizeScope::PerClip;
    if per_clip {
        for clip in &mut clips {
            normalize_peak(clip, settings.normalize_target);
        }
    }

    let mut out = sequence_clips(&clips, plan, settings.sample_rate);

    let fade_in = settings.fade_in_samples();
    let fade_out = settings.fade_out_samples();
    let global = settings.normalize_enabled
        && settings.normalize_scope == NormalizeScope::Global;

    match settings.fade_order {
        FadeOrder::FadeThenNormalize => {
            apply_fades(
                &mut out,
                fade_in,
                fade_out,
                settings.fade_in_power,
                settings.fade_out_power,
            );
            if global {
                normalize_peak(&mut out, settings.normalize_target);
            }
        }
        FadeOrder::NormalizeThenFade => {
            if global {
                normalize_peak(&mut out, settings.normalize_target);
            }
            apply_fades(
                &mut out,
                fade_in,
                fade_out,
                settings.fade_in_power,
                settings.fade_out_power,
            );
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::within_tolerance;

    fn five_clip_plan() -> ClipPlan {
        ClipPlan {
            clip_count: 5,
            clip_duration_ms: 2000.0,
            inter_clip_silence_ms: 500.0,
            silence_enabled: true,
            final_silence_enabled: true,
        }
    }

    #[test]
    fn zero_length_fades_are_identity() {
        for i in 0..100 {
            assert!(within_tolerance(
                fade_envelope(i, 100, 0, 0, 2.0, 2.0),
                1.0,
                0.0,
            ));
        }
    }

    #[test]
    fn fade_endpoints_reach_zero_and_one() {
        let len = 1000;
        assert!(within_tolerance(
            fade_envelope(0, len, 100, 100, 1.0, 1.0),
            0.0,
            1e-12,
        ));
        assert!(within_tolerance(
            fade_envelope(len - 1, len, 100, 100, 1.0, 1.0),
            0.0,
            1e-12,
        ));
        assert!(within_tolerance(
            fade_envelope(len / 2, len, 100, 100, 1.0, 1.0),
            1.0,
            0.0,
        ));
    }

    #[test]
    fn higher_powers_tighten_the_fade() {
        let gentle = fade_envelope(25, 1000, 100, 0, 1.0, 1.0);
        let steep = fade_envelope(25, 1000, 100, 0, 3.0, 1.0);
        assert!(steep < gentle);
    }

    #[test]
    fn oversized_fades_are_rescaled() {
        let mut buffer = vec![1.0; 100];
        apply_fades(&mut buffer, 80, 80, 1.0, 1.0);

        // both fades were shrunk to fit; nothing is left untouched and
        // the edges still reach silence
        assert!(within_tolerance(buffer[0], 0.0, 1e-12));
        assert!(within_tolerance(buffer[99], 0.0, 1e-12));
        assert!(buffer.iter().all(|&x| (0.0..=1.0).contains(&x)));
    }

    #[test]
    fn normalization_hits_the_target_exactly() {
        let mut buffer = vec![0.1, -0.4, 0.25];
        normalize_peak(&mut buffer, 0.5);
        assert!(within_tolerance(peak(&buffer), 0.5, 0.0));

        let mut silent = vec![0.0; 16];
        normalize_peak(&mut silent, 0.5);
        assert!(silent.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn clip_plan_arithmetic() {
        let plan = five_clip_plan();
        // five 2 s clips and five 0.5 s silence blocks at 44.1 kHz
        assert_eq!(plan.total_samples(44_100), 5 * 88_200 + 5 * 22_050);

        let no_final = ClipPlan { final_silence_enabled: false, ..plan };
        assert_eq!(no_final.total_samples(44_100), 5 * 88_200 + 4 * 22_050);

        let no_silence = ClipPlan { silence_enabled: false, ..plan };
        assert_eq!(no_silence.total_samples(44_100), 5 * 88_200);
    }

    #[test]
    fn sequenced_export_matches_the_plan() {
        let plan = five_clip_plan();
        let settings = ExportSettings {
            fade_in_ms: 100.0,
            fade_out_ms: 100.0,
            normalize_target: 0.5,
            ..ExportSettings::default()
        };

        let clips: Vec<Vec<f64>> = (0..plan.clip_count)
            .map(|i| vec![0.8 - i as f64 * 0.1; plan.clip_samples(44_100)])
            .collect();

        let out = post_process(clips, &plan, &settings).unwrap();
        assert_eq!(out.len(), 551_250);

        // fade-in covers the first 4410 samples, rising from zero
        assert!(within_tolerance(out[0], 0.0, 1e-12));
        assert!(out[1000] < out[4000]);

        // the final silence block stays silent
        assert!(out[out.len() - 22_050..].iter().all(|&x| x == 0.0));

        // global fade-then-normalize lands the peak exactly on target
        assert!(within_tolerance(peak(&out), 0.5, 1e-12));
    }

    #[test]
    fn per_clip_normalization_equalises_clips() {
        let plan = ClipPlan {
            clip_count: 2,
            clip_duration_ms: 10.0,
            inter_clip_silence_ms: 0.0,
            silence_enabled: false,
            final_silence_enabled: false,
        };
        let settings = ExportSettings {
            normalize_scope: NormalizeScope::PerClip,
            normalize_target: 0.25,
            ..ExportSettings::default()
        };

        let loud = vec![0.9; plan.clip_samples(44_100)];
        let quiet = vec![0.01; plan.clip_samples(44_100)];

        let out = post_process(vec![loud, quiet], &plan, &settings).unwrap();
        let n = plan.clip_samples(44_100);
        assert!(within_tolerance(peak(&out[..n]), 0.25, 1e-12));
        assert!(within_tolerance(peak(&out[n..]), 0.25, 1e-12));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let mut settings = ExportSettings::default();
        settings.sample_rate = 22_050;
        assert!(settings.validate().is_err());

        let mut settings = ExportSettings::default();
        settings.fade_in_power = 0.0;
        assert!(settings.validate().is_err());

        let mut settings = ExportSettings::default();
        settings.normalize_target = 1.5;
        assert!(settings.validate().is_err());
    }
}
