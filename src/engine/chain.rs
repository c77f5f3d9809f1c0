//! Ordered filter chains with composite-mask publication.

use super::filter::{FilterConfig, FilterInstance, FilterKind};
use crate::dsp::{biquad::BiquadParams, mask::SpectralMask};
use crate::error::{Error, Result};
use std::sync::Arc;

/// Control-thread handle publishing composite masks to the audio thread.
pub type MaskWriter = triple_buffer::Input<Arc<SpectralMask>>;

/// Audio-thread handle observing the latest composite mask.
pub type MaskReader = triple_buffer::Output<Arc<SpectralMask>>;

/// Creates a connected mask writer/reader pair seeded with a unity mask.
pub fn mask_channel(size: usize) -> (MaskWriter, MaskReader) {
    triple_buffer::TripleBuffer::new(&Arc::new(SpectralMask::unity(size)))
        .split()
}

/// An ordered list of spectral filter instances plus optional
/// time-domain pass-through sections.
///
/// The chain exposes only its boundary behavior: callers mutate filter
/// slots by index, and the audible result is the pointwise product of
/// all enabled filters' masks ("composite mask"), recomputed here on the
/// control thread and atomically published to the audio thread after
/// every mutation. Individual instances never appear in the signal path.
pub struct FilterChain {
    instances: Vec<FilterInstance>,
    passthrough: Vec<BiquadParams>,

    sample_rate: f64,
    composite: SpectralMask,
    scratch: SpectralMask,

    mask_tx: MaskWriter,
}

impl FilterChain {
    pub(crate) fn new(
        mask_size: usize,
        sample_rate: f64,
        mask_tx: MaskWriter,
    ) -> Self {
        Self {
            instances: Vec::new(),
            passthrough: Vec::new(),
            sample_rate,
            composite: SpectralMask::unity(mask_size),
            scratch: SpectralMask::new(mask_size),
            mask_tx,
        }
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Appends a filter with the default configuration for `kind`,
    /// returning the new instance's index.
    pub fn add_default(&mut self, kind: FilterKind) -> usize {
        self.add(FilterConfig::default_for(kind))
    }

    /// Appends a filter with the provided configuration (clamped into
    /// range), returning the new instance's index.
    pub fn add(&mut self, config: FilterConfig) -> usize {
        self.instances.push(FilterInstance::new(config));
        self.rebuild_composite();
        self.instances.len() - 1
    }

    /// Removes and destroys the instance at `index`. Later indices shift
    /// down.
    pub fn remove(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        self.instances.remove(index);
        self.rebuild_composite();
        Ok(())
    }

    /// Moves the instance at `from` so that it sits at `to`.
    pub fn move_filter(&mut self, from: usize, to: usize) -> Result<()> {
        self.check_index(from)?;
        self.check_index(to)?;

        let instance = self.instances.remove(from);
        self.instances.insert(to, instance);
        self.rebuild_composite();
        Ok(())
    }

    /// Enables or bypasses the instance at `index`.
    pub fn set_enabled(&mut self, index: usize, enabled: bool) -> Result<()> {
        self.check_index(index)?;
        self.instances[index].enabled = enabled;
        self.rebuild_composite();
        Ok(())
    }

    /// Sets one parameter on the instance at `index`. Values outside the
    /// parameter's range are clamped, not rejected.
    pub fn set_parameter(
        &mut self,
        index: usize,
        key: &str,
        value: f64,
    ) -> Result<()> {
        self.check_index(index)?;
        self.instances[index].config.set_parameter(key, value)?;
        self.rebuild_composite();
        Ok(())
    }

    /// The instance's configuration, reflecting any clamping.
    pub fn config(&self, index: usize) -> Result<FilterConfig> {
        self.check_index(index)?;
        Ok(self.instances[index].config)
    }

    pub fn is_enabled(&self, index: usize) -> Result<bool> {
        self.check_index(index)?;
        Ok(self.instances[index].enabled)
    }

    pub fn instances(&self) -> &[FilterInstance] {
        &self.instances
    }

    /// Replaces the time-domain pass-through sections. These run ahead
    /// of the spectral stage and do not contribute to the mask.
    pub fn set_passthrough(&mut self, sections: Vec<BiquadParams>) {
        self.passthrough = sections;
    }

    pub fn passthrough(&self) -> &[BiquadParams] {
        &self.passthrough
    }

    /// The current composite mask at the chain's native size.
    pub fn composite_mask(&self) -> &SpectralMask {
        &self.composite
    }

    /// Regenerates the composite mask at an arbitrary FFT size and
    /// sample rate, for bulk offline filtering.
    #[must_use]
    pub fn composite_mask_at(
        &self,
        size: usize,
        sample_rate: f64,
    ) -> SpectralMask {
        composite_of(&self.instances, size, sample_rate)
    }

    fn rebuild_composite(&mut self) {
        self.composite.fill(1.0);

        for instance in self.instances.iter().filter(|f| f.enabled) {
            instance.config.write_mask(&mut self.scratch, self.sample_rate);
            self.composite.multiply(&self.scratch);
        }

        self.mask_tx.write(Arc::new(self.composite.clone()));
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.instances.len() {
            Ok(())
        }
        else {
            Err(Error::bad_filter_index(index))
        }
    }
}

/// The pointwise product of all enabled instances' masks.
pub(crate) fn composite_of(
    instances: &[FilterInstance],
    size: usize,
    sample_rate: f64,
) -> SpectralMask {
    let mut composite = SpectralMask::unity(size);
    let mut scratch = SpectralMask::new(size);

    for instance in instances.iter().filter(|f| f.enabled) {
        instance.config.write_mask(&mut scratch, sample_rate);
        composite.multiply(&scratch);
    }

    composite
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::within_tolerance;

    fn test_chain() -> FilterChain {
        let (tx, _rx) = mask_channel(1024);
        FilterChain::new(1024, 44_100.0, tx)
    }

    fn plateau(center: f64) -> FilterConfig {
        FilterConfig::Plateau {
            center_freq: center,
            width: 200.0,
            gain_db: 0.0,
            flat_width: 100.0,
        }
    }

    #[test]
    fn composite_is_pointwise_product() {
        let mut chain = test_chain();
        let a = plateau(500.0);
        let b = plateau(2000.0);
        chain.add(a);
        chain.add(b);

        let mut mask_a = SpectralMask::new(1024);
        let mut mask_b = SpectralMask::new(1024);
        a.write_mask(&mut mask_a, 44_100.0);
        b.write_mask(&mut mask_b, 44_100.0);

        let composite = chain.composite_mask();
        for i in 0..1024 {
            assert!(
                within_tolerance(composite[i], mask_a[i] * mask_b[i], 1e-12),
                "bin {i}"
            );
        }
    }

    #[test]
    fn disabled_instances_are_excluded() {
        let mut chain = test_chain();
        chain.add(plateau(500.0));
        let idx = chain.add(plateau(2000.0));

        chain.set_enabled(idx, false).unwrap();

        let mut expected = SpectralMask::new(1024);
        plateau(500.0).write_mask(&mut expected, 44_100.0);

        let composite = chain.composite_mask();
        for i in 0..1024 {
            assert!(within_tolerance(composite[i], expected[i], 1e-12));
        }
    }

    #[test]
    fn empty_chain_is_unity() {
        let chain = test_chain();
        assert!(chain.composite_mask().iter().all(|&x| x == 1.0));
    }

    #[test]
    fn reorder_preserves_composite() {
        let mut chain = test_chain();
        chain.add(plateau(500.0));
        chain.add(plateau(2000.0));

        let before = chain.composite_mask().clone();
        chain.move_filter(0, 1).unwrap();
        let after = chain.composite_mask();

        for i in 0..1024 {
            assert!(within_tolerance(before[i], after[i], 1e-12));
        }
    }

    #[test]
    fn bad_indices_are_rejected() {
        let mut chain = test_chain();
        chain.add_default(FilterKind::Gaussian);

        assert!(matches!(
            chain.remove(3),
            Err(Error::BadIndex { index: 3, .. })
        ));
        assert!(chain.set_enabled(1, true).is_err());
        assert!(chain.set_parameter(9, "width", 100.0).is_err());
        assert!(chain.config(1).is_err());
    }

    #[test]
    fn removal_shifts_later_indices() {
        let mut chain = test_chain();
        chain.add(plateau(500.0));
        chain.add(plateau(2000.0));
        chain.add(plateau(8000.0));

        chain.remove(0).unwrap();
        assert_eq!(chain.len(), 2);
        assert!(within_tolerance(
            chain.config(0).unwrap().center_freq(),
            2000.0,
            0.0,
        ));
        assert!(within_tolerance(
            chain.config(1).unwrap().center_freq(),
            8000.0,
            0.0,
        ));
    }

    #[test]
    fn published_mask_tracks_mutations() {
        let (tx, mut rx) = mask_channel(1024);
        let mut chain = FilterChain::new(1024, 44_100.0, tx);

        chain.add(plateau(500.0));
        let published = rx.read().clone();
        assert_eq!(published.as_ref(), chain.composite_mask());
    }
}
