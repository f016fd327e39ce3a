//! Compute backend trait.

use crate::error::Result;
use crate::filter::reduce::Reduction;
use crate::filter::resample::ChunkPlan;
use crate::geometry::Shape3;
use crate::interpolation::InterpolationOrder;

/// Sampling and reduction engine behind the resampler.
///
/// The backend is chosen once when the resampler is built; everything that
/// differs between host and device execution lives behind this trait.
pub trait ComputeBackend {
    /// Backend-side view of one channel of the source volume.
    type Source<'a>
    where
        Self: 'a;

    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Prepare a source channel for sampling (borrow it, or upload it).
    fn prepare<'a>(&'a self, data: &'a [f32], shape: Shape3) -> Result<Self::Source<'a>>;

    /// Sample `source` at each coordinate `(i, j, k)` into `out`.
    ///
    /// Coordinates outside the source yield `fill`.
    fn sample(
        &self,
        source: &Self::Source<'_>,
        coords: &[[f64; 3]],
        order: InterpolationOrder,
        fill: f32,
        out: &mut [f32],
    ) -> Result<()>;

    /// Reduce a single-channel volume along `axis` (0 = i, 1 = j, 2 = k).
    ///
    /// The result keeps the reduced axis with extent 1.
    fn reduce(&self, data: &[f32], shape: Shape3, reduction: Reduction, axis: usize) -> Result<Vec<f32>>;

    /// Fill `out` (one output channel) slab by slab according to `plan`.
    fn resample_into(&self, source: &Self::Source<'_>, plan: &ChunkPlan, out: &mut [f32]) -> Result<()> {
        for (slab, values) in out.chunks_mut(plan.slab_len()).enumerate() {
            plan.resample_slab(self, source, slab, values)?;
        }
        Ok(())
    }
}
