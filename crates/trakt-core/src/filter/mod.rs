pub mod reduce;
pub mod resample;

pub use reduce::{reduce_volume, Reduction};
pub use resample::{ChunkPlan, ChunkRegion, ChunkedResampler, ResampleConfig, ResampledVolume};
