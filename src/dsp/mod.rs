//! DSP primitives: pure numeric building blocks for the groove codec.
//!
//! Every function here works over an already-resident buffer and keeps no
//! state across calls beyond the filter memory of a single pass. The same
//! code runs natively and inside the browser AudioWorklet (via WASM).

pub mod analysis;
pub mod companding;
pub mod filter;
pub mod fir;
pub mod limiter;
pub mod resample;

pub use analysis::{dominant_frequency, rms};
pub use companding::{mu_law_compress, mu_law_expand};
pub use filter::{BiquadFilter, high_shelf};
pub use fir::anti_alias_filter;
pub use limiter::{SoftLimiter, soft_limit};
pub use resample::{cubic_interpolate, lanczos3_resample, resample_cubic};
