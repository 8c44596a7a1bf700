pub mod banded;
pub mod lsq;
pub mod regions;
pub mod robust;
pub mod simplex;
pub mod stats;

pub use banded::PentadiagonalSystem;
pub use lsq::{LevenbergMarquardt, LsqFit, Model};
pub use regions::contiguous_regions;
pub use robust::{windowed_min_mad, windowed_min_std};
pub use simplex::{nelder_mead, Minimum, SimplexOptions};
pub use stats::StatsHelper;
