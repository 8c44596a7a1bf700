//! Curve fitting: spike removal, baselines, bell profiles and alignment.

pub mod align;
pub mod als;
pub mod bell;
pub mod linear;
pub mod outliers;
pub mod rough;

pub use align::{align, total_variance, AlignOptions, Alignment};
pub use als::{als_smooth, baseline_als, AlsBaseline, AlsOptions};
pub use bell::{fit_baseline_plus_bell, BellFit, BellKind};
pub use linear::{linear_fit, linear_fun, offset_fit, LineParams, DEFAULT_MAX_EVALUATIONS};
pub use outliers::{purge_outliers, OutlierPurger};
pub use rough::{baseline_rough, RoughBaseline};
