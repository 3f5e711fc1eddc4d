//! Truncated analytic expansions for fast multipole summation.
//!
//! Provides the process-wide recurrence tables (binomial coefficients,
//! spherical normalisation constants, associated Legendre polynomials,
//! spherical harmonics, Wigner rotation matrices), the 2D Laurent/Taylor
//! series with its translation operators, and the 3D spherical-harmonic
//! series with three interchangeable translation algorithms.

pub mod binomial;
pub mod buffer;
pub mod harmonic;
pub mod laurent;
pub mod legendre;
pub mod spherical;
pub mod wigner;

pub use laurent::LaurentSeries;
pub use spherical::SphericalSeries;
pub use wigner::{Wigner, WignerRepo};
