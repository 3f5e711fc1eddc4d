//! Fast multipole method driver.
//!
//! Binds a partitioned point-region tree, per-node expansion pairs and a
//! kernel-defining operator set into the four-pass FMM solve: zero, upward
//! (P2M, M2M), near/far dual traversal (P2P, M2L, optionally P2L/M2P in the
//! semifar regime), downward (L2L, L2P). With a communicator configured the
//! shared-node forward and backward exchanges run between the passes.

pub mod development2d;
pub mod development3d;
pub mod kernels;
pub mod profile;
pub mod semifar;
pub mod solver;

pub use development2d::Development2d;
pub use development3d::Development3d;
pub use solver::FmmSolver;
