//! Canonical kernel operator sets: the Newton/Coulomb potential in 3D and
//! its complex-plane counterpart in 2D. The engine itself is kernel
//! agnostic; these are the operator sets the test-suites and the demo
//! front-ends bind.

pub mod newton3d;
pub mod plane2d;
