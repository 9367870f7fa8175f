//! This crate solves non-linear programming problems (NLPs) of the form
//!
//! ```txt
//!       min f(x)
//!        x
//! ```
//!
//! subject to
//!
//! ```txt
//!       xmin <= x <= xmax       (variable bounds, box C)
//!       zmin <= g(x) <= zmax    (general constraints, box D)
//! ```
//!
//! using an augmented Lagrangian method (ALM) in the outer loop and the
//! PANOC proximal gradient algorithm with L-BFGS acceleration in the
//! inner loop. The method is first-order and matrix-free: the caller
//! supplies `f`, `∇f`, `g` and the product `∇g(x)ᵀy`, and the solver
//! only ever touches dense vectors.
//!
//! We request that publications derived from the use of this crate
//! acknowledge the PANOC algorithm by citing the following 2017 paper.
//!
//! >   L. Stella, A. Themelis, P. Sopasakis, P. Patrinos, "A simple and
//!     efficient algorithm for nonlinear model predictive control,"
//!     *2017 IEEE 56th Annual Conference on Decision and Control (CDC)*.
//!     doi: [10.1109/CDC.2017.8263933](https://doi.org/10.1109/CDC.2017.8263933)

mod alm;
mod common;
mod lbfgs;
mod math;
mod panoc;
#[cfg(test)]
mod tests;
mod traits;

pub use alm::alm;
pub use common::*;
pub use lbfgs::Lbfgs;
pub use panoc::panoc;
pub use traits::*;
