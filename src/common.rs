use crate::traits::EvalCounter;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors reported before or during a solve.
///
/// Only programmer errors surface as `Err`: bad parameters, mismatched
/// buffer lengths and missing problem capabilities. Running out of an
/// iteration or time budget is a normal termination and is reported in
/// [`SolverStatus`] instead.
#[derive(Debug, Error)]
pub enum Error {
    /// A solver or problem parameter lies outside its documented domain.
    #[error("invalid argument `{field}`: {reason}")]
    InvalidArgument {
        field: &'static str,
        reason: String,
    },
    /// The problem does not supply an optional evaluation.
    #[error("`{0}` is not implemented by this problem")]
    NotImplemented(&'static str),
    /// A vector argument has the wrong length for this problem.
    #[error("dimension mismatch for `{name}`: expected {expected}, got {actual}")]
    DimensionMismatch {
        name: &'static str,
        expected: usize,
        actual: usize,
    },
}

pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Error {
    Error::InvalidArgument {
        field,
        reason: reason.into(),
    }
}

pub(crate) fn check_len(name: &'static str, v: &[f64], expected: usize) -> Result<(), Error> {
    if v.len() == expected {
        Ok(())
    } else {
        Err(Error::DimensionMismatch {
            name,
            expected,
            actual: v.len(),
        })
    }
}

/// Termination status of a solve.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SolverStatus {
    /// The stopping criterion dropped below the requested tolerance.
    Converged,
    /// The iteration budget ran out.
    MaxIter,
    /// The wall-clock budget ran out.
    MaxTime,
    /// An evaluation produced NaN or an infinity.
    NotFinite,
    /// The caller raised the interrupt flag.
    Interrupted,
    /// The quadratic upper bound failed even at the largest permitted
    /// Lipschitz estimate.
    InteriorStepFailed,
}

impl fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SolverStatus::Converged => "converged",
            SolverStatus::MaxIter => "max-iter",
            SolverStatus::MaxTime => "max-time",
            SolverStatus::NotFinite => "not-finite",
            SolverStatus::Interrupted => "interrupted",
            SolverStatus::InteriorStepFailed => "interior-step-failed",
        })
    }
}

/// Axis-aligned box `{ v : lower <= v <= upper }` componentwise.
///
/// `lower[i] <= upper[i]` must hold for every component; infinities
/// express one-sided or absent bounds. [`Box::new`] checks the
/// invariant, rejecting NaN bounds.
#[derive(Clone, Debug)]
pub struct Box {
    /// Lower bounds, `-inf` for unbounded below.
    pub lower: Vec<f64>,
    /// Upper bounds, `inf` for unbounded above.
    pub upper: Vec<f64>,
}

impl Box {
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self, Error> {
        if lower.len() != upper.len() {
            return Err(Error::DimensionMismatch {
                name: "upper",
                expected: lower.len(),
                actual: upper.len(),
            });
        }
        for (i, (&l, &u)) in lower.iter().zip(&upper).enumerate() {
            if !(l <= u) {
                return Err(invalid(
                    "lower/upper",
                    format!("lower[{}] = {} must not exceed upper[{}] = {}", i, l, i, u),
                ));
            }
        }
        Ok(Self { lower, upper })
    }

    /// A box with no bounds in any of the `d` dimensions.
    pub fn unbounded(d: usize) -> Self {
        Self {
            lower: vec![f64::NEG_INFINITY; d],
            upper: vec![f64::INFINITY; d],
        }
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    /// Euclidean projection onto the box: `out[i] = clamp(v[i])`.
    pub fn project(&self, v: &[f64], out: &mut [f64]) {
        for i in 0..v.len() {
            out[i] = v[i].clamp(self.lower[i], self.upper[i]);
        }
    }

    /// `out = v - project(v)`, the offset of `v` from the box.
    pub fn projecting_difference(&self, v: &[f64], out: &mut [f64]) {
        for i in 0..v.len() {
            out[i] = v[i] - v[i].clamp(self.lower[i], self.upper[i]);
        }
    }

    pub fn contains(&self, v: &[f64]) -> bool {
        v.iter()
            .zip(&self.lower)
            .zip(&self.upper)
            .all(|((&vi, &l), &u)| l <= vi && vi <= u)
    }
}

/// Estimation of the Lipschitz constant of `∇ψ`.
#[derive(Clone, Debug)]
pub struct LipschitzOptions {
    /// Initial estimate `L_0`. Set to zero to estimate it from a finite
    /// difference of `∇ψ` at the starting point.
    pub initial: f64,
    /// Relative perturbation used by the finite-difference estimate.
    pub epsilon: f64,
    /// Smallest absolute perturbation of a component.
    pub delta: f64,
    /// Step size factor `alpha`: the proximal step is `gamma = alpha / L`.
    pub l_gamma_factor: f64,
}

impl Default for LipschitzOptions {
    fn default() -> Self {
        Self {
            initial: 0.0,
            epsilon: 1e-6,
            delta: 1e-12,
            l_gamma_factor: 0.95,
        }
    }
}

impl LipschitzOptions {
    pub fn verify(&self) -> Result<(), Error> {
        if self.initial < 0.0 || !self.initial.is_finite() {
            return Err(invalid("lipschitz.initial", "must be finite and >= 0"));
        }
        if !(self.epsilon > 0.0) {
            return Err(invalid("lipschitz.epsilon", "must be > 0"));
        }
        if !(self.delta > 0.0) {
            return Err(invalid("lipschitz.delta", "must be > 0"));
        }
        if !(self.l_gamma_factor > 0.0 && self.l_gamma_factor < 1.0) {
            return Err(invalid("lipschitz.l_gamma_factor", "must be in (0, 1)"));
        }
        Ok(())
    }
}

/// Options for the L-BFGS accelerator.
#[derive(Clone, Debug)]
pub struct LbfgsOptions {
    /// Number of (s, y) pairs kept in the history.
    pub memory: usize,
    /// Pairs with `s'y <= threshold * |s| * |y|` are rejected to keep the
    /// implicit Hessian approximation positive definite.
    pub curvature_threshold: f64,
}

impl Default for LbfgsOptions {
    fn default() -> Self {
        Self {
            memory: 10,
            curvature_threshold: 1e-10,
        }
    }
}

impl LbfgsOptions {
    pub fn verify(&self) -> Result<(), Error> {
        if self.memory == 0 {
            return Err(invalid("lbfgs.memory", "must be at least 1"));
        }
        if !(self.curvature_threshold >= 0.0) {
            return Err(invalid("lbfgs.curvature_threshold", "must be >= 0"));
        }
        Ok(())
    }
}

/// Options for the PANOC inner solver.
#[derive(Clone, Debug)]
pub struct PanocOptions {
    /// Maximum number of inner iterations.
    pub max_iter: usize,
    /// Wall-clock budget; `None` disables the check.
    pub max_time: Option<Duration>,
    /// Smallest line search parameter tried before falling back to the
    /// proximal gradient step.
    pub tau_min: f64,
    /// Lower clamp for the Lipschitz estimate.
    pub l_min: f64,
    /// Upper clamp for the Lipschitz estimate.
    pub l_max: f64,
    /// Lipschitz estimation and step size selection.
    pub lipschitz: LipschitzOptions,
    /// Fraction of the guaranteed envelope decrease a line search
    /// candidate must achieve to be accepted.
    pub sufficient_decrease_factor: f64,
    /// Relative slack on the quadratic upper bound test, scaled by `|psi|`.
    pub quadratic_upperbound_tolerance_factor: f64,
    /// L-BFGS history and curvature test.
    pub lbfgs: LbfgsOptions,
    /// Number of consecutive pure proximal gradient steps tolerated
    /// before the L-BFGS history is dropped.
    pub lbfgs_failure_limit: usize,
}

impl Default for PanocOptions {
    fn default() -> Self {
        Self {
            max_iter: 500,
            max_time: None,
            tau_min: 1.0 / 256.0,
            l_min: 1e-10,
            l_max: 1e20,
            lipschitz: LipschitzOptions::default(),
            sufficient_decrease_factor: 0.1,
            quadratic_upperbound_tolerance_factor: 1e-14,
            lbfgs: LbfgsOptions::default(),
            lbfgs_failure_limit: 1,
        }
    }
}

impl PanocOptions {
    pub fn verify(&self) -> Result<(), Error> {
        if self.max_iter == 0 {
            return Err(invalid("max_iter", "must be at least 1"));
        }
        if let Some(t) = self.max_time {
            if t.is_zero() {
                return Err(invalid("max_time", "must be > 0"));
            }
        }
        if !(self.tau_min > 0.0 && self.tau_min < 1.0) {
            return Err(invalid("tau_min", "must be in (0, 1)"));
        }
        if !(self.l_min > 0.0) {
            return Err(invalid("l_min", "must be > 0"));
        }
        if !(self.l_max >= self.l_min) {
            return Err(invalid("l_max", "must be at least l_min"));
        }
        if !(self.sufficient_decrease_factor > 0.0 && self.sufficient_decrease_factor < 1.0) {
            return Err(invalid("sufficient_decrease_factor", "must be in (0, 1)"));
        }
        if !(self.quadratic_upperbound_tolerance_factor >= 0.0) {
            return Err(invalid(
                "quadratic_upperbound_tolerance_factor",
                "must be >= 0",
            ));
        }
        self.lipschitz.verify()?;
        self.lbfgs.verify()?;
        Ok(())
    }
}

/// Options for the ALM outer driver.
#[derive(Clone, Debug)]
pub struct AlmOptions {
    /// Final inner tolerance on the fixed-point residual.
    pub tolerance: f64,
    /// Inner tolerance of the first sub-problem.
    pub initial_tolerance: f64,
    /// Shrink factor `rho` applied to the inner tolerance every outer
    /// iteration, down to `tolerance`.
    pub tolerance_update_factor: f64,
    /// Termination tolerance `delta` on the constraint violation.
    pub constr_tolerance: f64,
    /// Weight of the multiplier mismatch `|y_hat - y|` in the inner
    /// stopping criterion. Zero leaves the criterion purely primal.
    pub dual_tolerance_factor: f64,
    /// Maximum number of outer iterations.
    pub max_iter: usize,
    /// Penalty growth factor `Delta`.
    pub penalty_update_factor: f64,
    /// A component's penalty grows unless its violation shrank by this
    /// factor `theta` since the previous outer iteration.
    pub penalty_update_threshold: f64,
    /// Initial penalty `Sigma_0`. Set to zero to derive it from f and g
    /// at the starting point.
    pub initial_penalty: f64,
    /// Scale factor `sigma_0` of the derived initial penalty.
    pub initial_penalty_factor: f64,
    /// Lower clamp for the penalty weights.
    pub min_penalty: f64,
    /// Upper clamp for the penalty weights.
    pub max_penalty: f64,
    /// Safeguard bound `M` on the Lagrange multipliers of constraints
    /// that are bounded on the corresponding side.
    pub max_multiplier: f64,
    /// Grow all penalty components by the same factor instead of
    /// per-constraint factors.
    pub single_penalty_factor: bool,
}

impl Default for AlmOptions {
    fn default() -> Self {
        Self {
            tolerance: 1e-8,
            initial_tolerance: 1.0,
            tolerance_update_factor: 0.1,
            constr_tolerance: 1e-8,
            dual_tolerance_factor: 0.0,
            max_iter: 20,
            penalty_update_factor: 10.0,
            penalty_update_threshold: 0.25,
            initial_penalty: 0.0,
            initial_penalty_factor: 2.0,
            min_penalty: 1e-10,
            max_penalty: 1e9,
            max_multiplier: 1e9,
            single_penalty_factor: false,
        }
    }
}

impl AlmOptions {
    pub fn verify(&self) -> Result<(), Error> {
        if !(self.tolerance > 0.0) {
            return Err(invalid("tolerance", "must be > 0"));
        }
        if !(self.initial_tolerance > 0.0) {
            return Err(invalid("initial_tolerance", "must be > 0"));
        }
        if !(self.tolerance_update_factor > 0.0 && self.tolerance_update_factor < 1.0) {
            return Err(invalid("tolerance_update_factor", "must be in (0, 1)"));
        }
        if !(self.constr_tolerance > 0.0) {
            return Err(invalid("constr_tolerance", "must be > 0"));
        }
        if !(self.dual_tolerance_factor >= 0.0) {
            return Err(invalid("dual_tolerance_factor", "must be >= 0"));
        }
        if self.max_iter == 0 {
            return Err(invalid("max_iter", "must be at least 1"));
        }
        if !(self.penalty_update_factor > 1.0) {
            return Err(invalid("penalty_update_factor", "must be > 1"));
        }
        if !(self.penalty_update_threshold > 0.0 && self.penalty_update_threshold < 1.0) {
            return Err(invalid("penalty_update_threshold", "must be in (0, 1)"));
        }
        if !(self.initial_penalty >= 0.0) {
            return Err(invalid("initial_penalty", "must be >= 0"));
        }
        if !(self.initial_penalty_factor > 0.0) {
            return Err(invalid("initial_penalty_factor", "must be > 0"));
        }
        if !(self.min_penalty > 0.0) {
            return Err(invalid("min_penalty", "must be > 0"));
        }
        if !(self.max_penalty >= self.min_penalty) {
            return Err(invalid("max_penalty", "must be at least min_penalty"));
        }
        if !(self.max_multiplier > 0.0) {
            return Err(invalid("max_multiplier", "must be > 0"));
        }
        Ok(())
    }
}

/// Result of one PANOC sub-solve.
#[derive(Clone, Debug)]
pub struct PanocSolution {
    pub status: SolverStatus,
    /// Final iterate, projected onto the box C.
    pub x: Vec<f64>,
    /// Candidate Lagrange multipliers `y_hat` at `x`.
    pub hat_y: Vec<f64>,
    /// `psi(x)`.
    pub psi: f64,
    /// `max |grad psi(x)|`.
    pub grad_psi_norm: f64,
    /// Infinity norm of the fixed-point residual at the last iterate.
    pub residual_norm: f64,
    pub iterations: usize,
    pub elapsed: Duration,
}

/// Result of an ALM solve.
#[derive(Clone, Debug)]
pub struct AlmSolution {
    pub status: SolverStatus,
    /// Primal solution.
    pub x: Vec<f64>,
    /// Lagrange multipliers on the general constraints.
    pub y: Vec<f64>,
    /// Final penalty weights.
    pub penalty: Vec<f64>,
    /// Objective value `f(x)`.
    pub f: f64,
    /// Augmented Lagrangian value `psi(x)` of the last sub-problem.
    pub psi: f64,
    /// `max |grad psi(x)|` of the last sub-problem.
    pub grad_psi_norm: f64,
    /// Fixed-point residual of the last sub-solve.
    pub residual_norm: f64,
    /// `max |e|`, the infinity norm of the constraint violation.
    pub constr_violation: f64,
    pub outer_iterations: usize,
    /// Inner iterations summed over all sub-solves.
    pub inner_iterations: usize,
    /// Tally of problem evaluations, including those spent on penalty
    /// initialisation and Lipschitz estimation.
    pub evaluations: EvalCounter,
    pub elapsed: Duration,
}
