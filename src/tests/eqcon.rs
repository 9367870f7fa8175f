use crate::{alm, panoc, AlmOptions, Box, PanocOptions, Problem, ProgressMonitor, SolverStatus};
use float_cmp::assert_approx_eq;
use std::cell::RefCell;

/// Equality-constrained QP:
///
/// ```txt
///     min |x|^2 / 2   subject to   x1 + x2 = 1
/// ```
///
/// with solution x = (1/2, 1/2) and multiplier y = -1/2.
struct EqualityQP {
    c: Box,
    d: Box,
}

impl EqualityQP {
    fn new() -> Self {
        Self {
            c: Box::unbounded(2),
            d: Box::new(vec![0.0], vec![0.0]).unwrap(),
        }
    }
}

impl Problem for EqualityQP {
    fn n(&self) -> usize {
        2
    }

    fn m(&self) -> usize {
        1
    }

    fn box_c(&self) -> &Box {
        &self.c
    }

    fn box_d(&self) -> &Box {
        &self.d
    }

    fn eval_f(&self, x: &[f64]) -> f64 {
        0.5 * (x[0] * x[0] + x[1] * x[1])
    }

    fn eval_grad_f(&self, x: &[f64], grad_fx: &mut [f64]) {
        grad_fx[0] = x[0];
        grad_fx[1] = x[1];
    }

    fn eval_g(&self, x: &[f64], gx: &mut [f64]) {
        gx[0] = x[0] + x[1] - 1.0;
    }

    fn eval_grad_g_prod(&self, _x: &[f64], y: &[f64], grad_gxy: &mut [f64]) {
        grad_gxy[0] = y[0];
        grad_gxy[1] = y[0];
    }
}

/// Records the penalty weights of every outer iteration.
struct PenaltyRecorder {
    history: RefCell<Vec<Vec<f64>>>,
}

impl ProgressMonitor for PenaltyRecorder {
    fn outer_update(
        &self,
        _iteration: usize,
        _constr_violation: f64,
        penalty: &[f64],
        _tolerance: f64,
        _inner_iterations: usize,
    ) {
        self.history.borrow_mut().push(penalty.to_vec());
    }
}

fn options() -> AlmOptions {
    AlmOptions {
        initial_penalty: 1.0,
        initial_tolerance: 1e-5,
        ..AlmOptions::default()
    }
}

#[test]
fn equality_constrained_qp() {
    let problem = EqualityQP::new();
    let recorder = PenaltyRecorder {
        history: RefCell::new(Vec::new()),
    };

    let sol = alm(
        &problem,
        &[0.0, 0.0],
        &[0.0],
        &options(),
        &PanocOptions::default(),
        None,
        Some(&recorder),
    )
    .unwrap();

    assert_eq!(sol.status, SolverStatus::Converged);
    assert!(sol.outer_iterations <= 10, "took {} outer", sol.outer_iterations);
    assert_approx_eq!(f64, sol.x[0], 0.5, epsilon = 1e-6);
    assert_approx_eq!(f64, sol.x[1], 0.5, epsilon = 1e-6);
    assert_approx_eq!(f64, sol.y[0], -0.5, epsilon = 1e-6);
    assert_approx_eq!(f64, sol.f, 0.25, epsilon = 1e-6);
    // Convergence promises both stationarity and feasibility.
    assert!(sol.residual_norm <= 1e-8);
    assert!(sol.constr_violation <= 1e-8);

    // Penalty weights never shrink from one outer iteration to the next.
    let history = recorder.history.borrow();
    assert!(history.len() >= 2);
    for pair in history.windows(2) {
        for (a, b) in pair[0].iter().zip(&pair[1]) {
            assert!(b >= a, "penalty shrank from {} to {}", a, b);
        }
    }
}

#[test]
fn equality_constrained_qp_infeasible_start() {
    let problem = EqualityQP::new();
    let opt = AlmOptions {
        max_iter: 10,
        ..options()
    };

    let sol = alm(
        &problem,
        &[10.0, 10.0],
        &[0.0],
        &opt,
        &PanocOptions::default(),
        None,
        None,
    )
    .unwrap();

    assert_eq!(sol.status, SolverStatus::Converged);
    assert!(sol.constr_violation <= opt.constr_tolerance);
    assert_approx_eq!(f64, sol.x[0], 0.5, epsilon = 1e-6);
    assert_approx_eq!(f64, sol.x[1], 0.5, epsilon = 1e-6);
}

#[test]
fn automatic_initial_penalty() {
    let problem = EqualityQP::new();
    // initial_penalty = 0 derives sigma from f and g at x0.
    let sol = alm(
        &problem,
        &[0.0, 0.0],
        &[0.0],
        &AlmOptions::default(),
        &PanocOptions::default(),
        None,
        None,
    )
    .unwrap();

    assert_eq!(sol.status, SolverStatus::Converged);
    // sigma_0 = 2 max(1, |f(x0)|) / max(1, |g(x0)|^2 / 2) = 2 here,
    // and penalties only ever grow from there.
    assert!(sol.penalty[0] >= 2.0);
    assert_approx_eq!(f64, sol.x[0], 0.5, epsilon = 1e-6);
}

#[test]
fn outer_iteration_budget() {
    let problem = EqualityQP::new();
    let opt = AlmOptions {
        max_iter: 1,
        ..options()
    };

    let sol = alm(
        &problem,
        &[0.0, 0.0],
        &[0.0],
        &opt,
        &PanocOptions::default(),
        None,
        None,
    )
    .unwrap();

    assert_eq!(sol.status, SolverStatus::MaxIter);
    assert_eq!(sol.outer_iterations, 1);
    assert!(sol.constr_violation > opt.constr_tolerance);
}

#[test]
fn dual_tolerance_factor_blocks_inner_convergence() {
    let problem = EqualityQP::new();
    let opt = PanocOptions {
        max_iter: 50,
        ..PanocOptions::default()
    };

    // For fixed (y, sigma) the multiplier mismatch converges to
    // sigma * e, not to zero, so weighting it into the stopping
    // criterion leaves only the iteration budget.
    let sol = panoc(
        &problem,
        &[0.0, 0.0],
        &[0.0],
        &[1.0],
        1e-3,
        1.0,
        &opt,
        None,
        None,
    )
    .unwrap();

    assert_eq!(sol.status, SolverStatus::MaxIter);
    assert!(sol.residual_norm <= 1e-3);
    assert_approx_eq!(f64, sol.hat_y[0], -1.0 / 3.0, epsilon = 1e-2);
}

#[test]
fn non_finite_multipliers_are_zeroed() {
    let problem = EqualityQP::new();

    let sol = alm(
        &problem,
        &[0.0, 0.0],
        &[f64::NAN],
        &options(),
        &PanocOptions::default(),
        None,
        None,
    )
    .unwrap();

    // The NaN seed multiplier is replaced by 0 before the first
    // sub-solve, so the result matches the clean start.
    assert_eq!(sol.status, SolverStatus::Converged);
    assert_approx_eq!(f64, sol.y[0], -0.5, epsilon = 1e-6);
}
