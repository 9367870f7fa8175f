use crate::common::{check_len, AlmOptions, AlmSolution, Box, Error, PanocOptions, SolverStatus};
use crate::math::{norm_inf, norm_sq};
use crate::panoc::panoc;
use crate::traits::{Problem, ProblemWithCounters, ProgressMonitor};
use itertools::izip;
use std::mem;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

/// Augmented Lagrangian method for NLP (nonlinear programming).
/// Minimize a function F(x) beginning from a starting point x0,
/// subject to variable bounds and general constraints kept in a box.
///
/// ```txt
///       min f(x)
///        x
/// ```
///
/// subject to
///
/// ```txt
///       xmin <= x <= xmax       (variable bounds, box C)
///       zmin <= g(x) <= zmax    (general constraints, box D)
/// ```
///
/// Each outer iteration minimizes the augmented Lagrangian for fixed
/// multipliers `y` and penalty weights `sigma` with [`panoc`], then
/// updates `y` from the sub-solver's multiplier candidate `y_hat`,
/// grows the penalty on constraints whose violation stalls, and
/// tightens the inner tolerance. Multipliers are kept inside the
/// safeguard box determined by `opt.max_multiplier`.
///
/// The solve converges when the constraint violation drops below
/// `opt.constr_tolerance` while the inner residual is at most
/// `opt.tolerance`. Running out of budgets is reported through the
/// status field of the returned [`AlmSolution`], together with the
/// iterate reached, the evaluation counters and the elapsed time.
pub fn alm(
    problem: &dyn Problem,
    x0: &[f64],
    y0: &[f64],
    opt: &AlmOptions,
    inner_opt: &PanocOptions,
    interrupt: Option<&AtomicBool>,
    progress: Option<&dyn ProgressMonitor>,
) -> Result<AlmSolution, Error> {
    opt.verify()?;
    inner_opt.verify()?;
    let n = problem.n();
    let m = problem.m();
    check_len("x0", x0, n)?;
    check_len("y0", y0, m)?;

    let start = Instant::now();
    let counted = ProblemWithCounters::new(problem);

    let mut x = x0.to_vec();
    let mut y = y0.to_vec();
    project_multipliers(&mut y, problem.box_d(), opt.max_multiplier);

    let mut sigma = vec![0.0; m];
    if m > 0 {
        if opt.initial_penalty > 0.0 {
            let s = opt.initial_penalty.clamp(opt.min_penalty, opt.max_penalty);
            sigma.iter_mut().for_each(|v| *v = s);
        } else {
            initialize_penalty(&counted, opt, &x, &mut sigma, &mut vec![0.0; m]);
        }
    }

    let mut eps = opt.initial_tolerance;
    let mut e = vec![0.0; m];
    let mut e_old = vec![0.0; m];
    let mut norm_e = 0.0;
    let mut norm_e_old = 0.0;

    let mut status = SolverStatus::MaxIter;
    let mut outer_iterations = 0;
    let mut inner_iterations = 0;
    let mut psi = f64::NAN;
    let mut grad_psi_norm = f64::NAN;
    let mut residual_norm = f64::INFINITY;

    for k in 0..opt.max_iter {
        let inner = panoc(
            &counted,
            &x,
            &y,
            &sigma,
            eps,
            opt.dual_tolerance_factor,
            inner_opt,
            interrupt,
            progress,
        )?;
        x.copy_from_slice(&inner.x);
        outer_iterations = k + 1;
        inner_iterations += inner.iterations;
        psi = inner.psi;
        grad_psi_norm = inner.grad_psi_norm;
        residual_norm = inner.residual_norm;

        for i in 0..m {
            e[i] = (inner.hat_y[i] - y[i]) / sigma[i];
        }
        norm_e = norm_inf(&e);

        if let Some(monitor) = progress {
            monitor.outer_update(k, norm_e, &sigma, eps, inner.iterations);
        }
        log::debug!(
            "outer {}: inner {} after {} iterations, residual {:.3e}, \
             constraint violation {:.3e}, tolerance {:.1e}",
            k,
            inner.status,
            inner.iterations,
            inner.residual_norm,
            norm_e,
            eps
        );

        // Budget-limited sub-solves may still close the outer
        // criterion, so the measured residual decides, not the status.
        if inner.residual_norm <= opt.tolerance && norm_e <= opt.constr_tolerance {
            status = SolverStatus::Converged;
            y.copy_from_slice(&inner.hat_y);
            break;
        }
        match inner.status {
            SolverStatus::Interrupted
            | SolverStatus::NotFinite
            | SolverStatus::InteriorStepFailed
            | SolverStatus::MaxTime => {
                status = inner.status;
                break;
            }
            _ => {}
        }

        y.copy_from_slice(&inner.hat_y);
        project_multipliers(&mut y, problem.box_d(), opt.max_multiplier);
        update_penalty(opt, k == 0, &e, &e_old, norm_e, norm_e_old, &mut sigma);
        eps = (opt.tolerance_update_factor * eps).max(opt.tolerance);
        mem::swap(&mut e, &mut e_old);
        norm_e_old = norm_e;
    }

    let f = counted.eval_f(&x);
    let evaluations = counted.counts();
    log::debug!("evaluations:\n{}", evaluations);
    Ok(AlmSolution {
        status,
        x,
        y,
        penalty: sigma,
        f,
        psi,
        grad_psi_norm,
        residual_norm,
        constr_violation: norm_e,
        outer_iterations,
        inner_iterations,
        evaluations,
        elapsed: start.elapsed(),
    })
}

/// Clamps the multipliers into the safeguard box Y(M): components of
/// constraints unbounded on one side may not push in that direction,
/// so their bound collapses to zero. Non-finite inputs are replaced by
/// zero before projecting.
fn project_multipliers(y: &mut [f64], d: &Box, max_multiplier: f64) {
    for (yi, &lb, &ub) in izip!(y.iter_mut(), &d.lower, &d.upper) {
        if !yi.is_finite() {
            *yi = 0.0;
        }
        let y_lb = if lb == f64::NEG_INFINITY {
            0.0
        } else {
            -max_multiplier
        };
        let y_ub = if ub == f64::INFINITY { 0.0 } else { max_multiplier };
        *yi = yi.clamp(y_lb, y_ub);
    }
}

/// Derives a uniform initial penalty from the scale of f and g at the
/// starting point. These evaluations are charged to the counters but
/// not to any iteration budget.
fn initialize_penalty(
    problem: &dyn Problem,
    opt: &AlmOptions,
    x0: &[f64],
    sigma: &mut [f64],
    g0: &mut [f64],
) {
    let f0 = problem.eval_f(x0);
    problem.eval_g(x0, g0);
    let s = opt.initial_penalty_factor * f0.abs().max(1.0) / (0.5 * norm_sq(g0)).max(1.0);
    let s = if s.is_finite() {
        s.clamp(opt.min_penalty, opt.max_penalty)
    } else {
        opt.min_penalty
    };
    sigma.iter_mut().for_each(|v| *v = s);
}

/// Grows the penalty weights of the constraints whose violation did
/// not shrink by `penalty_update_threshold` since the previous outer
/// iteration. Weights never shrink and stay within
/// `[min_penalty, max_penalty]`.
fn update_penalty(
    opt: &AlmOptions,
    first_iter: bool,
    e: &[f64],
    e_old: &[f64],
    norm_e: f64,
    norm_e_old: f64,
    sigma: &mut [f64],
) {
    if norm_e <= opt.constr_tolerance {
        return;
    }
    if opt.single_penalty_factor {
        if first_iter || norm_e > opt.penalty_update_threshold * norm_e_old {
            let s = (opt.penalty_update_factor * sigma[0]).min(opt.max_penalty);
            sigma.iter_mut().for_each(|v| *v = s);
        }
    } else {
        for (si, &ei, &ei_old) in izip!(sigma.iter_mut(), e, e_old) {
            if first_iter || ei.abs() > opt.penalty_update_threshold * ei_old.abs() {
                let factor = (opt.penalty_update_factor * ei.abs() / norm_e).max(1.0);
                *si = (factor * *si).min(opt.max_penalty);
            }
        }
    }
}
