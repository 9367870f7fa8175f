use crate::common::{check_len, invalid, Box, Error, PanocOptions, PanocSolution, SolverStatus};
use crate::lbfgs::Lbfgs;
use crate::math::{all_finite, dot, norm_inf, norm_inf_diff, norm_sq};
use crate::traits::{Problem, ProgressMonitor};
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// PANOC proximal gradient solver for the non-smooth sub-problem
///
/// ```txt
///       min psi(x) + I_C(x)
///        x
/// ```
///
/// where `psi` is the augmented Lagrangian of the problem for the
/// fixed multipliers `y` and penalty weights `sigma`, and `I_C` is the
/// indicator of the variable bounds. Forward-backward steps with an
/// adaptive Lipschitz estimate are combined with an L-BFGS direction
/// through a line search on the forward-backward envelope; the pure
/// proximal gradient step remains available as the safeguard.
///
/// Iterates until the fixed-point residual
/// `R(x) = (x - proj_C(x - gamma grad psi(x))) / gamma` (mixed with
/// `dual_tolerance_factor * max|y_hat - y|` when constraints are
/// present) drops to `tolerance`, or a budget runs out.
///
/// `interrupt` is sampled once per iteration; raising it makes the
/// solver return its current iterate with status `Interrupted`.
pub fn panoc(
    problem: &dyn Problem,
    x0: &[f64],
    y: &[f64],
    sigma: &[f64],
    tolerance: f64,
    dual_tolerance_factor: f64,
    opt: &PanocOptions,
    interrupt: Option<&AtomicBool>,
    progress: Option<&dyn ProgressMonitor>,
) -> Result<PanocSolution, Error> {
    opt.verify()?;
    if !(tolerance > 0.0) {
        return Err(invalid("tolerance", "must be > 0"));
    }
    if !(dual_tolerance_factor >= 0.0) {
        return Err(invalid("dual_tolerance_factor", "must be >= 0"));
    }
    let n = problem.n();
    let m = problem.m();
    check_len("x0", x0, n)?;
    check_len("y", y, m)?;
    check_len("sigma", sigma, m)?;
    check_len("box_c", &problem.box_c().lower, n)?;
    check_len("box_d", &problem.box_d().lower, m)?;
    if !sigma.iter().all(|&s| s > 0.0) {
        return Err(invalid("sigma", "penalty weights must be > 0"));
    }

    let start = Instant::now();
    let c = problem.box_c();

    // Workspace, allocated once; the iteration loop below is
    // allocation-free.
    let mut x = x0.to_vec();
    let mut x_hat = vec![0.0; n];
    let mut grad = vec![0.0; n];
    let mut p = vec![0.0; n];
    let mut dir = vec![0.0; n];
    let mut cand_x = vec![0.0; n];
    let mut cand_x_hat = vec![0.0; n];
    let mut cand_grad = vec![0.0; n];
    let mut cand_p = vec![0.0; n];
    let mut work_n = vec![0.0; n];
    let mut work_m = vec![0.0; m];
    let mut hat_y = vec![0.0; m];
    let mut lbfgs = Lbfgs::new(n, &opt.lbfgs)?;

    let mut psi = problem.eval_psi_grad_psi(&x, y, sigma, &mut grad, &mut work_n, &mut work_m);
    if !psi.is_finite() || !all_finite(&grad) {
        // Nothing sensible can be returned for a non-finite start.
        let grad_psi_norm = norm_inf(&grad);
        return Ok(PanocSolution {
            status: SolverStatus::NotFinite,
            x,
            hat_y,
            psi,
            grad_psi_norm,
            residual_norm: f64::INFINITY,
            iterations: 0,
            elapsed: start.elapsed(),
        });
    }

    let mut l = if opt.lipschitz.initial > 0.0 {
        opt.lipschitz.initial.clamp(opt.l_min, opt.l_max)
    } else {
        estimate_lipschitz(
            problem,
            &x,
            y,
            sigma,
            &grad,
            opt,
            &mut cand_x,
            &mut cand_grad,
            &mut work_n,
            &mut work_m,
        )
    };
    let mut gamma = opt.lipschitz.l_gamma_factor / l;

    forward_backward(c, &x, &grad, gamma, &mut x_hat, &mut p);
    let mut psi_hat = problem.eval_psi_hat_y(&x_hat, y, sigma, &mut hat_y);

    let mut iterations = 0;
    let mut no_progress = 0;
    let mut tau = 0.0;

    let status = 'main: loop {
        if let Some(flag) = interrupt {
            if flag.load(Ordering::Relaxed) {
                break SolverStatus::Interrupted;
            }
        }
        if let Some(budget) = opt.max_time {
            if start.elapsed() >= budget {
                break SolverStatus::MaxTime;
            }
        }
        if iterations >= opt.max_iter {
            break SolverStatus::MaxIter;
        }

        // Double L until the quadratic upper bound holds at the
        // forward-backward point.
        let mut norm_sq_p = norm_sq(&p);
        let mut grad_p = dot(&grad, &p);
        let margin = opt.quadratic_upperbound_tolerance_factor * psi.abs();
        while !(psi_hat <= psi + grad_p + 0.5 * l * norm_sq_p + margin) {
            if l >= opt.l_max {
                let failure = if psi_hat.is_finite() {
                    SolverStatus::InteriorStepFailed
                } else {
                    SolverStatus::NotFinite
                };
                break 'main failure;
            }
            l = (2.0 * l).min(opt.l_max);
            gamma = opt.lipschitz.l_gamma_factor / l;
            // Stored pairs describe the forward-backward map of the
            // old step size.
            lbfgs.reset();
            forward_backward(c, &x, &grad, gamma, &mut x_hat, &mut p);
            norm_sq_p = norm_sq(&p);
            grad_p = dot(&grad, &p);
            psi_hat = problem.eval_psi_hat_y(&x_hat, y, sigma, &mut hat_y);
        }

        // Fixed-point residual and stopping test.
        let r_norm = norm_inf(&p) / gamma;
        let r = if m > 0 && dual_tolerance_factor > 0.0 {
            r_norm.max(dual_tolerance_factor * norm_inf_diff(&hat_y, y))
        } else {
            r_norm
        };
        if let Some(monitor) = progress {
            monitor.inner_update(iterations, psi, r_norm, gamma, l, tau);
        }
        log::trace!(
            "inner {}: psi = {:.6e}, residual = {:.3e}, gamma = {:.3e}, tau = {}",
            iterations,
            psi,
            r_norm,
            gamma,
            tau
        );
        if r <= tolerance {
            break SolverStatus::Converged;
        }

        // Quasi-Newton direction from the L-BFGS history; with an
        // empty history this degenerates to the proximal gradient
        // step itself.
        lbfgs.apply(&p, &mut dir);

        // Line search on the forward-backward envelope over
        // tau in {1, 1/2, 1/4, ...}.
        let fbe = psi + grad_p + 0.5 * norm_sq_p / gamma;
        let decrease =
            opt.sufficient_decrease_factor * (1.0 - gamma * l) * norm_sq_p / (2.0 * gamma);
        tau = 1.0;
        let mut cand_psi = f64::NAN;
        let mut accepted = false;
        while tau >= opt.tau_min {
            for i in 0..n {
                cand_x[i] = x[i] + (1.0 - tau) * p[i] + tau * dir[i];
            }
            cand_psi = problem.eval_psi_grad_psi(
                &cand_x,
                y,
                sigma,
                &mut cand_grad,
                &mut work_n,
                &mut work_m,
            );
            if cand_psi.is_finite() && all_finite(&cand_grad) {
                forward_backward(c, &cand_x, &cand_grad, gamma, &mut cand_x_hat, &mut cand_p);
                let cand_fbe =
                    cand_psi + dot(&cand_grad, &cand_p) + 0.5 * norm_sq(&cand_p) / gamma;
                if cand_fbe <= fbe - decrease {
                    accepted = true;
                    break;
                }
            }
            tau *= 0.5;
        }
        if accepted {
            no_progress = 0;
        } else {
            // Fall back to the pure proximal gradient step; psi and
            // y_hat at x_hat are already known.
            tau = 0.0;
            cand_x.copy_from_slice(&x_hat);
            cand_psi = psi_hat;
            problem.eval_grad_psi_from_hat_y(&cand_x, &hat_y, &mut cand_grad, &mut work_n);
            if !all_finite(&cand_grad) {
                break SolverStatus::NotFinite;
            }
            forward_backward(c, &cand_x, &cand_grad, gamma, &mut cand_x_hat, &mut cand_p);
            no_progress += 1;
        }
        if no_progress > opt.lbfgs_failure_limit {
            lbfgs.reset();
            no_progress = 0;
        }

        // s = x_next - x and y = R(x_next) - R(x), reusing `dir`.
        for i in 0..n {
            work_n[i] = cand_x[i] - x[i];
            dir[i] = (p[i] - cand_p[i]) / gamma;
        }
        lbfgs.update(&work_n, &dir);

        mem::swap(&mut x, &mut cand_x);
        mem::swap(&mut grad, &mut cand_grad);
        mem::swap(&mut x_hat, &mut cand_x_hat);
        mem::swap(&mut p, &mut cand_p);
        psi = cand_psi;
        psi_hat = problem.eval_psi_hat_y(&x_hat, y, sigma, &mut hat_y);
        iterations += 1;
    };

    let residual_norm = norm_inf(&p) / gamma;
    problem.eval_grad_psi_from_hat_y(&x_hat, &hat_y, &mut cand_grad, &mut work_n);
    let grad_psi_norm = norm_inf(&cand_grad);
    Ok(PanocSolution {
        status,
        x: x_hat,
        hat_y,
        psi: psi_hat,
        grad_psi_norm,
        residual_norm,
        iterations,
        elapsed: start.elapsed(),
    })
}

/// `x_hat = proj_C(x - gamma grad)` and `p = x_hat - x`.
fn forward_backward(
    c: &Box,
    x: &[f64],
    grad: &[f64],
    gamma: f64,
    x_hat: &mut [f64],
    p: &mut [f64],
) {
    for i in 0..x.len() {
        let xh = (x[i] - gamma * grad[i]).clamp(c.lower[i], c.upper[i]);
        x_hat[i] = xh;
        p[i] = xh - x[i];
    }
}

/// Finite-difference estimate of the Lipschitz constant of `grad psi`
/// at `x`, clamped to `[l_min, l_max]`.
fn estimate_lipschitz(
    problem: &dyn Problem,
    x: &[f64],
    y: &[f64],
    sigma: &[f64],
    grad: &[f64],
    opt: &PanocOptions,
    x_h: &mut [f64],
    grad_h: &mut [f64],
    work_n: &mut [f64],
    work_m: &mut [f64],
) -> f64 {
    let mut norm_h_sq = 0.0;
    for i in 0..x.len() {
        let h = (x[i].abs() * opt.lipschitz.epsilon).max(opt.lipschitz.delta);
        x_h[i] = x[i] + h;
        norm_h_sq += h * h;
    }
    problem.eval_grad_psi(x_h, y, sigma, grad_h, work_n, work_m);
    let mut diff_sq = 0.0;
    for i in 0..x.len() {
        let d = grad_h[i] - grad[i];
        diff_sq += d * d;
    }
    let l = (diff_sq / norm_h_sq).sqrt();
    if l.is_finite() {
        l.clamp(opt.l_min, opt.l_max)
    } else {
        opt.l_max
    }
}
