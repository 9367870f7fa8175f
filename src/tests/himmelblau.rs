use crate::{panoc, Box, PanocOptions, Problem, SolverStatus};
use float_cmp::assert_approx_eq;

/// Himmelblau's function restricted to a box that cuts off all four
/// unconstrained minima:
///
/// ```txt
///     f(x) = (x1^2 + x2 - 11)^2 + (x1 + x2^2 - 7)^2
/// ```
///
/// on `[-1, 4] x [-1, 1.8]`. The constrained minimizer sits on the
/// upper bound of `x2`, at roughly (3.05220, 1.8).
struct Himmelblau {
    c: Box,
    d: Box,
}

impl Himmelblau {
    fn new() -> Self {
        Self {
            c: Box::new(vec![-1.0, -1.0], vec![4.0, 1.8]).unwrap(),
            d: Box::unbounded(0),
        }
    }
}

impl Problem for Himmelblau {
    fn n(&self) -> usize {
        2
    }

    fn m(&self) -> usize {
        0
    }

    fn box_c(&self) -> &Box {
        &self.c
    }

    fn box_d(&self) -> &Box {
        &self.d
    }

    fn eval_f(&self, x: &[f64]) -> f64 {
        (x[0] * x[0] + x[1] - 11.0).powi(2) + (x[0] + x[1] * x[1] - 7.0).powi(2)
    }

    fn eval_grad_f(&self, x: &[f64], grad_fx: &mut [f64]) {
        grad_fx[0] =
            2.0 * (2.0 * x[0] * (x[0] * x[0] + x[1] - 11.0) + x[0] + x[1] * x[1] - 7.0);
        grad_fx[1] =
            2.0 * (x[0] * x[0] + 2.0 * x[1] * (x[0] + x[1] * x[1] - 7.0) + x[1] - 11.0);
    }

    fn eval_g(&self, _x: &[f64], _gx: &mut [f64]) {}

    fn eval_grad_g_prod(&self, _x: &[f64], _y: &[f64], grad_gxy: &mut [f64]) {
        grad_gxy.iter_mut().for_each(|v| *v = 0.0);
    }
}

#[test]
fn box_constrained_himmelblau() {
    let problem = Himmelblau::new();
    let opt = PanocOptions::default();

    let sol = panoc(&problem, &[0.0, 0.0], &[], &[], 1e-6, 0.0, &opt, None, None).unwrap();

    assert_eq!(sol.status, SolverStatus::Converged);
    assert!(sol.residual_norm <= 1e-6);
    assert!(problem.box_c().contains(&sol.x));
    assert_approx_eq!(f64, sol.x[0], 3.05220, epsilon = 1e-3);
    assert_approx_eq!(f64, sol.x[1], 1.8, epsilon = 1e-9);
    assert_approx_eq!(f64, sol.psi, 0.514413, epsilon = 1e-4);
}
