use crate::{panoc, Box, PanocOptions, Problem, SolverStatus};
use float_cmp::assert_approx_eq;

/// Box-constrained QP, `f(x) = |x - c|^2 / 2` with the unconstrained
/// minimizer c = (2, -3) outside the box `[0, 1] x [-1, 1]`; the
/// solution saturates both bounds at (1, -1).
struct BoxQP {
    center: Vec<f64>,
    c: Box,
    d: Box,
}

impl BoxQP {
    fn new() -> Self {
        Self {
            center: vec![2.0, -3.0],
            c: Box::new(vec![0.0, -1.0], vec![1.0, 1.0]).unwrap(),
            d: Box::unbounded(0),
        }
    }
}

impl Problem for BoxQP {
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
        0.5 * x
            .iter()
            .zip(&self.center)
            .map(|(&xi, &ci)| (xi - ci) * (xi - ci))
            .sum::<f64>()
    }

    fn eval_grad_f(&self, x: &[f64], grad_fx: &mut [f64]) {
        for i in 0..x.len() {
            grad_fx[i] = x[i] - self.center[i];
        }
    }

    fn eval_g(&self, _x: &[f64], _gx: &mut [f64]) {}

    fn eval_grad_g_prod(&self, _x: &[f64], _y: &[f64], grad_gxy: &mut [f64]) {
        grad_gxy.iter_mut().for_each(|v| *v = 0.0);
    }
}

#[test]
fn box_constrained_qp() {
    let problem = BoxQP::new();
    let opt = PanocOptions::default();

    let sol = panoc(&problem, &[0.0, 0.0], &[], &[], 1e-8, 0.0, &opt, None, None).unwrap();

    assert_eq!(sol.status, SolverStatus::Converged);
    assert!(sol.iterations <= 5, "took {} iterations", sol.iterations);
    assert_approx_eq!(f64, sol.x[0], 1.0, epsilon = 1e-12);
    assert_approx_eq!(f64, sol.x[1], -1.0, epsilon = 1e-12);
}

#[test]
fn starting_at_the_solution_takes_no_step() {
    let problem = BoxQP::new();
    let opt = PanocOptions::default();

    let sol = panoc(
        &problem,
        &[1.0, -1.0],
        &[],
        &[],
        1e-8,
        0.0,
        &opt,
        None,
        None,
    )
    .unwrap();

    assert_eq!(sol.status, SolverStatus::Converged);
    assert_eq!(sol.iterations, 0);
    assert_eq!(sol.x, vec![1.0, -1.0]);
}
