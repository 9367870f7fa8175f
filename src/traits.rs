use crate::common::{Box, Error};
use itertools::izip;
use std::cell::RefCell;
use std::fmt;
use std::time::{Duration, Instant};

/// What a [`Problem`] supplies beyond the required evaluations.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Capability {
    /// Only the four required evaluations; the composite evaluations
    /// fall back to their default compositions.
    Basic,
    /// The problem overrides one or more composite evaluations with
    /// specialised implementations.
    Composite,
    /// Hessian-of-the-Lagrangian operators are available as well.
    SecondOrder,
}

/// Description of a minimization problem
///
/// ```txt
///       min f(x)      subject to  x in C,  g(x) in D
/// ```
///
/// with axis-aligned boxes `C` and `D`. The four basic evaluations
/// `f`, `grad f`, `g` and `grad g(x)' y` are required; everything else
/// has a default composition or reports [`Error::NotImplemented`].
///
/// Evaluations must be deterministic, and output buffers are always
/// distinct from input buffers (the solvers guarantee they pass
/// separate allocations).
pub trait Problem {
    /// Number of decision variables, the dimension of `x`.
    fn n(&self) -> usize;
    /// Number of general constraints, the dimension of `g(x)`.
    fn m(&self) -> usize;
    /// Bounds on the decision variables.
    fn box_c(&self) -> &Box;
    /// Bounds on the general constraints.
    fn box_d(&self) -> &Box;

    fn capability(&self) -> Capability {
        Capability::Basic
    }

    /// Evaluates the cost `f(x)`.
    fn eval_f(&self, x: &[f64]) -> f64;
    /// Evaluates the cost gradient into `grad_fx` (length n).
    fn eval_grad_f(&self, x: &[f64], grad_fx: &mut [f64]);
    /// Evaluates the constraints into `gx` (length m).
    fn eval_g(&self, x: &[f64], gx: &mut [f64]);
    /// Evaluates the product `grad g(x)' y` into `grad_gxy` (length n).
    fn eval_grad_g_prod(&self, x: &[f64], y: &[f64], grad_gxy: &mut [f64]);

    /// Evaluates the gradient of the single constraint `g_i`.
    fn eval_grad_gi(&self, _x: &[f64], _i: usize, _grad_gi: &mut [f64]) -> Result<(), Error> {
        Err(Error::NotImplemented("eval_grad_gi"))
    }
    /// Evaluates the Hessian-of-the-Lagrangian product
    /// `grad^2 L(x, y) v`.
    fn eval_hess_l_prod(
        &self,
        _x: &[f64],
        _y: &[f64],
        _v: &[f64],
        _hv: &mut [f64],
    ) -> Result<(), Error> {
        Err(Error::NotImplemented("eval_hess_l_prod"))
    }
    /// Evaluates the Hessian of the Lagrangian, row-major n by n.
    fn eval_hess_l(&self, _x: &[f64], _y: &[f64], _hess: &mut [f64]) -> Result<(), Error> {
        Err(Error::NotImplemented("eval_hess_l"))
    }

    /// Evaluates `f(x)` and its gradient in one call.
    fn eval_f_grad_f(&self, x: &[f64], grad_fx: &mut [f64]) -> f64 {
        self.eval_grad_f(x, grad_fx);
        self.eval_f(x)
    }

    /// Evaluates `f(x)` and `g(x)` in one call.
    fn eval_f_g(&self, x: &[f64], gx: &mut [f64]) -> f64 {
        self.eval_g(x, gx);
        self.eval_f(x)
    }

    /// Evaluates the Lagrangian gradient
    /// `grad L(x, y) = grad f(x) + grad g(x)' y`.
    fn eval_grad_l(&self, x: &[f64], y: &[f64], grad_l: &mut [f64], work_n: &mut [f64]) {
        self.eval_grad_f(x, grad_l);
        if self.m() == 0 {
            return;
        }
        self.eval_grad_g_prod(x, y, work_n);
        for (gl, w) in grad_l.iter_mut().zip(work_n.iter()) {
            *gl += *w;
        }
    }

    /// Evaluates the augmented Lagrangian
    ///
    /// ```txt
    ///       psi(x) = f(x) + 1/2 dist_Sigma^2(g(x) + Sigma^-1 y, D)
    /// ```
    ///
    /// and writes the multiplier candidate
    /// `y_hat = Sigma (g(x) + Sigma^-1 y - proj_D(g(x) + Sigma^-1 y))`
    /// into `hat_y`, to be reused by [`Problem::eval_grad_psi_from_hat_y`].
    fn eval_psi_hat_y(&self, x: &[f64], y: &[f64], sigma: &[f64], hat_y: &mut [f64]) -> f64 {
        if self.m() == 0 {
            return self.eval_f(x);
        }
        let f = self.eval_f_g(x, hat_y);
        let dt_hat_y = hat_y_from_g(hat_y, y, sigma, self.box_d());
        f + 0.5 * dt_hat_y
    }

    /// Evaluates `grad psi(x) = grad f(x) + grad g(x)' y_hat` from a
    /// previously computed `y_hat`.
    fn eval_grad_psi_from_hat_y(
        &self,
        x: &[f64],
        hat_y: &[f64],
        grad_psi: &mut [f64],
        work_n: &mut [f64],
    ) {
        if self.m() == 0 {
            self.eval_grad_f(x, grad_psi);
        } else {
            self.eval_grad_l(x, hat_y, grad_psi, work_n);
        }
    }

    /// Evaluates `grad psi(x)`.
    fn eval_grad_psi(
        &self,
        x: &[f64],
        y: &[f64],
        sigma: &[f64],
        grad_psi: &mut [f64],
        work_n: &mut [f64],
        work_m: &mut [f64],
    ) {
        if self.m() == 0 {
            self.eval_grad_f(x, grad_psi);
            return;
        }
        self.eval_g(x, work_m);
        hat_y_from_g(work_m, y, sigma, self.box_d());
        self.eval_grad_l(x, work_m, grad_psi, work_n);
    }

    /// Evaluates `psi(x)` and `grad psi(x)` in one call, sharing the
    /// evaluation of `g` between the two. Results are identical to
    /// calling [`Problem::eval_psi_hat_y`] and
    /// [`Problem::eval_grad_psi_from_hat_y`] separately.
    fn eval_psi_grad_psi(
        &self,
        x: &[f64],
        y: &[f64],
        sigma: &[f64],
        grad_psi: &mut [f64],
        work_n: &mut [f64],
        work_m: &mut [f64],
    ) -> f64 {
        if self.m() == 0 {
            return self.eval_f_grad_f(x, grad_psi);
        }
        let f = self.eval_f_g(x, work_m);
        let dt_hat_y = hat_y_from_g(work_m, y, sigma, self.box_d());
        self.eval_grad_l(x, work_m, grad_psi, work_n);
        f + 0.5 * dt_hat_y
    }
}

/// Turns `g(x)` into the multiplier candidate `y_hat` in place and
/// returns the weighted squared distance `d' y_hat`:
///
/// ```txt
///       zeta  = g(x) + Sigma^-1 y
///       d     = zeta - proj_D(zeta)
///       y_hat = Sigma d
/// ```
fn hat_y_from_g(g_hat_y: &mut [f64], y: &[f64], sigma: &[f64], d: &Box) -> f64 {
    let mut dt_hat_y = 0.0;
    for (gy, &yi, &si, &lb, &ub) in izip!(g_hat_y.iter_mut(), y, sigma, &d.lower, &d.upper) {
        let zeta = *gy + yi / si;
        let dist = zeta - zeta.clamp(lb, ub);
        dt_hat_y += si * dist * dist;
        *gy = si * dist;
    }
    dt_hat_y
}

/// Called on each iteration of either solver loop. All methods default
/// to doing nothing, so a monitor only implements the level it cares
/// about.
pub trait ProgressMonitor {
    /// Called once per PANOC iteration with the iteration number, the
    /// current `psi`, the fixed-point residual norm, the step size, the
    /// Lipschitz estimate and the line search parameter accepted on the
    /// previous iteration.
    fn inner_update(
        &self,
        _iteration: usize,
        _psi: f64,
        _residual_norm: f64,
        _gamma: f64,
        _lipschitz: f64,
        _tau: f64,
    ) {
    }

    /// Called once per ALM iteration with the iteration number, the
    /// constraint violation norm, the penalty weights, the inner
    /// tolerance of the finished sub-solve and its iteration count.
    fn outer_update(
        &self,
        _iteration: usize,
        _constr_violation: f64,
        _penalty: &[f64],
        _tolerance: f64,
        _inner_iterations: usize,
    ) {
    }
}

/// Accumulated wall-clock time per evaluation kind.
#[derive(Clone, Copy, Debug, Default)]
pub struct EvalTimer {
    pub f: Duration,
    pub grad_f: Duration,
    pub f_grad_f: Duration,
    pub f_g: Duration,
    pub g: Duration,
    pub grad_g_prod: Duration,
    pub grad_gi: Duration,
    pub grad_l: Duration,
    pub hess_l_prod: Duration,
    pub hess_l: Duration,
    pub psi: Duration,
    pub grad_psi: Duration,
    pub grad_psi_from_hat_y: Duration,
    pub psi_grad_psi: Duration,
}

/// Tally of problem evaluations performed during a solve.
#[derive(Clone, Copy, Debug, Default)]
pub struct EvalCounter {
    pub f: u32,
    pub grad_f: u32,
    pub f_grad_f: u32,
    pub f_g: u32,
    pub g: u32,
    pub grad_g_prod: u32,
    pub grad_gi: u32,
    pub grad_l: u32,
    pub hess_l_prod: u32,
    pub hess_l: u32,
    pub psi: u32,
    pub grad_psi: u32,
    pub grad_psi_from_hat_y: u32,
    pub psi_grad_psi: u32,
    pub time: EvalTimer,
}

impl EvalCounter {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Display for EvalCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "                  f:{:6}  ({:?})", self.f, self.time.f)?;
        writeln!(f, "             grad_f:{:6}  ({:?})", self.grad_f, self.time.grad_f)?;
        writeln!(f, "           f_grad_f:{:6}  ({:?})", self.f_grad_f, self.time.f_grad_f)?;
        writeln!(f, "                f_g:{:6}  ({:?})", self.f_g, self.time.f_g)?;
        writeln!(f, "                  g:{:6}  ({:?})", self.g, self.time.g)?;
        writeln!(f, "        grad_g_prod:{:6}  ({:?})", self.grad_g_prod, self.time.grad_g_prod)?;
        writeln!(f, "            grad_gi:{:6}  ({:?})", self.grad_gi, self.time.grad_gi)?;
        writeln!(f, "             grad_l:{:6}  ({:?})", self.grad_l, self.time.grad_l)?;
        writeln!(f, "        hess_l_prod:{:6}  ({:?})", self.hess_l_prod, self.time.hess_l_prod)?;
        writeln!(f, "             hess_l:{:6}  ({:?})", self.hess_l, self.time.hess_l)?;
        writeln!(f, "                psi:{:6}  ({:?})", self.psi, self.time.psi)?;
        writeln!(f, "           grad_psi:{:6}  ({:?})", self.grad_psi, self.time.grad_psi)?;
        writeln!(
            f,
            "grad_psi_from_hat_y:{:6}  ({:?})",
            self.grad_psi_from_hat_y, self.time.grad_psi_from_hat_y
        )?;
        write!(f, "       psi_grad_psi:{:6}  ({:?})", self.psi_grad_psi, self.time.psi_grad_psi)
    }
}

/// Decorator around a [`Problem`] that counts and times every
/// evaluation. The solve is single-threaded, so plain interior
/// mutability suffices.
pub struct ProblemWithCounters<'a> {
    problem: &'a dyn Problem,
    evaluations: RefCell<EvalCounter>,
}

impl<'a> ProblemWithCounters<'a> {
    pub fn new(problem: &'a dyn Problem) -> Self {
        Self {
            problem,
            evaluations: RefCell::new(EvalCounter::default()),
        }
    }

    /// Snapshot of the tally so far.
    pub fn counts(&self) -> EvalCounter {
        *self.evaluations.borrow()
    }

    pub fn reset(&self) {
        self.evaluations.borrow_mut().reset();
    }

    fn timed<R>(
        &self,
        run: impl FnOnce() -> R,
        record: impl FnOnce(&mut EvalCounter, Duration),
    ) -> R {
        let t0 = Instant::now();
        let result = run();
        record(&mut self.evaluations.borrow_mut(), t0.elapsed());
        result
    }
}

impl Problem for ProblemWithCounters<'_> {
    fn n(&self) -> usize {
        self.problem.n()
    }

    fn m(&self) -> usize {
        self.problem.m()
    }

    fn box_c(&self) -> &Box {
        self.problem.box_c()
    }

    fn box_d(&self) -> &Box {
        self.problem.box_d()
    }

    fn capability(&self) -> Capability {
        self.problem.capability()
    }

    fn eval_f(&self, x: &[f64]) -> f64 {
        self.timed(
            || self.problem.eval_f(x),
            |c, t| {
                c.f += 1;
                c.time.f += t;
            },
        )
    }

    fn eval_grad_f(&self, x: &[f64], grad_fx: &mut [f64]) {
        self.timed(
            || self.problem.eval_grad_f(x, grad_fx),
            |c, t| {
                c.grad_f += 1;
                c.time.grad_f += t;
            },
        )
    }

    fn eval_g(&self, x: &[f64], gx: &mut [f64]) {
        self.timed(
            || self.problem.eval_g(x, gx),
            |c, t| {
                c.g += 1;
                c.time.g += t;
            },
        )
    }

    fn eval_grad_g_prod(&self, x: &[f64], y: &[f64], grad_gxy: &mut [f64]) {
        self.timed(
            || self.problem.eval_grad_g_prod(x, y, grad_gxy),
            |c, t| {
                c.grad_g_prod += 1;
                c.time.grad_g_prod += t;
            },
        )
    }

    fn eval_grad_gi(&self, x: &[f64], i: usize, grad_gi: &mut [f64]) -> Result<(), Error> {
        self.timed(
            || self.problem.eval_grad_gi(x, i, grad_gi),
            |c, t| {
                c.grad_gi += 1;
                c.time.grad_gi += t;
            },
        )
    }

    fn eval_hess_l_prod(
        &self,
        x: &[f64],
        y: &[f64],
        v: &[f64],
        hv: &mut [f64],
    ) -> Result<(), Error> {
        self.timed(
            || self.problem.eval_hess_l_prod(x, y, v, hv),
            |c, t| {
                c.hess_l_prod += 1;
                c.time.hess_l_prod += t;
            },
        )
    }

    fn eval_hess_l(&self, x: &[f64], y: &[f64], hess: &mut [f64]) -> Result<(), Error> {
        self.timed(
            || self.problem.eval_hess_l(x, y, hess),
            |c, t| {
                c.hess_l += 1;
                c.time.hess_l += t;
            },
        )
    }

    fn eval_f_grad_f(&self, x: &[f64], grad_fx: &mut [f64]) -> f64 {
        self.timed(
            || self.problem.eval_f_grad_f(x, grad_fx),
            |c, t| {
                c.f_grad_f += 1;
                c.time.f_grad_f += t;
            },
        )
    }

    fn eval_f_g(&self, x: &[f64], gx: &mut [f64]) -> f64 {
        self.timed(
            || self.problem.eval_f_g(x, gx),
            |c, t| {
                c.f_g += 1;
                c.time.f_g += t;
            },
        )
    }

    fn eval_grad_l(&self, x: &[f64], y: &[f64], grad_l: &mut [f64], work_n: &mut [f64]) {
        self.timed(
            || self.problem.eval_grad_l(x, y, grad_l, work_n),
            |c, t| {
                c.grad_l += 1;
                c.time.grad_l += t;
            },
        )
    }

    fn eval_psi_hat_y(&self, x: &[f64], y: &[f64], sigma: &[f64], hat_y: &mut [f64]) -> f64 {
        self.timed(
            || self.problem.eval_psi_hat_y(x, y, sigma, hat_y),
            |c, t| {
                c.psi += 1;
                c.time.psi += t;
            },
        )
    }

    fn eval_grad_psi_from_hat_y(
        &self,
        x: &[f64],
        hat_y: &[f64],
        grad_psi: &mut [f64],
        work_n: &mut [f64],
    ) {
        self.timed(
            || {
                self.problem
                    .eval_grad_psi_from_hat_y(x, hat_y, grad_psi, work_n)
            },
            |c, t| {
                c.grad_psi_from_hat_y += 1;
                c.time.grad_psi_from_hat_y += t;
            },
        )
    }

    fn eval_grad_psi(
        &self,
        x: &[f64],
        y: &[f64],
        sigma: &[f64],
        grad_psi: &mut [f64],
        work_n: &mut [f64],
        work_m: &mut [f64],
    ) {
        self.timed(
            || {
                self.problem
                    .eval_grad_psi(x, y, sigma, grad_psi, work_n, work_m)
            },
            |c, t| {
                c.grad_psi += 1;
                c.time.grad_psi += t;
            },
        )
    }

    fn eval_psi_grad_psi(
        &self,
        x: &[f64],
        y: &[f64],
        sigma: &[f64],
        grad_psi: &mut [f64],
        work_n: &mut [f64],
        work_m: &mut [f64],
    ) -> f64 {
        self.timed(
            || {
                self.problem
                    .eval_psi_grad_psi(x, y, sigma, grad_psi, work_n, work_m)
            },
            |c, t| {
                c.psi_grad_psi += 1;
                c.time.psi_grad_psi += t;
            },
        )
    }
}
