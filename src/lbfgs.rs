use crate::common::{Error, LbfgsOptions};
use crate::math::{dot, norm};

/// Limited-memory BFGS operator over a bounded history of `(s, y)`
/// pairs with `s = x_next - x` and `y = grad_next - grad`.
///
/// The history lives in a fixed ring allocated up front, so neither
/// [`Lbfgs::update`] nor [`Lbfgs::apply`] allocates. Pairs failing the
/// curvature condition `s'y > threshold * |s| * |y|` are dropped to
/// keep the implicit inverse-Hessian approximation positive definite.
pub struct Lbfgs {
    s: Vec<Vec<f64>>,
    y: Vec<Vec<f64>>,
    rho: Vec<f64>,
    alpha: Vec<f64>,
    /// Slot receiving the next pair; the newest pair sits just behind it.
    head: usize,
    len: usize,
    curvature_threshold: f64,
}

impl Lbfgs {
    pub fn new(n: usize, opt: &LbfgsOptions) -> Result<Self, Error> {
        opt.verify()?;
        Ok(Self {
            s: vec![vec![0.0; n]; opt.memory],
            y: vec![vec![0.0; n]; opt.memory],
            rho: vec![0.0; opt.memory],
            alpha: vec![0.0; opt.memory],
            head: 0,
            len: 0,
            curvature_threshold: opt.curvature_threshold,
        })
    }

    /// Number of pairs currently stored.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offers the pair `(s, y)` to the history, evicting the oldest
    /// pair when the ring is full. Returns `false` when the pair fails
    /// the curvature condition and was not stored.
    pub fn update(&mut self, s: &[f64], y: &[f64]) -> bool {
        let sy = dot(s, y);
        if !(sy > self.curvature_threshold * norm(s) * norm(y)) {
            return false;
        }
        let mem = self.s.len();
        self.s[self.head].copy_from_slice(s);
        self.y[self.head].copy_from_slice(y);
        self.rho[self.head] = 1.0 / sy;
        self.head = (self.head + 1) % mem;
        if self.len < mem {
            self.len += 1;
        }
        true
    }

    /// Computes `out = H grad` with the two-loop recursion over the
    /// stored pairs, newest first. The initial Hessian approximation is
    /// `s'y / y'y` times the identity, taken from the newest pair; with
    /// an empty history `out` is simply a copy of `grad`.
    pub fn apply(&mut self, grad: &[f64], out: &mut [f64]) {
        out.copy_from_slice(grad);
        if self.len == 0 {
            return;
        }
        let mem = self.s.len();
        let head = self.head;
        let slot = move |j: usize| (head + mem - 1 - j) % mem;

        for j in 0..self.len {
            let i = slot(j);
            let a = self.rho[i] * dot(&self.s[i], out);
            self.alpha[j] = a;
            for (o, yi) in out.iter_mut().zip(&self.y[i]) {
                *o -= a * yi;
            }
        }

        let newest = slot(0);
        let scale = 1.0 / (self.rho[newest] * dot(&self.y[newest], &self.y[newest]));
        for o in out.iter_mut() {
            *o *= scale;
        }

        for j in (0..self.len).rev() {
            let i = slot(j);
            let b = self.rho[i] * dot(&self.y[i], out);
            let a = self.alpha[j];
            for (o, si) in out.iter_mut().zip(&self.s[i]) {
                *o += (a - b) * si;
            }
        }
    }

    /// Empties the history.
    pub fn reset(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}
