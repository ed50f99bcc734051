//! # Constrained Solver
//!
//! $$
//! \mathcal{L}_\rho(\mathbf{w},\lambda) = f(\mathbf{w})
//! + \lambda^\top h(\mathbf{w}) + \tfrac{\rho}{2}\lVert h(\mathbf{w})\rVert^2,
//! \qquad \mathbf{l} \le \mathbf{w} \le \mathbf{u}
//! $$
//!
//! Minimization of smooth objectives under linear equality constraints and
//! box bounds. Objectives are plain argmin [`CostFunction`] + [`Gradient`]
//! implementations; the backend is chosen through [`SolverBackend`].

use std::str::FromStr;

use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::core::Gradient;
use argmin::core::State;
use argmin::core::TerminationReason;
use argmin::solver::neldermead::NelderMead;
use impl_new_derive::ImplNew;
use tracing::debug;
use tracing::warn;

use super::error::PortfolioError;
use super::types::OptimizationResult;
use super::types::SolverStatus;

const ARMIJO: f64 = 1e-4;
const MIN_LINE_STEP: f64 = 1e-16;
const MIN_SPECTRAL_STEP: f64 = 1e-10;
const MAX_SPECTRAL_STEP: f64 = 1e10;

/// Smooth objective over weight vectors.
pub trait Objective:
  CostFunction<Param = Vec<f64>, Output = f64> + Gradient<Param = Vec<f64>, Gradient = Vec<f64>>
{
}

impl<T> Objective for T where
  T: CostFunction<Param = Vec<f64>, Output = f64> + Gradient<Param = Vec<f64>, Gradient = Vec<f64>>
{
}

/// Linear equality `coefficients · w = rhs`.
#[derive(ImplNew, Clone, Debug, PartialEq)]
pub struct LinearConstraint {
  pub coefficients: Vec<f64>,
  pub rhs: f64,
}

impl LinearConstraint {
  /// Fully invested: `Σ w_i = 1`.
  pub fn budget(n: usize) -> Self {
    Self::new(vec![1.0; n], 1.0)
  }

  /// `coefficients · w - rhs`.
  pub fn residual(&self, w: &[f64]) -> f64 {
    dot(&self.coefficients, w) - self.rhs
  }
}

/// Uniform box `lower <= w_i <= upper`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
  pub lower: f64,
  pub upper: f64,
}

impl Bounds {
  /// No short selling, no leverage.
  pub const LONG_ONLY: Bounds = Bounds {
    lower: 0.0,
    upper: 1.0,
  };

  pub fn project(&self, x: f64) -> f64 {
    x.clamp(self.lower, self.upper)
  }
}

impl Default for Bounds {
  fn default() -> Self {
    Self::LONG_ONLY
  }
}

/// A minimization problem: objective, starting point, equalities and bounds.
#[derive(Clone, Debug)]
pub struct ConstrainedProblem<'a, O> {
  pub objective: &'a O,
  pub initial_guess: Vec<f64>,
  pub equalities: Vec<LinearConstraint>,
  pub bounds: Bounds,
}

impl<'a, O: Objective> ConstrainedProblem<'a, O> {
  /// Long-only, fully invested problem over `n` assets starting from `1/n`.
  pub fn new(objective: &'a O, n: usize) -> Self {
    Self {
      objective,
      initial_guess: vec![1.0 / n.max(1) as f64; n],
      equalities: vec![LinearConstraint::budget(n)],
      bounds: Bounds::LONG_ONLY,
    }
  }

  pub fn with_equality(mut self, constraint: LinearConstraint) -> Self {
    self.equalities.push(constraint);
    self
  }

  pub fn with_bounds(mut self, bounds: Bounds) -> Self {
    self.bounds = bounds;
    self
  }

  pub fn dim(&self) -> usize {
    self.initial_guess.len()
  }

  /// Largest absolute equality residual at `w`.
  pub fn max_violation(&self, w: &[f64]) -> f64 {
    self
      .equalities
      .iter()
      .map(|c| c.residual(w).abs())
      .fold(0.0, f64::max)
  }

  fn validate(&self) -> Result<(), String> {
    if self.initial_guess.is_empty() {
      return Err("problem has no variables".to_string());
    }
    if !(self.bounds.lower <= self.bounds.upper) {
      return Err(format!(
        "empty box [{}, {}]",
        self.bounds.lower, self.bounds.upper
      ));
    }
    if let Some(c) = self
      .equalities
      .iter()
      .find(|c| c.coefficients.len() != self.dim())
    {
      return Err(format!(
        "constraint has {} coefficients for {} variables",
        c.coefficients.len(),
        self.dim()
      ));
    }
    Ok(())
  }
}

/// Capability interface implemented by every solver backend.
pub trait ConstrainedSolver {
  fn minimize<O: Objective>(&self, problem: &ConstrainedProblem<'_, O>) -> OptimizationResult;
}

/// Method of multipliers with a spectral projected-gradient inner solver.
#[derive(Clone, Debug, PartialEq)]
pub struct AugmentedLagrangian {
  /// Multiplier updates before giving up.
  pub max_outer_iters: usize,
  /// Projected-gradient iterations per subproblem.
  pub max_inner_iters: usize,
  /// Largest accepted equality residual.
  pub tolerance: f64,
  /// Projected-gradient norm at which a subproblem counts as solved.
  pub stationarity_tol: f64,
  pub initial_penalty: f64,
  pub penalty_growth: f64,
  pub max_penalty: f64,
}

impl Default for AugmentedLagrangian {
  fn default() -> Self {
    Self {
      max_outer_iters: 100,
      max_inner_iters: 1000,
      tolerance: 1e-6,
      stationarity_tol: 1e-9,
      initial_penalty: 10.0,
      penalty_growth: 10.0,
      max_penalty: 1e8,
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Subproblem {
  Stationary,
  Stalled,
  Exhausted,
}

/// Augmented Lagrangian of a problem for fixed multipliers and penalty.
struct Lagrangian<'p, 'a, O> {
  problem: &'p ConstrainedProblem<'a, O>,
  multipliers: Vec<f64>,
  penalty: f64,
}

impl<O: Objective> CostFunction for Lagrangian<'_, '_, O> {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, x: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
    let mut value = self.problem.objective.cost(x)?;
    for (c, l) in self.problem.equalities.iter().zip(self.multipliers.iter()) {
      let h = c.residual(x);
      value += l * h + 0.5 * self.penalty * h * h;
    }
    Ok(value)
  }
}

impl<O: Objective> Gradient for Lagrangian<'_, '_, O> {
  type Param = Vec<f64>;
  type Gradient = Vec<f64>;

  fn gradient(&self, x: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
    let mut grad = self.problem.objective.gradient(x)?;
    for (c, l) in self.problem.equalities.iter().zip(self.multipliers.iter()) {
      let scale = l + self.penalty * c.residual(x);
      for (g, a) in grad.iter_mut().zip(c.coefficients.iter()) {
        *g += scale * a;
      }
    }
    Ok(grad)
  }
}

impl AugmentedLagrangian {
  /// Spectral projected gradient (Barzilai-Borwein step, Armijo backtracking)
  /// on the box. `x` is updated in place and always stays inside the box.
  fn solve_subproblem<F: Objective>(
    &self,
    f: &F,
    bounds: Bounds,
    x: &mut Vec<f64>,
  ) -> Result<(Subproblem, usize), argmin::core::Error> {
    let mut fx = f.cost(x)?;
    let mut g = f.gradient(x)?;
    let mut step = 1.0;

    for k in 0..self.max_inner_iters {
      let pg = projected_gradient_norm(x, &g, bounds);
      if pg <= self.stationarity_tol {
        return Ok((Subproblem::Stationary, k));
      }

      let d: Vec<f64> = x
        .iter()
        .zip(g.iter())
        .map(|(xi, gi)| bounds.project(xi - step * gi) - xi)
        .collect();
      let slope = dot(&g, &d);

      let mut t = 1.0;
      let (x_new, f_new) = loop {
        let candidate: Vec<f64> = x
          .iter()
          .zip(d.iter())
          .map(|(xi, di)| bounds.project(xi + t * di))
          .collect();
        let fc = f.cost(&candidate)?;
        if fc <= fx + ARMIJO * t * slope {
          break (candidate, fc);
        }
        t *= 0.5;
        if t < MIN_LINE_STEP {
          // No descent left at working precision.
          let outcome = if pg <= self.tolerance {
            Subproblem::Stationary
          } else {
            Subproblem::Stalled
          };
          return Ok((outcome, k));
        }
      };

      let g_new = f.gradient(&x_new)?;
      let mut ss = 0.0;
      let mut sy = 0.0;
      for i in 0..x.len() {
        let s = x_new[i] - x[i];
        let y = g_new[i] - g[i];
        ss += s * s;
        sy += s * y;
      }
      step = if sy > 0.0 {
        (ss / sy).clamp(MIN_SPECTRAL_STEP, MAX_SPECTRAL_STEP)
      } else {
        MAX_SPECTRAL_STEP
      };

      *x = x_new;
      fx = f_new;
      g = g_new;
    }

    let outcome = if projected_gradient_norm(x, &g, bounds) <= self.stationarity_tol {
      Subproblem::Stationary
    } else {
      Subproblem::Exhausted
    };
    Ok((outcome, self.max_inner_iters))
  }
}

impl ConstrainedSolver for AugmentedLagrangian {
  fn minimize<O: Objective>(&self, problem: &ConstrainedProblem<'_, O>) -> OptimizationResult {
    if let Err(reason) = problem.validate() {
      return OptimizationResult::failed(problem.initial_guess.clone(), reason);
    }

    let bounds = problem.bounds;
    let mut x: Vec<f64> = problem
      .initial_guess
      .iter()
      .map(|&v| bounds.project(v))
      .collect();
    let mut lagrangian = Lagrangian {
      problem,
      multipliers: vec![0.0; problem.equalities.len()],
      penalty: self.initial_penalty,
    };

    let mut status = SolverStatus::MaxIterationsReached;
    let mut iterations = 0;
    let mut previous_violation = f64::INFINITY;

    for _ in 0..self.max_outer_iters {
      let (outcome, inner) = match self.solve_subproblem(&lagrangian, bounds, &mut x) {
        Ok(v) => v,
        Err(e) => {
          status = SolverStatus::Failed(e.to_string());
          break;
        }
      };
      iterations += inner;

      let residuals: Vec<f64> = problem.equalities.iter().map(|c| c.residual(&x)).collect();
      let violation = residuals.iter().map(|h| h.abs()).fold(0.0, f64::max);
      if violation <= self.tolerance && outcome == Subproblem::Stationary {
        status = SolverStatus::Converged;
        break;
      }

      let penalty = lagrangian.penalty;
      for (l, h) in lagrangian.multipliers.iter_mut().zip(residuals.iter()) {
        *l += penalty * h;
      }
      if violation > 0.25 * previous_violation {
        lagrangian.penalty = (penalty * self.penalty_growth).min(self.max_penalty);
      }
      previous_violation = violation;
    }

    let objective = problem.objective.cost(&x).unwrap_or(f64::NAN);
    let constraint_violation = problem.max_violation(&x);
    match &status {
      SolverStatus::Converged => {
        debug!(iterations, constraint_violation, objective, "augmented lagrangian converged")
      }
      other => {
        warn!(
          iterations,
          constraint_violation,
          status = ?other,
          "augmented lagrangian did not converge"
        )
      }
    }

    OptimizationResult {
      weights: x,
      objective,
      status,
      iterations,
      constraint_violation,
    }
  }
}

/// Penalty fallback: Nelder-Mead over softmax logits.
///
/// The softmax keeps the budget and the long-only box satisfied by
/// construction. Any further equality enters as a quadratic penalty that is
/// multiplied by `penalty_growth` between warm-started runs until the residual
/// meets `tolerance` or the penalty reaches `max_penalty`. Only the `[0, 1]`
/// box is supported.
#[derive(Clone, Debug, PartialEq)]
pub struct SoftmaxNelderMead {
  /// Nelder-Mead iterations per penalty round.
  pub max_iters: u64,
  /// Standard deviation of simplex costs at which Nelder-Mead stops.
  pub sd_tolerance: f64,
  /// Initial weight of squared equality residuals.
  pub penalty: f64,
  pub penalty_growth: f64,
  pub max_penalty: f64,
  /// Largest accepted equality residual.
  pub tolerance: f64,
}

impl Default for SoftmaxNelderMead {
  fn default() -> Self {
    Self {
      max_iters: 5000,
      sd_tolerance: 1e-14,
      penalty: 1e4,
      penalty_growth: 10.0,
      max_penalty: 1e10,
      tolerance: 1e-6,
    }
  }
}

struct SoftmaxCost<'p, 'a, O> {
  problem: &'p ConstrainedProblem<'a, O>,
  penalty: f64,
}

impl<O: Objective> CostFunction for SoftmaxCost<'_, '_, O> {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, z: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
    let w = softmax(z);
    let mut value = self.problem.objective.cost(&w)?;
    for c in &self.problem.equalities {
      value += self.penalty * c.residual(&w).powi(2);
    }
    Ok(value)
  }
}

impl SoftmaxNelderMead {
  /// One Nelder-Mead run from the logits `z0` at a fixed penalty.
  fn run_round<O: Objective>(
    &self,
    problem: &ConstrainedProblem<'_, O>,
    z0: &[f64],
    penalty: f64,
  ) -> Result<(Vec<f64>, bool, usize), argmin::core::Error> {
    let mut simplex = Vec::with_capacity(z0.len() + 1);
    simplex.push(z0.to_vec());
    for i in 0..z0.len() {
      let mut point = z0.to_vec();
      point[i] += 1.0;
      simplex.push(point);
    }

    let cost = SoftmaxCost { problem, penalty };
    let solver = NelderMead::new(simplex).with_sd_tolerance(self.sd_tolerance)?;
    let res = Executor::new(cost, solver)
      .configure(|state| state.max_iters(self.max_iters))
      .run()?;

    let state = res.state();
    let converged = matches!(
      state.get_termination_reason(),
      Some(TerminationReason::SolverConverged)
    );
    let z = state
      .get_best_param()
      .cloned()
      .unwrap_or_else(|| z0.to_vec());
    Ok((z, converged, state.get_iter() as usize))
  }
}

impl ConstrainedSolver for SoftmaxNelderMead {
  fn minimize<O: Objective>(&self, problem: &ConstrainedProblem<'_, O>) -> OptimizationResult {
    if let Err(reason) = problem.validate() {
      return OptimizationResult::failed(problem.initial_guess.clone(), reason);
    }
    if problem.bounds != Bounds::LONG_ONLY {
      return OptimizationResult::failed(
        problem.initial_guess.clone(),
        "softmax parameterization only supports [0, 1] bounds",
      );
    }

    let mut z: Vec<f64> = problem
      .initial_guess
      .iter()
      .map(|&w| w.max(1e-12).ln())
      .collect();
    let mut penalty = self.penalty;
    let mut iterations = 0;

    let solver_converged = loop {
      let (best, converged, iters) = match self.run_round(problem, &z, penalty) {
        Ok(round) => round,
        Err(e) => {
          warn!(error = %e, "nelder-mead run failed");
          return OptimizationResult::failed(problem.initial_guess.clone(), e.to_string());
        }
      };
      z = best;
      iterations += iters;

      let violation = problem.max_violation(&softmax(&z));
      if violation <= self.tolerance || penalty >= self.max_penalty {
        break converged;
      }
      penalty = (penalty * self.penalty_growth).min(self.max_penalty);
      debug!(penalty, violation, "raising nelder-mead penalty");
    };

    let weights = softmax(&z);
    let objective = problem.objective.cost(&weights).unwrap_or(f64::NAN);
    let constraint_violation = problem.max_violation(&weights);
    let status = if solver_converged && constraint_violation <= self.tolerance {
      SolverStatus::Converged
    } else {
      SolverStatus::MaxIterationsReached
    };
    if status != SolverStatus::Converged {
      warn!(iterations, constraint_violation, "nelder-mead did not converge");
    }

    OptimizationResult {
      weights,
      objective,
      status,
      iterations,
      constraint_violation,
    }
  }
}

/// Solver selection.
#[derive(Clone, Debug, PartialEq)]
pub enum SolverBackend {
  AugmentedLagrangian(AugmentedLagrangian),
  SoftmaxNelderMead(SoftmaxNelderMead),
}

impl Default for SolverBackend {
  fn default() -> Self {
    Self::AugmentedLagrangian(AugmentedLagrangian::default())
  }
}

impl FromStr for SolverBackend {
  type Err = PortfolioError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "al" | "augmented-lagrangian" | "auglag" => {
        Ok(Self::AugmentedLagrangian(AugmentedLagrangian::default()))
      }
      "nm" | "nelder-mead" | "neldermead" | "softmax-nelder-mead" => {
        Ok(Self::SoftmaxNelderMead(SoftmaxNelderMead::default()))
      }
      other => Err(PortfolioError::InvalidInput(format!(
        "unknown solver backend {other}"
      ))),
    }
  }
}

impl ConstrainedSolver for SolverBackend {
  fn minimize<O: Objective>(&self, problem: &ConstrainedProblem<'_, O>) -> OptimizationResult {
    match self {
      Self::AugmentedLagrangian(solver) => solver.minimize(problem),
      Self::SoftmaxNelderMead(solver) => solver.minimize(problem),
    }
  }
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
  a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn projected_gradient_norm(x: &[f64], g: &[f64], bounds: Bounds) -> f64 {
  x.iter()
    .zip(g.iter())
    .map(|(xi, gi)| (bounds.project(xi - gi) - xi).abs())
    .fold(0.0, f64::max)
}

fn softmax(x: &[f64]) -> Vec<f64> {
  if x.is_empty() {
    return Vec::new();
  }

  let max_x = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
  let exps: Vec<f64> = x.iter().map(|&v| (v - max_x).exp()).collect();
  let sum: f64 = exps.iter().sum();

  if sum < 1e-15 {
    vec![1.0 / x.len() as f64; x.len()]
  } else {
    exps.iter().map(|&e| e / sum).collect()
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;

  /// Squared distance to a fixed point.
  struct Distance {
    target: Vec<f64>,
  }

  impl CostFunction for Distance {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
      Ok(x.iter().zip(&self.target).map(|(a, b)| (a - b).powi(2)).sum())
    }
  }

  impl Gradient for Distance {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, x: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
      Ok(x.iter().zip(&self.target).map(|(a, b)| 2.0 * (a - b)).collect())
    }
  }

  #[test]
  fn projects_onto_budget_hyperplane() {
    let objective = Distance {
      target: vec![0.8, 0.8],
    };
    let problem = ConstrainedProblem::new(&objective, 2);
    let result = AugmentedLagrangian::default().minimize(&problem);

    assert!(result.converged());
    assert_abs_diff_eq!(result.weights[0], 0.5, epsilon = 1e-6);
    assert_abs_diff_eq!(result.weights[1], 0.5, epsilon = 1e-6);
    assert!(result.constraint_violation <= 1e-6);
  }

  #[test]
  fn active_bounds_are_respected() {
    let objective = Distance {
      target: vec![2.0, -1.0, 0.0],
    };
    let problem = ConstrainedProblem::new(&objective, 3);
    let result = AugmentedLagrangian::default().minimize(&problem);

    assert!(result.converged());
    assert_abs_diff_eq!(result.weights[0], 1.0, epsilon = 1e-6);
    assert!(result.weights.iter().all(|&w| (0.0..=1.0).contains(&w)));
  }

  #[test]
  fn second_equality_is_enforced() {
    let objective = Distance {
      target: vec![0.0, 0.0, 0.0],
    };
    let problem = ConstrainedProblem::new(&objective, 3)
      .with_equality(LinearConstraint::new(vec![0.1, 0.2, 0.3], 0.25));
    let result = AugmentedLagrangian::default().minimize(&problem);

    assert!(result.converged());
    let sum: f64 = result.weights.iter().sum();
    assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(
      dot(&[0.1, 0.2, 0.3], &result.weights),
      0.25,
      epsilon = 1e-6
    );
  }

  #[test]
  fn infeasible_problem_reports_non_convergence() {
    let objective = Distance {
      target: vec![0.5, 0.5],
    };
    let problem = ConstrainedProblem::new(&objective, 2)
      .with_equality(LinearConstraint::new(vec![1.0, 1.0], 3.0));
    let solver = AugmentedLagrangian {
      max_outer_iters: 20,
      max_inner_iters: 200,
      ..Default::default()
    };
    let result = solver.minimize(&problem);

    assert!(!result.converged());
    assert!(result.weights.iter().all(|&w| (0.0..=1.0).contains(&w)));
    assert!(matches!(
      result.ensure_converged(),
      Err(PortfolioError::NonConvergence { .. })
    ));
  }

  #[test]
  fn malformed_problem_fails_without_solving() {
    let objective = Distance {
      target: vec![0.5, 0.5],
    };
    let problem = ConstrainedProblem::new(&objective, 2)
      .with_equality(LinearConstraint::new(vec![1.0], 1.0));
    let result = SolverBackend::default().minimize(&problem);

    assert!(matches!(result.status, SolverStatus::Failed(_)));
    assert_eq!(result.weights, vec![0.5, 0.5]);
  }

  #[test]
  fn nelder_mead_backend_stays_on_simplex() {
    let objective = Distance {
      target: vec![0.7, 0.3, 0.0],
    };
    let problem = ConstrainedProblem::new(&objective, 3);
    let result = SoftmaxNelderMead::default().minimize(&problem);

    let sum: f64 = result.weights.iter().sum();
    assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-9);
    assert!(result.weights.iter().all(|&w| (0.0..=1.0).contains(&w)));
    assert_abs_diff_eq!(result.weights[0], 0.7, epsilon = 1e-2);
  }

  #[test]
  fn nelder_mead_rejects_custom_bounds() {
    let objective = Distance {
      target: vec![0.5, 0.5],
    };
    let problem = ConstrainedProblem::new(&objective, 2).with_bounds(Bounds {
      lower: 0.1,
      upper: 0.9,
    });
    let result = SoftmaxNelderMead::default().minimize(&problem);
    assert!(matches!(result.status, SolverStatus::Failed(_)));
  }

  #[test]
  fn backend_parses_from_name() {
    assert!(matches!(
      "nelder-mead".parse::<SolverBackend>(),
      Ok(SolverBackend::SoftmaxNelderMead(_))
    ));
    assert_eq!("AL".parse::<SolverBackend>(), Ok(SolverBackend::default()));
    assert!("slsqp".parse::<SolverBackend>().is_err());
  }
}
