//! Grounded symbolic planning for STRIPS-style domains with probabilistic
//! and imprecise-probability effects.
//!
//! The pipeline is: load a [`model::Domain`] and [`model::Problem`] with
//! [`parsing`], resolve them into a [`ground::LiftedProblem`] with
//! [`ground::instantiate`], instantiate every concrete action with
//! [`ground::ground_problem`], then either search for a shortest plan
//! ([`search::plan_search`]) or compute long-run state values
//! ([`mdp::value_iteration`]).
//!
//! [`solve_deterministic`] and [`solve_mdp`] bundle those stages for callers
//! that do not need the intermediate representations. Both accept the loaded
//! model, never file paths; reading files belongs to the caller.

pub mod ground;
pub mod mdp;
pub mod model;
pub mod parsing;
pub mod prob;
pub mod search;
pub mod symbols;
pub mod typesystem;
mod utils;

use crate::ground::{ground_problem, instantiate};
use crate::model::{Domain, Problem};
use anyhow::{ensure, Result};
use rand::Rng;

/// A plan: formatted ground-action instances in execution order, e.g.
/// `["(cook)", "(wrap)", "(carry)"]`.
pub type Plan = Vec<String>;

/// State values computed by [`solve_mdp`]: formatted states paired with
/// their converged (or best-effort) value, plus convergence information.
pub struct StateValues {
    /// `(state, value)` entries in discovery order; states are formatted as
    /// the set of their true atoms.
    pub entries: Vec<(String, f64)>,
    pub sweeps: u32,
    pub converged: bool,
}

/// Grounds the problem and searches for a shortest plan.
///
/// Returns `Ok(None)` when no plan exists — an expected outcome,
/// distinguishable from a loading or grounding error. The model must be
/// deterministic: an action with more than one outcome branch is rejected.
pub fn solve_deterministic<R: Rng>(domain: &Domain, problem: &Problem, rng: &mut R) -> Result<Option<Plan>> {
    let lifted = instantiate(domain, problem)?;
    let ground = ground_problem(&lifted, rng)?;
    for op in ground.operators.iter() {
        ensure!(
            ground.operators[op].is_deterministic(),
            "Action {} has probabilistic effects; use the MDP solver instead",
            lifted.world.table.format(ground.operators.name(op))
        );
    }
    let plan = search::plan_search(&ground.initial_state, &ground.operators, &ground.goals);
    Ok(plan.map(|plan| {
        plan.iter()
            .map(|&op| lifted.world.table.format(ground.operators.name(op)))
            .collect()
    }))
}

/// Grounds the problem and runs value iteration over its reachable states.
pub fn solve_mdp<R: Rng>(
    domain: &Domain,
    problem: &Problem,
    cfg: &mdp::Cfg,
    rng: &mut R,
) -> Result<StateValues> {
    let lifted = instantiate(domain, problem)?;
    let ground = ground_problem(&lifted, rng)?;
    let vf = mdp::value_iteration(&ground.initial_state, &ground.operators, &ground.goals, cfg);
    Ok(StateValues {
        entries: vf
            .iter()
            .map(|(state, value)| (lifted.world.format_state(state), value))
            .collect(),
        sweeps: vf.sweeps,
        converged: vf.converged,
    })
}
