//! Value iteration over the reachable state space of a probabilistic problem.
//!
//! The reachable states are discovered exhaustively by following every
//! outcome branch of every applicable ground action, then synchronous
//! Bellman backups are swept over them until the largest value change drops
//! below a threshold or a sweep cap is reached.

use crate::ground::state::{Lit, Operators, State};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

/// Tuning of the value-iteration solver.
#[derive(Debug, Clone, Copy)]
pub struct Cfg {
    /// Discount factor γ applied to future value in the Bellman backup.
    pub discount: f64,
    /// Sweep-to-sweep convergence threshold on the largest value change.
    pub epsilon: f64,
    /// Hard cap on the number of sweeps; reaching it is a soft stop, not a
    /// failure.
    pub max_sweeps: u32,
}

impl Default for Cfg {
    fn default() -> Self {
        Cfg {
            discount: 0.5,
            epsilon: 0.05,
            max_sweeps: 1000,
        }
    }
}

/// Converged (or best-effort) state values, in discovery order.
pub struct ValueFunction {
    states: Vec<State>,
    index: HashMap<State, usize>,
    values: Vec<f64>,
    /// Number of sweeps actually performed.
    pub sweeps: u32,
    /// False when the sweep cap was reached before the threshold.
    pub converged: bool,
}

impl ValueFunction {
    /// Value of a state, or None if it is not reachable from the initial state.
    pub fn value(&self, state: &State) -> Option<f64> {
        self.index.get(state).map(|&i| self.values[i])
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Iterates over `(state, value)` entries in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = (&State, f64)> + '_ {
        self.states.iter().zip(self.values.iter().copied())
    }
}

/// Every state reachable from `initial_state`, following each outcome branch
/// of each applicable operator as a distinct edge regardless of its
/// probability. Discovery order is deterministic.
pub fn reachable_states(initial_state: &State, ops: &Operators) -> Vec<State> {
    let mut seen: HashSet<State> = HashSet::new();
    seen.insert(initial_state.clone());
    let mut states = vec![initial_state.clone()];
    let mut frontier: VecDeque<State> = VecDeque::new();
    frontier.push_back(initial_state.clone());

    while let Some(state) = frontier.pop_front() {
        for op in ops.iter() {
            let operator = &ops[op];
            if !state.entails_all(&operator.precond) {
                continue;
            }
            for outcome in &operator.outcomes {
                let succ = state.successor(&outcome.effects);
                if seen.insert(succ.clone()) {
                    states.push(succ.clone());
                    frontier.push_back(succ);
                }
            }
        }
    }
    states
}

/// Runs value iteration and returns the value of every reachable state.
///
/// A goal state is terminal: its value is pinned to the reward 1 and it is
/// not expanded further. A non-goal state takes `γ · max_a Q(s, a)` where
/// `Q(s, a)` is the branch-probability-weighted value of the action's
/// successors; a state with no applicable action keeps its previous value.
pub fn value_iteration(initial_state: &State, ops: &Operators, goals: &[Lit], cfg: &Cfg) -> ValueFunction {
    let states = reachable_states(initial_state, ops);
    debug!(states = states.len(), "discovered reachable state space");
    let index: HashMap<State, usize> = states
        .iter()
        .enumerate()
        .map(|(i, s)| (s.clone(), i))
        .collect();

    let goal: Vec<bool> = states.iter().map(|s| s.entails_all(goals)).collect();
    // per state, per applicable action: the (probability, successor) pairs of
    // its outcome branches
    let transitions: Vec<Vec<Vec<(f64, usize)>>> = states
        .iter()
        .map(|state| {
            ops.iter()
                .filter(|&op| state.entails_all(&ops[op].precond))
                .map(|op| {
                    ops[op]
                        .outcomes
                        .iter()
                        .map(|o| (o.probability, index[&state.successor(&o.effects)]))
                        .collect()
                })
                .collect()
        })
        .collect();

    let mut values = vec![0.0; states.len()];
    let mut sweeps = 0;
    let mut converged = false;

    while sweeps < cfg.max_sweeps {
        sweeps += 1;
        let previous = values.clone();
        let mut max_diff = 0.0f64;

        for (i, actions) in transitions.iter().enumerate() {
            let new_value = if goal[i] {
                // terminal reward, not explored further
                1.0
            } else {
                let best = actions
                    .iter()
                    .map(|branches| {
                        branches
                            .iter()
                            .map(|&(p, succ)| p * previous[succ])
                            .sum::<f64>()
                    })
                    .fold(None, |best: Option<f64>, q| Some(best.map_or(q, |b| b.max(q))));
                match best {
                    Some(q) => cfg.discount * q,
                    // no applicable action: the value is left unchanged
                    None => previous[i],
                }
            };
            max_diff = max_diff.max((new_value - previous[i]).abs());
            values[i] = new_value;
        }

        if max_diff < cfg.epsilon {
            converged = true;
            break;
        }
    }
    debug!(sweeps, converged, "value iteration finished");

    ValueFunction {
        states,
        index,
        values,
        sweeps,
        converged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ground::{ground_problem, instantiate, GroundProblem, LiftedProblem};
    use crate::parsing::{parse_domain, parse_problem};
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    const DINNER_DOMAIN: &str = "
        (define (domain dinner)
          (:requirements :strips)
          (:predicates (clean) (dinner) (quiet) (present) (garbage))
          (:action cook :parameters () :precondition (clean) :effect (dinner))
          (:action wrap :parameters () :precondition (quiet) :effect (present))
          (:action carry :parameters () :precondition (garbage)
                   :effect (and (not (garbage)) (not (clean))))
          (:action dolly :parameters () :precondition (garbage)
                   :effect (and (not (garbage)) (not (quiet)))))";

    const DINNER_PROBLEM: &str = "
        (define (problem pb1) (:domain dinner)
          (:init (garbage) (clean) (quiet))
          (:goal (and (dinner) (present) (not (garbage)))))";

    fn ground(domain: &str, problem: &str) -> (LiftedProblem, GroundProblem) {
        let dom = parse_domain(domain).unwrap();
        let prob = parse_problem(problem).unwrap();
        let lifted = instantiate(&dom, &prob).unwrap();
        let ground = ground_problem(&lifted, &mut SmallRng::seed_from_u64(0)).unwrap();
        (lifted, ground)
    }

    #[test]
    fn goal_states_converge_to_the_terminal_reward() {
        let (_, ground) = ground(DINNER_DOMAIN, DINNER_PROBLEM);
        let cfg = Cfg {
            epsilon: 1e-6,
            ..Cfg::default()
        };
        let vf = value_iteration(&ground.initial_state, &ground.operators, &ground.goals, &cfg);
        assert!(vf.converged);

        let goal_states: Vec<&State> = vf
            .iter()
            .filter(|(s, _)| s.entails_all(&ground.goals))
            .map(|(s, _)| s)
            .collect();
        assert!(!goal_states.is_empty());
        for s in goal_states {
            assert_eq!(vf.value(s), Some(1.0));
        }
    }

    #[test]
    fn initial_state_value_is_discounted_by_the_goal_distance() {
        let (_, ground) = ground(DINNER_DOMAIN, DINNER_PROBLEM);
        let cfg = Cfg {
            epsilon: 1e-9,
            ..Cfg::default()
        };
        let vf = value_iteration(&ground.initial_state, &ground.operators, &ground.goals, &cfg);
        let v0 = vf.value(&ground.initial_state).unwrap();
        assert!(v0 > 0.0 && v0 < 1.0);
        // the goal is three deterministic steps away: V = γ³
        assert!((v0 - cfg.discount.powi(3)).abs() < 1e-6);
    }

    #[test]
    fn converged_values_are_a_fixed_point() {
        let (_, ground) = ground(DINNER_DOMAIN, DINNER_PROBLEM);
        let cfg = Cfg {
            epsilon: 1e-6,
            ..Cfg::default()
        };
        let first = value_iteration(&ground.initial_state, &ground.operators, &ground.goals, &cfg);
        assert!(first.converged);
        // one extra sweep over the converged table changes nothing beyond ε
        let again = value_iteration(&ground.initial_state, &ground.operators, &ground.goals, &cfg);
        for ((s, a), (_, b)) in first.iter().zip(again.iter()) {
            assert!((a - b).abs() < cfg.epsilon, "value of {s:?} drifted");
        }
    }

    #[test]
    fn sweep_cap_is_a_soft_stop() {
        let (_, ground) = ground(DINNER_DOMAIN, DINNER_PROBLEM);
        let cfg = Cfg {
            epsilon: 1e-9,
            max_sweeps: 1,
            ..Cfg::default()
        };
        let vf = value_iteration(&ground.initial_state, &ground.operators, &ground.goals, &cfg);
        assert!(!vf.converged);
        assert_eq!(vf.sweeps, 1);
        assert_eq!(vf.len(), reachable_states(&ground.initial_state, &ground.operators).len());
    }

    const COFFEE_DOMAIN: &str = "
        (define (domain coffee)
          (:requirements :strips :probabilistic-effects)
          (:predicates (ready) (served) (spilled))
          (:action pour :parameters () :precondition (ready)
            :effect (probabilistic 0.8 (served) 0.2 (and (spilled) (not (ready))))))";

    const COFFEE_PROBLEM: &str = "
        (define (problem c1) (:domain coffee)
          (:init (ready)) (:goal (served)))";

    #[test]
    fn probabilistic_branches_are_all_discovered() {
        let (_, ground) = ground(COFFEE_DOMAIN, COFFEE_PROBLEM);
        let states = reachable_states(&ground.initial_state, &ground.operators);
        // {ready}, {ready served}, {spilled}, {served spilled}: the
        // low-probability branch is discovered like any other, and goal
        // states are expanded too
        assert_eq!(states.len(), 4);
    }

    #[test]
    fn branch_weighted_backup_mixes_successor_values() {
        let (_, ground) = ground(COFFEE_DOMAIN, COFFEE_PROBLEM);
        let cfg = Cfg {
            epsilon: 1e-9,
            ..Cfg::default()
        };
        let vf = value_iteration(&ground.initial_state, &ground.operators, &ground.goals, &cfg);
        let v0 = vf.value(&ground.initial_state).unwrap();
        // Q(init, pour) = 0.8·V(served) + 0.2·V(spilled) = 0.8·1 + 0.2·0,
        // the spilled dead end having no applicable action keeps value 0
        assert!((v0 - cfg.discount * 0.8).abs() < 1e-6);
    }
}
