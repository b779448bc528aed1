//! Breadth-first search for a shortest plan over deterministic ground actions.

use crate::ground::state::{Lit, Op, Operators, State};
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;
use tracing::debug;

/// A node in the search space: a state together with the action that produced
/// it and a link to its predecessor. The provenance chain doubles as the plan
/// representation, so no per-node path array is stored.
struct Node {
    state: State,
    parent: Option<Rc<Node>>,
    /// Action applied in the parent to reach this node; None for the root.
    op: Option<Op>,
}

impl Node {
    /// Walks the parent chain back to the root and returns the actions in
    /// execution order.
    fn extract_plan(&self) -> Vec<Op> {
        let mut plan = Vec::new();
        let mut curr = self;
        loop {
            if let Some(op) = curr.op {
                plan.push(op);
            }
            match &curr.parent {
                Some(parent) => curr = parent,
                None => break,
            }
        }
        plan.reverse();
        plan
    }
}

/// Searches for a plan reaching a state that satisfies `goals`.
///
/// Uninformed breadth-first exploration: all edges have unit cost, so the
/// first solution found uses the minimum number of actions. Returns the empty
/// plan when the initial state already satisfies the goal, and None when the
/// frontier is exhausted without reaching one — an expected outcome, not an
/// error.
///
/// Operators are assumed deterministic (a single outcome branch); callers
/// solving probabilistic models use value iteration instead.
pub fn plan_search(initial_state: &State, ops: &Operators, goals: &[Lit]) -> Option<Vec<Op>> {
    if initial_state.entails_all(goals) {
        return Some(Vec::new());
    }
    debug!(operators = ops.len(), "starting breadth-first search");

    let mut visited: HashSet<State> = HashSet::new();
    visited.insert(initial_state.clone());
    let mut frontier: VecDeque<Rc<Node>> = VecDeque::new();
    frontier.push_back(Rc::new(Node {
        state: initial_state.clone(),
        parent: None,
        op: None,
    }));

    while let Some(n) = frontier.pop_front() {
        for op in ops.iter() {
            let operator = &ops[op];
            debug_assert!(operator.is_deterministic());
            if !n.state.entails_all(&operator.precond) {
                continue;
            }
            let succ = n.state.successor(&operator.outcomes[0].effects);
            if visited.contains(&succ) {
                continue;
            }
            let node = Node {
                state: succ,
                parent: Some(n.clone()),
                op: Some(op),
            };
            if node.state.entails_all(goals) {
                let plan = node.extract_plan();
                debug!(
                    length = plan.len(),
                    explored = visited.len(),
                    "found a shortest plan"
                );
                return Some(plan);
            }
            visited.insert(node.state.clone());
            frontier.push_back(Rc::new(node));
        }
    }
    debug!(explored = visited.len(), "search space exhausted, no plan");
    None
}
