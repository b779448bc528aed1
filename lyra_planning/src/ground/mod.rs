//! Instantiation of the loaded model and grounding of action schemas.
//!
//! [`instantiate`] resolves a [`Domain`]/[`Problem`] pair against a fresh
//! symbol table and ground-atom universe, producing a [`LiftedProblem`].
//! [`ground_problem`] then replaces every schema variable with every concrete
//! object combination, yielding the [`GroundProblem`] that both solvers
//! consume.

use crate::model::{ActionTemplate, Domain, Problem};
use crate::prob::{check_feasible, settle, ProbSpec};
use crate::symbols::{SymbolTable, SymId};
use crate::typesystem::{TypeHierarchy, TypeId};
use crate::utils::enumerate;
use anyhow::{ensure, Context, Result};
use rand::Rng;
use streaming_iterator::StreamingIterator;
use tracing::debug;

pub mod state;

use state::{Lit, Operator, Operators, Outcome, Predicate, State, World};

/// Builtin root type under which predicate symbols are interned.
const PREDICATE_TYPE: &str = "predicate";
/// Builtin root type under which action symbols are interned.
const ACTION_TYPE: &str = "action";
/// Root of the object forest; objects and types with no declared type attach here.
const OBJECT_TYPE: &str = "object";

/// A value in an atom template that is either a fixed symbol or a hole to be
/// filled by the n-th action parameter.
#[derive(Copy, Clone, Ord, PartialOrd, PartialEq, Eq, Debug)]
pub enum Holed<A> {
    /// Value is fixed.
    Full(A),
    /// Value is the one assigned to the n-th parameter.
    Param(usize),
}

/// An atom template of a schema: predicate and arguments with parameter holes,
/// together with the truth value it requires or establishes.
#[derive(Debug, Clone)]
pub struct ParameterizedPred {
    pub positive: bool,
    pub sexpr: Vec<Holed<SymId>>,
}

impl ParameterizedPred {
    /// Resolves the template against a parameter assignment. Returns None
    /// when the resulting atom does not exist in the typed universe.
    pub fn bind(&self, world: &World, params: &[SymId], working: &mut Vec<SymId>) -> Option<Lit> {
        working.clear();
        for x in &self.sexpr {
            working.push(match *x {
                Holed::Param(i) => params[i],
                Holed::Full(s) => s,
            });
        }
        world.sv_id(working).map(|sv| Lit::new(sv, self.positive))
    }
}

/// One outcome branch of a schema: its probability annotation and its effect
/// templates, delete effects ordered before add effects.
#[derive(Debug, Clone)]
pub struct OutcomeTemplate {
    pub prob: ProbSpec,
    pub effects: Vec<ParameterizedPred>,
}

/// An action schema resolved against the symbol table, ready for grounding.
#[derive(Debug, Clone)]
pub struct ActionSchema {
    pub name: SymId,
    /// Type of each parameter, in declaration order.
    pub params: Vec<TypeId>,
    pub pre: Vec<ParameterizedPred>,
    pub outcomes: Vec<OutcomeTemplate>,
}

/// The fully resolved but still parameterized problem.
#[derive(Debug)]
pub struct LiftedProblem {
    pub world: World,
    pub initial_state: State,
    pub goals: Vec<Lit>,
    pub actions: Vec<ActionSchema>,
}

/// The problem after grounding: the input of both solvers.
pub struct GroundProblem {
    pub initial_state: State,
    pub operators: Operators,
    pub goals: Vec<Lit>,
}

/// Resolves the loaded model into a [`LiftedProblem`], raising every model
/// error: domain/problem name mismatch, redefined or unknown types and
/// symbols, and malformed precondition/effect expressions.
pub fn instantiate(domain: &Domain, problem: &Problem) -> Result<LiftedProblem> {
    ensure!(
        problem.domain == domain.name,
        "Problem {} is declared for domain {}, not {}",
        problem.name,
        problem.domain,
        domain.name
    );

    let types = type_hierarchy(domain)?;

    let mut instances: Vec<(String, String)> = Vec::new();
    for pred in &domain.predicates {
        instances.push((pred.name.clone(), PREDICATE_TYPE.to_string()));
    }
    for action in &domain.actions {
        instances.push((action.name.clone(), ACTION_TYPE.to_string()));
    }
    for (obj, tpe) in domain.constants.iter().chain(&problem.objects) {
        instances.push((obj.clone(), tpe.clone()));
    }
    let table = SymbolTable::new(types, instances)?;

    let mut predicates = Vec::with_capacity(domain.predicates.len());
    for decl in &domain.predicates {
        let mut params = Vec::with_capacity(decl.params.len());
        for tpe in &decl.params {
            params.push(
                table
                    .types
                    .id_of(tpe)
                    .with_context(|| format!("Unrecognized type {tpe} in predicate {}", decl.name))?,
            );
        }
        predicates.push(Predicate {
            sym: table.id(&decl.name).unwrap(),
            params,
        });
    }
    let world = World::new(table, &predicates)?;
    debug!(atoms = world.num_atoms(), "built ground-atom universe");

    let mut initial_state = world.make_new_state();
    for atom in &problem.init {
        let lit = ground_lit(&world, atom, true).context("In the initial state")?;
        initial_state.set(lit);
    }

    let mut goals = Vec::with_capacity(problem.positive_goals.len() + problem.negative_goals.len());
    for atom in &problem.positive_goals {
        goals.push(ground_lit(&world, atom, true).context("In the goal")?);
    }
    for atom in &problem.negative_goals {
        goals.push(ground_lit(&world, atom, false).context("In the goal")?);
    }

    let mut actions = Vec::with_capacity(domain.actions.len());
    for template in &domain.actions {
        actions.push(action_schema(template, &world)?);
    }

    Ok(LiftedProblem {
        world,
        initial_state,
        goals,
        actions,
    })
}

/// Builds the type forest: builtin roots, declared types, and supertypes that
/// are referenced without being declared themselves (they become roots).
fn type_hierarchy(domain: &Domain) -> Result<TypeHierarchy> {
    let mut decls: Vec<(String, Option<String>)> = vec![
        (PREDICATE_TYPE.to_string(), None),
        (ACTION_TYPE.to_string(), None),
        (OBJECT_TYPE.to_string(), None),
    ];
    for (tpe, sup) in &domain.types {
        let sup = sup.clone().unwrap_or_else(|| OBJECT_TYPE.to_string());
        decls.push((tpe.clone(), Some(sup)));
    }
    for (_, sup) in &domain.types {
        if let Some(sup) = sup {
            if decls.iter().all(|d| &d.0 != sup) {
                decls.push((sup.clone(), None));
            }
        }
    }
    TypeHierarchy::new(decls)
}

/// Resolves a ground atom written as tokens into a literal with the given value.
fn ground_lit(world: &World, tokens: &[String], value: bool) -> Result<Lit> {
    let mut atom = Vec::with_capacity(tokens.len());
    for token in tokens {
        atom.push(
            world
                .table
                .id(token)
                .with_context(|| format!("Unknown symbol {token} in atom ({})", tokens.join(" ")))?,
        );
    }
    let sv = world
        .sv_id(&atom)
        .with_context(|| format!("No such ground atom ({}) (possible typing error)", tokens.join(" ")))?;
    Ok(Lit::new(sv, value))
}

fn action_schema(template: &ActionTemplate, world: &World) -> Result<ActionSchema> {
    let table = &world.table;
    let mut params = Vec::with_capacity(template.params.len());
    let mut param_names = Vec::with_capacity(template.params.len());
    for (var, tpe) in &template.params {
        let tpe = table.types.id_of(tpe).with_context(|| {
            format!("Unrecognized type {tpe} for parameter {var} of action {}", template.name)
        })?;
        params.push(tpe);
        param_names.push(var.as_str());
    }

    let pred = |positive: bool, tokens: &[String]| -> Result<ParameterizedPred> {
        let mut sexpr = Vec::with_capacity(tokens.len());
        for token in tokens {
            let x = match param_names.iter().position(|&p| p == token.as_str()) {
                Some(i) => Holed::Param(i),
                None if token.starts_with('?') => {
                    anyhow::bail!("Unbound variable {token} in action {}", template.name)
                }
                None => Holed::Full(table.id(token).with_context(|| {
                    format!("Unknown symbol {token} in action {}", template.name)
                })?),
            };
            sexpr.push(x);
        }
        Ok(ParameterizedPred { positive, sexpr })
    };

    let mut pre = Vec::with_capacity(template.positive_pre.len() + template.negative_pre.len());
    for atom in &template.positive_pre {
        pre.push(pred(true, atom)?);
    }
    for atom in &template.negative_pre {
        pre.push(pred(false, atom)?);
    }

    let mut outcomes = Vec::with_capacity(template.outcomes.len());
    for branch in &template.outcomes {
        let mut effects = Vec::with_capacity(branch.add.len() + branch.del.len());
        // delete effects first so that an atom both deleted and added ends up added
        for atom in &branch.del {
            effects.push(pred(false, atom)?);
        }
        for atom in &branch.add {
            effects.push(pred(true, atom)?);
        }
        outcomes.push(OutcomeTemplate {
            prob: branch.prob,
            effects,
        });
    }

    Ok(ActionSchema {
        name: table.id(&template.name).unwrap(),
        params,
        pre,
        outcomes,
    })
}

/// Grounds every action schema and assembles the solver input.
pub fn ground_problem<R: Rng>(lifted: &LiftedProblem, rng: &mut R) -> Result<GroundProblem> {
    let mut operators = Operators::new();
    for schema in &lifted.actions {
        ground_action_schema(schema, &lifted.world, rng, &mut operators)?;
    }
    debug!(operators = operators.len(), "grounding complete");
    Ok(GroundProblem {
        initial_state: lifted.initial_state.clone(),
        operators,
        goals: lifted.goals.clone(),
    })
}

/// Instantiates one schema: for every assignment in the Cartesian product of
/// the parameter type extensions (lexicographic order, one empty assignment
/// for a zero-parameter schema), binds the templates and settles the branch
/// probabilities.
fn ground_action_schema<R: Rng>(
    schema: &ActionSchema,
    world: &World,
    rng: &mut R,
    operators: &mut Operators,
) -> Result<()> {
    let specs: Vec<ProbSpec> = schema.outcomes.iter().map(|o| o.prob).collect();
    // an unsatisfiable probability configuration aborts before any grounding
    check_feasible(&specs).with_context(|| format!("In action {}", world.table.symbol(schema.name)))?;

    let mut arg_instances = Vec::with_capacity(schema.params.len());
    for &tpe in &schema.params {
        arg_instances.push(world.table.instances_of_type(tpe));
    }
    let mut assignments = enumerate(arg_instances);
    let mut working = Vec::new();
    let mut count = 0usize;

    'assignments: while let Some(params) = assignments.next() {
        let mut name = Vec::with_capacity(params.len() + 1);
        name.push(schema.name);
        name.extend_from_slice(params);

        let mut precond = Vec::with_capacity(schema.pre.len());
        for p in &schema.pre {
            match p.bind(world, params, &mut working) {
                Some(lit) => precond.push(lit),
                // the atom is outside the typed universe: a positive
                // precondition can then never hold, a negative one always does
                None if p.positive => continue 'assignments,
                None => {}
            }
        }

        let probabilities = settle(&specs, rng)
            .with_context(|| format!("In action {}", world.table.symbol(schema.name)))?;
        let mut outcomes = Vec::with_capacity(schema.outcomes.len());
        for (template, probability) in schema.outcomes.iter().zip(probabilities) {
            let mut effects = Vec::with_capacity(template.effects.len());
            for eff in &template.effects {
                match eff.bind(world, params, &mut working) {
                    Some(lit) => effects.push(lit),
                    // adding an atom outside the universe is unreachable,
                    // deleting one is a no-op
                    None if eff.positive => continue 'assignments,
                    None => {}
                }
            }
            outcomes.push(Outcome {
                probability,
                effects,
            });
        }

        operators.push(Operator {
            name,
            precond,
            outcomes,
        });
        count += 1;
    }
    debug!(
        action = world.table.symbol(schema.name),
        instances = count,
        "grounded action schema"
    );
    Ok(())
}
