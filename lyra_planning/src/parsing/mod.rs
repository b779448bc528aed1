//! Loader for the textual domain/problem format.
//!
//! Walks the s-expression tree of a domain (`define (domain …)`) or problem
//! (`define (problem …)`) and produces the immutable model structs of
//! [`crate::model`]. Anything the loader does not recognize is a fatal error:
//! there is no print-and-continue fallback for unknown sections.

pub mod sexpr;

use crate::model::{ActionTemplate, AtomTokens, Domain, EffectTemplate, PredicateDecl, Problem};
use crate::parsing::sexpr::Expr;
use crate::prob::ProbSpec;
use anyhow::{bail, ensure, Context, Result};
use std::path::{Path, PathBuf};

/// Requirement tokens the engine understands. Any other token in a
/// `:requirements` section is a fatal model error.
pub const SUPPORTED_REQUIREMENTS: &[&str] = &[
    ":strips",
    ":negative-preconditions",
    ":typing",
    ":probabilistic-effects",
    ":conditional-effects",
    ":rewards",
    ":imprecise",
];

pub fn parse_domain(input: &str) -> Result<Domain> {
    let groups = define_groups(input, "domain")?;

    let mut domain = Domain {
        name: "unknown".to_string(),
        requirements: Vec::new(),
        types: Vec::new(),
        constants: Vec::new(),
        predicates: Vec::new(),
        actions: Vec::new(),
    };

    for group in groups {
        let items = group.as_list().context("Malformed domain section")?;
        let head = items
            .first()
            .and_then(Expr::as_atom)
            .context("Malformed domain section")?;
        let body = &items[1..];
        match head {
            "domain" => {
                domain.name = single_atom(body).context("Malformed domain name")?.to_string();
            }
            ":requirements" => {
                for req in body {
                    let req = req.as_atom().context("Malformed requirement")?;
                    ensure!(
                        SUPPORTED_REQUIREMENTS.contains(&req),
                        "Requirement {req} not supported"
                    );
                    domain.requirements.push(req.to_string());
                }
            }
            ":types" => domain.types.extend(parse_types(body)?),
            ":constants" => domain.constants.extend(typed_list(body, "constants")?),
            ":predicates" => {
                for pred in body {
                    let decl = parse_predicate(pred)?;
                    ensure!(
                        domain.predicates.iter().all(|p| p.name != decl.name),
                        "Predicate {} redefined",
                        decl.name
                    );
                    domain.predicates.push(decl);
                }
            }
            ":action" => {
                let action = parse_action(body)?;
                ensure!(
                    domain.actions.iter().all(|a| a.name != action.name),
                    "Action {} redefined",
                    action.name
                );
                domain.actions.push(action);
            }
            _ => bail!("'{head}' is not recognized in domain"),
        }
    }
    Ok(domain)
}

pub fn parse_problem(input: &str) -> Result<Problem> {
    let groups = define_groups(input, "problem")?;

    let mut problem = Problem {
        name: "unknown".to_string(),
        domain: String::new(),
        objects: Vec::new(),
        init: Vec::new(),
        positive_goals: Vec::new(),
        negative_goals: Vec::new(),
    };

    for group in groups {
        let items = group.as_list().context("Malformed problem section")?;
        let head = items
            .first()
            .and_then(Expr::as_atom)
            .context("Malformed problem section")?;
        let body = &items[1..];
        match head {
            "problem" => {
                problem.name = single_atom(body).context("Malformed problem name")?.to_string();
            }
            ":domain" => {
                problem.domain = single_atom(body).context("Malformed :domain section")?.to_string();
            }
            // requirements are validated on the domain side
            ":requirements" => {}
            ":objects" => problem.objects.extend(typed_list(body, "objects")?),
            ":init" => {
                for atom in body {
                    problem.init.push(atom_tokens(atom).context("Malformed :init atom")?);
                }
            }
            ":goal" => {
                let goal = single_expr(body).context("Malformed :goal section")?;
                let (pos, neg) = split_predicates(goal, "goals")?;
                problem.positive_goals.extend(pos);
                problem.negative_goals.extend(neg);
            }
            _ => bail!("'{head}' is not recognized in problem"),
        }
    }
    Ok(problem)
}

/// Looks for a domain file next to the problem file (or in its parent
/// directory): `domain.<ext>` or `<problem-stem>-domain.<ext>`.
pub fn find_domain_of(problem_file: &Path) -> Result<PathBuf> {
    let ext = problem_file
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("pddl");
    let mut candidates = vec![format!("domain.{ext}")];
    if let Some(stem) = problem_file.file_stem().and_then(|s| s.to_str()) {
        candidates.push(format!("{stem}-domain.{ext}"));
    }
    let parent = problem_file.parent();
    for dir in [parent, parent.and_then(Path::parent)].into_iter().flatten() {
        for candidate in &candidates {
            let path = dir.join(candidate);
            if path.exists() {
                return Ok(path);
            }
        }
    }
    bail!("No domain file found next to {}", problem_file.display())
}

/// Parses the input as `(define <groups>…)` and checks that the first group
/// starts with the expected keyword (`domain` or `problem`).
fn define_groups(input: &str, kind: &str) -> Result<Vec<Expr>> {
    let e = sexpr::parse(input)?;
    let groups = e
        .application_args("define")
        .with_context(|| format!("Input does not match the {kind} pattern"))?;
    let first = groups
        .first()
        .and_then(Expr::as_list)
        .and_then(|g| g.first())
        .and_then(Expr::as_atom);
    ensure!(
        first == Some(kind),
        "Input does not match the {kind} pattern"
    );
    Ok(groups.to_vec())
}

fn single_expr(body: &[Expr]) -> Result<&Expr> {
    ensure!(body.len() == 1, "Expected exactly one expression");
    Ok(&body[0])
}

fn single_atom(body: &[Expr]) -> Result<&str> {
    single_expr(body)?.as_atom().context("Expected an atom")
}

/// Flat list of atoms, e.g. a ground atom `(at r1 kitchen)`.
fn atom_tokens(e: &Expr) -> Result<AtomTokens> {
    let items = e.as_list().with_context(|| format!("Expected an atom list: {e}"))?;
    ensure!(!items.is_empty(), "Empty atom");
    items
        .iter()
        .map(|i| i.as_atom().map(str::to_string).with_context(|| format!("Expected an atom in {e}")))
        .collect()
}

/// Parses a hyphen-typed list `n1 n2 - t1 n3 - t2 n4 …`; names with no
/// declared type default to `object`.
fn typed_list(body: &[Expr], what: &str) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    let mut untyped: Vec<String> = Vec::new();
    let mut items = body.iter();
    while let Some(item) = items.next() {
        let token = item.as_atom().with_context(|| format!("Malformed {what} list"))?;
        if token == "-" {
            ensure!(!untyped.is_empty(), "Unexpected hyphen in {what}");
            let tpe = items
                .next()
                .and_then(Expr::as_atom)
                .with_context(|| format!("Missing type after hyphen in {what}"))?;
            for name in untyped.drain(..) {
                out.push((name, tpe.to_string()));
            }
        } else {
            untyped.push(token.to_string());
        }
    }
    for name in untyped {
        out.push((name, "object".to_string()));
    }
    Ok(out)
}

/// Same syntax as [`typed_list`], but for the `:types` section: entries with
/// no declared supertype are reported as `None` and attach to the root type.
fn parse_types(body: &[Expr]) -> Result<Vec<(String, Option<String>)>> {
    Ok(typed_list(body, "types")?
        .into_iter()
        .map(|(t, sup)| {
            let sup = if sup == "object" { None } else { Some(sup) };
            (t, sup)
        })
        .collect())
}

fn parse_predicate(e: &Expr) -> Result<PredicateDecl> {
    let items = e.as_list().context("Malformed predicate declaration")?;
    let name = items
        .first()
        .and_then(Expr::as_atom)
        .context("Predicate without a name")?;
    let params = typed_list(&items[1..], "predicates")?
        .into_iter()
        .map(|(_, tpe)| tpe)
        .collect();
    Ok(PredicateDecl {
        name: name.to_string(),
        params,
    })
}

fn parse_action(body: &[Expr]) -> Result<ActionTemplate> {
    let mut items = body.iter();
    let name = items
        .next()
        .and_then(Expr::as_atom)
        .context("Action without name definition")?;

    let mut action = ActionTemplate {
        name: name.to_string(),
        params: Vec::new(),
        positive_pre: Vec::new(),
        negative_pre: Vec::new(),
        outcomes: Vec::new(),
    };

    while let Some(key) = items.next() {
        let key = key
            .as_atom()
            .with_context(|| format!("Malformed section in action {name}"))?;
        let value = items
            .next()
            .with_context(|| format!("Missing value for {key} in action {name}"))?;
        match key {
            ":parameters" => {
                let params = value
                    .as_list()
                    .with_context(|| format!("Error with {name} parameters"))?;
                action.params = typed_list(params, "parameters")?;
            }
            ":precondition" => {
                let (pos, neg) = split_predicates(value, "preconditions")?;
                action.positive_pre = pos;
                action.negative_pre = neg;
            }
            ":effect" => action.outcomes = parse_effects(value, name)?,
            _ => bail!("'{key}' is not recognized in action {name}"),
        }
    }
    if action.outcomes.is_empty() {
        // an action with no effect section still has its single certain branch
        action.outcomes.push(EffectTemplate {
            prob: ProbSpec::Precise(1.0),
            add: Vec::new(),
            del: Vec::new(),
        });
    }
    Ok(action)
}

/// Splits a condition into positive and negative atoms: either a single
/// atom list, or an `and` of atom lists, each optionally wrapped in `not`.
fn split_predicates(e: &Expr, part: &str) -> Result<(Vec<AtomTokens>, Vec<AtomTokens>)> {
    let mut positive = Vec::new();
    let mut negative = Vec::new();
    let group: Vec<&Expr> = match e.application_args("and") {
        Some(args) => args.iter().collect(),
        None => vec![e],
    };
    for pred in group {
        match pred.application_args("not") {
            Some(inner) => {
                ensure!(inner.len() == 1, "Unexpected not in {part}");
                negative.push(atom_tokens(&inner[0])?);
            }
            None => {
                let items = pred.as_list().with_context(|| format!("Malformed {part}"))?;
                if !items.is_empty() {
                    positive.push(atom_tokens(pred)?);
                }
            }
        }
    }
    Ok((positive, negative))
}

/// Parses an effect body: a plain conjunction (one certain branch), a
/// `(probabilistic p1 (e1) p2 (e2) …)` form, or an
/// `(imprecise (lo1 hi1) (e1) …)` form where interval annotations may mix
/// with precise ones.
fn parse_effects(e: &Expr, action: &str) -> Result<Vec<EffectTemplate>> {
    if let Some(args) = e.application_args("probabilistic") {
        return branch_list(args, action, |spec| {
            let p = spec
                .as_atom()
                .with_context(|| format!("Malformed probability in action {action}"))?;
            Ok(ProbSpec::Precise(parse_prob(p)?))
        });
    }
    if let Some(args) = e.application_args("imprecise") {
        return branch_list(args, action, |spec| match spec {
            Expr::Atom(p) => Ok(ProbSpec::Precise(parse_prob(p)?)),
            Expr::List(bounds) => {
                ensure!(
                    bounds.len() == 2,
                    "Expected a (low high) probability interval in action {action}"
                );
                let a = parse_prob(bounds[0].as_atom().context("Malformed interval bound")?)?;
                let b = parse_prob(bounds[1].as_atom().context("Malformed interval bound")?)?;
                // bounds may be listed in either order
                Ok(ProbSpec::Interval(a.min(b), a.max(b)))
            }
        });
    }
    let (add, del) = split_predicates(e, "effects")?;
    Ok(vec![EffectTemplate {
        prob: ProbSpec::Precise(1.0),
        add,
        del,
    }])
}

/// Parses an alternation of probability annotations and effect bodies.
fn branch_list(
    args: &[Expr],
    action: &str,
    mut prob_of: impl FnMut(&Expr) -> Result<ProbSpec>,
) -> Result<Vec<EffectTemplate>> {
    ensure!(
        args.len() % 2 == 0,
        "Effects of action {action} must alternate probabilities and effect groups"
    );
    let mut out = Vec::with_capacity(args.len() / 2);
    for pair in args.chunks(2) {
        let prob = prob_of(&pair[0])?;
        let (add, del) = split_predicates(&pair[1], "effects")?;
        out.push(EffectTemplate { prob, add, del });
    }
    Ok(out)
}

/// Parses a probability literal: a decimal (`0.25`) or a fraction (`1/4`).
fn parse_prob(token: &str) -> Result<f64> {
    let value = match token.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().with_context(|| format!("Invalid probability {token}"))?;
            let den: f64 = den.parse().with_context(|| format!("Invalid probability {token}"))?;
            ensure!(den != 0.0, "Invalid probability {token}");
            num / den
        }
        None => token.parse().with_context(|| format!("Invalid probability {token}"))?,
    };
    ensure!(
        (0.0..=1.0).contains(&value),
        "Probability {token} is outside [0, 1]"
    );
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn loads_the_dinner_domain() {
        let dom = parse_domain(DINNER_DOMAIN).unwrap();
        assert_eq!(dom.name, "dinner");
        assert_eq!(dom.requirements, vec![":strips"]);
        assert_eq!(dom.predicates.len(), 5);
        assert_eq!(dom.actions.len(), 4);

        let carry = &dom.actions[2];
        assert_eq!(carry.name, "carry");
        assert!(carry.params.is_empty());
        assert_eq!(carry.positive_pre, vec![vec!["garbage".to_string()]]);
        assert_eq!(carry.outcomes.len(), 1);
        assert_eq!(carry.outcomes[0].prob, ProbSpec::Precise(1.0));
        assert!(carry.outcomes[0].add.is_empty());
        assert_eq!(carry.outcomes[0].del.len(), 2);
    }

    #[test]
    fn loads_typed_parameters_and_objects() {
        let dom = parse_domain(
            "(define (domain move)
               (:requirements :strips :typing)
               (:types robot room - object)
               (:predicates (at ?r - robot ?l - room) (connected ?a ?b - room))
               (:action go :parameters (?r - robot ?from ?to - room)
                 :precondition (and (at ?r ?from) (connected ?from ?to))
                 :effect (and (at ?r ?to) (not (at ?r ?from)))))",
        )
        .unwrap();
        assert_eq!(
            dom.types,
            vec![("robot".to_string(), None), ("room".to_string(), None)]
        );
        assert_eq!(dom.predicates[0].params, vec!["robot", "room"]);
        assert_eq!(dom.predicates[1].params, vec!["room", "room"]);
        let go = &dom.actions[0];
        assert_eq!(
            go.params,
            vec![
                ("?r".to_string(), "robot".to_string()),
                ("?from".to_string(), "room".to_string()),
                ("?to".to_string(), "room".to_string()),
            ]
        );

        let prob = parse_problem(
            "(define (problem move-1) (:domain move)
               (:objects r1 - robot kitchen hall - room)
               (:init (at r1 kitchen) (connected kitchen hall))
               (:goal (at r1 hall)))",
        )
        .unwrap();
        assert_eq!(prob.name, "move-1");
        assert_eq!(prob.domain, "move");
        assert_eq!(prob.objects.len(), 3);
        assert_eq!(prob.init.len(), 2);
        assert_eq!(prob.positive_goals, vec![vec!["at", "r1", "hall"]]);
        assert!(prob.negative_goals.is_empty());
    }

    #[test]
    fn loads_probabilistic_and_imprecise_effects() {
        let dom = parse_domain(
            "(define (domain coffee)
               (:requirements :strips :probabilistic-effects :imprecise)
               (:predicates (served) (spilled))
               (:action pour :parameters ()
                 :effect (probabilistic 3/4 (served) 0.25 (spilled)))
               (:action rush :parameters ()
                 :effect (imprecise (0.6 0.2) (served) 0.1 (spilled))))",
        )
        .unwrap();
        let pour = &dom.actions[0];
        assert_eq!(pour.outcomes.len(), 2);
        assert_eq!(pour.outcomes[0].prob, ProbSpec::Precise(0.75));
        assert_eq!(pour.outcomes[1].prob, ProbSpec::Precise(0.25));

        let rush = &dom.actions[1];
        // interval bounds are normalized to (low, high)
        assert_eq!(rush.outcomes[0].prob, ProbSpec::Interval(0.2, 0.6));
        assert_eq!(rush.outcomes[1].prob, ProbSpec::Precise(0.1));
    }

    #[test]
    fn unsupported_requirement_is_fatal() {
        let err = parse_domain("(define (domain d) (:requirements :adl))").unwrap_err();
        assert!(err.to_string().contains(":adl"));
    }

    #[test]
    fn unknown_sections_are_fatal() {
        assert!(parse_domain("(define (domain d) (:functions (cost)))").is_err());
        assert!(parse_problem("(define (problem p) (:metric minimize))").is_err());
    }

    #[test]
    fn redefinitions_are_fatal() {
        assert!(parse_domain(
            "(define (domain d) (:predicates (a) (a)))"
        )
        .is_err());
        assert!(parse_domain(
            "(define (domain d)
               (:action noop :parameters ())
               (:action noop :parameters ()))"
        )
        .is_err());
    }

    #[test]
    fn not_takes_exactly_one_atom() {
        let err = parse_domain(
            "(define (domain d) (:predicates (a) (b))
               (:action bad :parameters () :precondition (not (a) (b)) :effect (a)))",
        )
        .unwrap_err();
        assert!(err.to_string().contains("not"));
    }

    #[test]
    fn hyphen_without_names_is_an_error() {
        assert!(parse_problem("(define (problem p) (:objects - room))").is_err());
    }
}
