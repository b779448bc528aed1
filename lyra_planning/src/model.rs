//! Loaded, immutable representation of a domain and a problem instance.
//!
//! These structs are what the parser hands over and what the solvers accept:
//! plain names and token lists, with no interning or typing resolution yet.
//! Instantiation into a ground-atom world happens in [`crate::problem`].

use crate::prob::ProbSpec;

/// A predicate or goal atom as written in the input: predicate name followed
/// by argument tokens (objects or `?variables`).
pub type AtomTokens = Vec<String>;

#[derive(Debug, Clone)]
pub struct PredicateDecl {
    pub name: String,
    /// Declared type of each parameter slot.
    pub params: Vec<String>,
}

/// One probabilistic outcome of an action, before grounding.
#[derive(Debug, Clone)]
pub struct EffectTemplate {
    pub prob: ProbSpec,
    pub add: Vec<AtomTokens>,
    pub del: Vec<AtomTokens>,
}

/// A parameterized action as declared in the domain.
#[derive(Debug, Clone)]
pub struct ActionTemplate {
    pub name: String,
    /// `(?variable, type)` pairs in declaration order.
    pub params: Vec<(String, String)>,
    pub positive_pre: Vec<AtomTokens>,
    pub negative_pre: Vec<AtomTokens>,
    /// Outcome branches; a deterministic action has a single branch with
    /// probability 1.
    pub outcomes: Vec<EffectTemplate>,
}

#[derive(Debug, Clone)]
pub struct Domain {
    pub name: String,
    pub requirements: Vec<String>,
    /// `(type, declared supertype)` pairs; `None` means the type was listed
    /// without a supertype and attaches to the root object type.
    pub types: Vec<(String, Option<String>)>,
    /// `(object, type)` pairs from the `:constants` section.
    pub constants: Vec<(String, String)>,
    pub predicates: Vec<PredicateDecl>,
    pub actions: Vec<ActionTemplate>,
}

#[derive(Debug, Clone)]
pub struct Problem {
    pub name: String,
    /// Name of the domain this problem instantiates.
    pub domain: String,
    /// `(object, type)` pairs from the `:objects` section.
    pub objects: Vec<(String, String)>,
    pub init: Vec<AtomTokens>,
    pub positive_goals: Vec<AtomTokens>,
    pub negative_goals: Vec<AtomTokens>,
}
