use crate::prob::sample_index;
use crate::symbols::{ContiguousSymbols, SymbolTable, SymId};
use crate::typesystem::TypeId;
use crate::utils::enumerate;
use anyhow::Result;
use fixedbitset::FixedBitSet;
use itertools::Itertools;
use rand::Rng;
use std::collections::HashMap;
use std::ops::Index;
use streaming_iterator::StreamingIterator;

/// Compact, numeric representation of a ground atom.
///
/// A ground atom is a predicate applied to concrete objects, such as
/// `(at r1 kitchen)`. Its id indexes the bit representing it in a [`State`].
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub struct SvId(u32);

impl From<SvId> for usize {
    fn from(sv: SvId) -> Self {
        sv.0 as usize
    }
}
impl From<usize> for SvId {
    fn from(i: usize) -> Self {
        SvId(i as u32)
    }
}

/// Association of a ground atom with a boolean value.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub struct Lit {
    var: SvId,
    value: bool,
}

impl Lit {
    pub fn new(var: SvId, value: bool) -> Lit {
        Lit { var, value }
    }

    pub fn var(self) -> SvId {
        self.var
    }

    pub fn val(self) -> bool {
        self.value
    }
}

impl std::ops::Not for Lit {
    type Output = Lit;
    fn not(self) -> Lit {
        Lit::new(self.var, !self.value)
    }
}

/// A predicate schema resolved against the symbol table: its interned name
/// and the declared type of each parameter slot.
#[derive(Debug, Clone)]
pub struct Predicate {
    pub sym: SymId,
    pub params: Vec<TypeId>,
}

/// The universe of ground atoms that can appear in a state.
///
/// Built once per problem by enumerating, for every predicate, the Cartesian
/// product of its parameter type extensions. Immutable afterwards.
#[derive(Clone, Debug)]
pub struct World {
    pub table: SymbolTable,
    /// Atom tuples (predicate symbol followed by argument symbols) in id order.
    atoms: Vec<Box<[SymId]>>,
    ids: HashMap<Box<[SymId]>, SvId>,
}

impl World {
    pub fn new(table: SymbolTable, predicates: &[Predicate]) -> Result<World> {
        let mut world = World {
            table,
            atoms: Vec::new(),
            ids: HashMap::new(),
        };
        for pred in predicates {
            let mut generators = Vec::with_capacity(1 + pred.params.len());
            generators.push(ContiguousSymbols::singleton(pred.sym));
            for &tpe in &pred.params {
                generators.push(world.table.instances_of_type(tpe));
            }
            let mut instances = enumerate(generators);
            while let Some(atom) = instances.next() {
                let atom: Box<[SymId]> = atom.into();
                debug_assert!(!world.ids.contains_key(&atom));
                world.ids.insert(atom.clone(), SvId::from(world.atoms.len()));
                world.atoms.push(atom);
            }
        }
        Ok(world)
    }

    /// Id of the given ground atom, or None if it is outside the typed universe.
    pub fn sv_id(&self, atom: &[SymId]) -> Option<SvId> {
        self.ids.get(atom).copied()
    }

    /// The atom tuple associated with the given id.
    pub fn atom(&self, sv: SvId) -> &[SymId] {
        &self.atoms[usize::from(sv)]
    }

    pub fn num_atoms(&self) -> usize {
        self.atoms.len()
    }

    /// A state over this universe with every atom false.
    pub fn make_new_state(&self) -> State {
        State {
            svs: FixedBitSet::with_capacity(self.atoms.len()),
        }
    }

    pub fn format_atom(&self, sv: SvId) -> String {
        self.table.format(self.atom(sv))
    }

    /// Formats a state as the set of its true atoms, e.g. `{(clean) (quiet)}`.
    pub fn format_state(&self, state: &State) -> String {
        format!("{{{}}}", state.entailed_atoms().map(|sv| self.format_atom(sv)).join(" "))
    }
}

/// Association of each ground atom to a boolean value, under the closed-world
/// assumption: an unset atom is false.
///
/// States are values: equality and hashing are structural, and transitions
/// build a new state instead of mutating the source.
#[derive(Clone, Debug, Ord, PartialOrd, PartialEq, Eq, Hash)]
pub struct State {
    /// The i-th bit holds the value of the atom with id i.
    svs: FixedBitSet,
}

impl State {
    pub fn is_set(&self, sv: SvId) -> bool {
        self.svs.contains(sv.into())
    }

    pub fn set_to(&mut self, sv: SvId, value: bool) {
        self.svs.set(sv.into(), value)
    }

    pub fn set(&mut self, lit: Lit) {
        self.set_to(lit.var(), lit.val());
    }

    /// Applies the literals in order; for an atom that appears with both
    /// values, the last occurrence wins.
    pub fn set_all(&mut self, lits: &[Lit]) {
        lits.iter().for_each(|&l| self.set(l));
    }

    pub fn entails(&self, lit: Lit) -> bool {
        self.is_set(lit.var()) == lit.val()
    }

    pub fn entails_all(&self, lits: &[Lit]) -> bool {
        lits.iter().all(|&l| self.entails(l))
    }

    /// All atoms that are true in this state.
    pub fn entailed_atoms(&self) -> impl Iterator<Item = SvId> + '_ {
        self.svs.ones().map(SvId::from)
    }

    /// The state reached by applying the given effect literals.
    pub fn successor(&self, effects: &[Lit]) -> State {
        let mut s = self.clone();
        s.set_all(effects);
        s
    }
}

/// One probabilistic outcome of a ground action.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub probability: f64,
    /// Effect literals, delete effects ordered before add effects so that an
    /// atom that is both deleted and added ends up added.
    pub effects: Vec<Lit>,
}

/// A ground action: every schema variable replaced by a concrete object and
/// every branch probability settled to a concrete value.
#[derive(Debug, Clone, PartialEq)]
pub struct Operator {
    /// Action symbol followed by its argument symbols, e.g. `(go r1 hall)`.
    pub name: Vec<SymId>,
    pub precond: Vec<Lit>,
    pub outcomes: Vec<Outcome>,
}

impl Operator {
    pub fn pre(&self) -> &[Lit] {
        &self.precond
    }

    pub fn is_deterministic(&self) -> bool {
        self.outcomes.len() == 1
    }

    pub fn applicable_in(&self, state: &State) -> bool {
        state.entails_all(&self.precond)
    }

    /// Simulates one application: samples a single outcome by a cumulative
    /// threshold draw. Applying to a state where the preconditions do not
    /// hold is a no-op, as is a draw landing in probability mass not
    /// assigned to any branch.
    pub fn apply<R: Rng>(&self, state: &State, rng: &mut R) -> State {
        if !self.applicable_in(state) {
            return state.clone();
        }
        let draw = rng.random::<f64>();
        match sample_index(self.outcomes.iter().map(|o| o.probability), draw) {
            Some(i) => state.successor(&self.outcomes[i].effects),
            None => state.clone(),
        }
    }
}

/// Unique numeric identifier of an `Operator` within an `Operators` arena.
#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct Op(usize);

impl From<Op> for usize {
    fn from(op: Op) -> Self {
        op.0
    }
}
impl From<usize> for Op {
    fn from(x: usize) -> Self {
        Op(x)
    }
}

/// Arena of all ground actions of a problem, addressed by `Op` ids.
#[derive(Default)]
pub struct Operators {
    all: Vec<Operator>,
}

impl Operators {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn push(&mut self, o: Operator) -> Op {
        self.all.push(o);
        Op(self.all.len() - 1)
    }

    pub fn preconditions(&self, op: Op) -> &[Lit] {
        self.all[op.0].pre()
    }

    pub fn outcomes(&self, op: Op) -> &[Outcome] {
        &self.all[op.0].outcomes
    }

    pub fn name(&self, op: Op) -> &[SymId] {
        &self.all[op.0].name
    }

    /// An iterator on all operator ids, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = Op> + '_ {
        (0..self.all.len()).map(Op)
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}

impl Index<Op> for Operators {
    type Output = Operator;

    fn index(&self, index: Op) -> &Operator {
        &self.all[index.0]
    }
}
