use crate::typesystem::{TypeHierarchy, TypeId};
use anyhow::{ensure, Context, Result};
use std::collections::HashMap;
use std::fmt::Write;

/// Numeric representation of an interned symbol (predicate, object or action
/// name). Low footprint, usable as an array index and cheap to compare.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub struct SymId(u32);

impl From<SymId> for usize {
    fn from(id: SymId) -> Self {
        id.0 as usize
    }
}
impl From<usize> for SymId {
    fn from(i: usize) -> Self {
        SymId(i as u32)
    }
}

/// An iterable set of symbols occupying a contiguous id range, typically all
/// instances of a given type.
#[derive(Copy, Clone, Debug)]
pub struct ContiguousSymbols {
    first: usize,
    after_last: usize,
}

impl ContiguousSymbols {
    pub fn new(first: usize, after_last: usize) -> Self {
        ContiguousSymbols { first, after_last }
    }

    pub fn singleton(item: SymId) -> Self {
        let first: usize = item.into();
        ContiguousSymbols::new(first, first + 1)
    }

    pub fn size(self) -> usize {
        self.after_last.saturating_sub(self.first)
    }

    /// First symbol of the range, or None if the range is empty.
    pub fn first(self) -> Option<SymId> {
        if self.first < self.after_last {
            Some(self.first.into())
        } else {
            None
        }
    }

    pub fn contains(self, sym: SymId) -> bool {
        let i: usize = sym.into();
        self.first <= i && i < self.after_last
    }
}

impl Iterator for ContiguousSymbols {
    type Item = SymId;

    fn next(&mut self) -> Option<SymId> {
        if self.first < self.after_last {
            self.first += 1;
            Some(SymId::from(self.first - 1))
        } else {
            None
        }
    }
}

/// Associates each symbol with its type and a `SymId`.
///
/// Symbols are interned grouped by their exact type, following the
/// depth-first order of the type hierarchy, so that all direct and indirect
/// instances of a type form a contiguous id range.
#[derive(Clone, Debug)]
pub struct SymbolTable {
    pub types: TypeHierarchy,
    symbols: Vec<String>,
    ids: HashMap<String, SymId>,
    /// Indexed by `TypeId`: range of the symbols whose declared type is
    /// exactly this one.
    instances_by_exact_type: Vec<ContiguousSymbols>,
}

impl SymbolTable {
    /// Builds a table from a hierarchy and `(symbol, type-name)` pairs.
    ///
    /// Fails on a symbol declared twice or bound to an undeclared type.
    pub fn new(types: TypeHierarchy, instances: Vec<(String, String)>) -> Result<SymbolTable> {
        let mut by_type: HashMap<TypeId, Vec<String>> = HashMap::new();
        for (sym, tpe) in instances {
            let tpe_id = types
                .id_of(&tpe)
                .with_context(|| format!("Unrecognized type {tpe} (for symbol {sym})"))?;
            by_type.entry(tpe_id).or_default().push(sym);
        }

        let mut table = SymbolTable {
            types,
            symbols: Vec::new(),
            ids: HashMap::new(),
            instances_by_exact_type: Vec::new(),
        };

        for tpe in table.types.types() {
            let first = table.symbols.len();
            for sym in by_type.remove(&tpe).unwrap_or_default() {
                ensure!(!table.ids.contains_key(&sym), "Symbol {sym} redefined");
                table.ids.insert(sym.clone(), SymId::from(table.symbols.len()));
                table.symbols.push(sym);
            }
            table
                .instances_by_exact_type
                .push(ContiguousSymbols::new(first, table.symbols.len()));
        }
        Ok(table)
    }

    /// Id of the given symbol, or None if it was never interned.
    pub fn id(&self, sym: &str) -> Option<SymId> {
        self.ids.get(sym).copied()
    }

    pub fn symbol(&self, id: SymId) -> &str {
        let i: usize = id.into();
        &self.symbols[i]
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// All direct and indirect instances of the given type.
    pub fn instances_of_type(&self, tpe: TypeId) -> ContiguousSymbols {
        let range = self.instances_by_exact_type[usize::from(tpe)];
        let last_sub = self.types.last_subtype(tpe);
        let end = self.instances_by_exact_type[usize::from(last_sub)].after_last;
        ContiguousSymbols::new(range.first, end)
    }

    /// Formats a symbol tuple as an s-expression, e.g. `(at bob kitchen)`.
    pub fn format(&self, sexpr: &[SymId]) -> String {
        let mut s = String::from("(");
        for sym in sexpr {
            write!(s, "{} ", self.symbol(*sym)).unwrap();
        }
        if s.ends_with(' ') {
            s.pop();
        }
        s.push(')');
        s
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::typesystem::TypeHierarchy;

    /// A small logistics-flavored table used across the crate's tests.
    pub(crate) fn table() -> SymbolTable {
        let types = TypeHierarchy::new(
            [
                ("predicate", None),
                ("object", None),
                ("robot", Some("object")),
                ("room", Some("object")),
            ]
            .map(|(t, p): (&str, Option<&str>)| (t.to_string(), p.map(str::to_string)))
            .into(),
        )
        .unwrap();

        let instances = [
            ("at", "predicate"),
            ("connected", "predicate"),
            ("r1", "robot"),
            ("kitchen", "room"),
            ("hall", "room"),
        ]
        .map(|(s, t)| (s.to_string(), t.to_string()))
        .into();
        SymbolTable::new(types, instances).unwrap()
    }

    #[test]
    fn instances() {
        let table = table();
        let types = &table.types;
        let object = types.id_of("object").unwrap();
        let predicate = types.id_of("predicate").unwrap();
        let robot = types.id_of("robot").unwrap();
        let room = types.id_of("room").unwrap();
        assert_eq!(table.instances_of_type(predicate).count(), 2);
        assert_eq!(table.instances_of_type(object).count(), 3);
        assert_eq!(table.instances_of_type(robot).count(), 1);
        assert_eq!(table.instances_of_type(room).count(), 2);
    }

    #[test]
    fn interning_round_trips() {
        let table = table();
        for name in ["at", "connected", "r1", "kitchen", "hall"] {
            let id = table.id(name).unwrap();
            assert_eq!(table.symbol(id), name);
        }
        assert_eq!(table.id("garden"), None);
    }

    #[test]
    fn formatting() {
        let table = table();
        let atom: Vec<SymId> = ["at", "r1", "kitchen"].iter().map(|s| table.id(s).unwrap()).collect();
        assert_eq!(table.format(&atom), "(at r1 kitchen)");
    }

    #[test]
    fn duplicated_symbol_is_an_error() {
        let types = TypeHierarchy::new(vec![("object".to_string(), None)]).unwrap();
        let instances = vec![
            ("bob".to_string(), "object".to_string()),
            ("bob".to_string(), "object".to_string()),
        ];
        assert!(SymbolTable::new(types, instances).is_err());
    }
}
