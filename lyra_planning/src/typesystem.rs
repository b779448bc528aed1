use anyhow::{bail, ensure, Result};
use std::collections::HashMap;

/// Numeric identifier of a type in a `TypeHierarchy`.
///
/// Types are numbered depth-first so that the subtypes of any type form a
/// contiguous range of ids, which makes subtype tests and instance
/// enumeration cheap.
#[derive(Debug, Copy, Clone, Eq, Ord, PartialOrd, PartialEq, Hash)]
pub struct TypeId(usize);

impl From<TypeId> for usize {
    fn from(id: TypeId) -> Self {
        id.0
    }
}
impl From<usize> for TypeId {
    fn from(id: usize) -> Self {
        TypeId(id)
    }
}

/// A rooted forest of type names.
///
/// Built once when the domain model is instantiated and immutable afterwards.
#[derive(Clone, Debug)]
pub struct TypeHierarchy {
    /// Type names in depth-first order.
    types: Vec<String>,
    ids: HashMap<String, TypeId>,
    /// For each type, the id of the last type in its subtree.
    last_subtype: Vec<TypeId>,
}

impl TypeHierarchy {
    /// Constructs the hierarchy from `(type, optional-supertype)` declarations.
    ///
    /// Fails if a type is declared twice or if some type is not reachable from
    /// a root, which covers both unknown supertypes and declaration cycles.
    pub fn new(mut decls: Vec<(String, Option<String>)>) -> Result<TypeHierarchy> {
        let mut sys = TypeHierarchy {
            types: Vec::with_capacity(decls.len()),
            ids: HashMap::with_capacity(decls.len()),
            last_subtype: Vec::with_capacity(decls.len()),
        };

        // depth-first construction: the trace holds the chain of types whose
        // subtrees are still being laid out
        let mut trace: Vec<Option<String>> = vec![None];
        while let Some(parent) = trace.last() {
            match decls.iter().position(|d| &d.1 == parent) {
                Some(child_pos) => {
                    let (child, _) = decls.remove(child_pos);
                    ensure!(!sys.ids.contains_key(&child), "Type {child} redefined");
                    let id = TypeId(sys.types.len());
                    sys.ids.insert(child.clone(), id);
                    sys.types.push(child.clone());
                    sys.last_subtype.push(id);
                    trace.push(Some(child));
                }
                None => {
                    if let Some(p) = trace.pop().unwrap() {
                        // subtree of `p` fully laid out, record its last id
                        let id = sys.ids[&p];
                        sys.last_subtype[id.0] = TypeId(sys.types.len() - 1);
                    }
                }
            }
        }
        if !decls.is_empty() {
            let orphans: Vec<&str> = decls.iter().map(|d| d.0.as_str()).collect();
            bail!("Types not reachable from any root (unknown supertype or cycle): {orphans:?}");
        }
        Ok(sys)
    }

    /// Id of the given type name, if declared.
    pub fn id_of(&self, tpe: &str) -> Option<TypeId> {
        self.ids.get(tpe).copied()
    }

    pub fn name(&self, id: TypeId) -> &str {
        &self.types[id.0]
    }

    pub fn is_subtype(&self, tpe: TypeId, possible_subtype: TypeId) -> bool {
        tpe <= possible_subtype && possible_subtype <= self.last_subtype(tpe)
    }

    /// Id of the last type in the subtree rooted at `tpe`.
    pub fn last_subtype(&self, tpe: TypeId) -> TypeId {
        self.last_subtype[tpe.0]
    }

    /// Iterator on all types, in depth-first id order.
    pub fn types(&self) -> impl Iterator<Item = TypeId> {
        (0..self.types.len()).map(TypeId)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(name: &str, parent: Option<&str>) -> (String, Option<String>) {
        (name.to_string(), parent.map(str::to_string))
    }

    #[test]
    fn subtype_ranges() {
        let ts = TypeHierarchy::new(vec![
            decl("object", None),
            decl("predicate", None),
            decl("vehicle", Some("object")),
            decl("truck", Some("vehicle")),
            decl("car", Some("vehicle")),
            decl("place", Some("object")),
        ])
        .unwrap();

        let object = ts.id_of("object").unwrap();
        let predicate = ts.id_of("predicate").unwrap();
        let vehicle = ts.id_of("vehicle").unwrap();
        let truck = ts.id_of("truck").unwrap();
        let car = ts.id_of("car").unwrap();
        let place = ts.id_of("place").unwrap();

        assert!(ts.is_subtype(object, object));
        assert!(ts.is_subtype(object, vehicle));
        assert!(ts.is_subtype(object, truck));
        assert!(ts.is_subtype(object, place));
        assert!(ts.is_subtype(vehicle, truck));
        assert!(ts.is_subtype(vehicle, car));
        assert!(!ts.is_subtype(vehicle, object));
        assert!(!ts.is_subtype(vehicle, place));
        assert!(!ts.is_subtype(object, predicate));
        assert!(!ts.is_subtype(predicate, object));
        assert_eq!(ts.id_of("boat"), None);
    }

    #[test]
    fn redefined_type_is_an_error() {
        let result = TypeHierarchy::new(vec![
            decl("object", None),
            decl("truck", Some("object")),
            decl("truck", Some("object")),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_supertype_is_an_error() {
        let result = TypeHierarchy::new(vec![decl("object", None), decl("truck", Some("vehicle"))]);
        assert!(result.is_err());
    }

    #[test]
    fn cycle_is_an_error() {
        let result = TypeHierarchy::new(vec![
            decl("object", None),
            decl("a", Some("b")),
            decl("b", Some("a")),
        ]);
        assert!(result.is_err());
    }
}
