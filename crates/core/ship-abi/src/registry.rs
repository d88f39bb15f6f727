//! Resolution of a schema document into an immutable set of type descriptors.

use std::collections::HashMap;

use crate::{
    abi::AbiDef,
    error::{AbiError, DecodeError},
    types::ScalarType,
};

/// Stable identifier of a named type within one [`TypeRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

impl TypeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A resolved type expression.
///
/// Named types (built-ins, structs, variants) are referenced by id; the `T[]`, `T?` and `T$`
/// suffixes of the schema language become the wrapping variants.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Defined(TypeId),
    Array(Box<TypeRef>),
    Optional(Box<TypeRef>),
    /// Binary extension: present only if the payload has bytes left.
    Extension(Box<TypeRef>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Scalar(ScalarType),
    /// Fields in encoding order, base struct fields first.
    Struct(Vec<Field>),
    /// Alternatives in index order, with the name each alternative is tagged with.
    Variant(Vec<(String, TypeRef)>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub name: String,
    pub kind: TypeKind,
}

/// Named type descriptors of one schema document.
///
/// Built once from the handshake document and read-only afterwards; every name the document
/// references resolves or construction fails.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    descriptors: Vec<TypeDescriptor>,
    names: HashMap<String, TypeRef>,
}

impl TypeRegistry {
    /// Registry holding only the built-in scalars.
    pub fn builtin() -> Self {
        let mut registry = TypeRegistry {
            descriptors: Vec::with_capacity(ScalarType::ALL.len()),
            names: HashMap::new(),
        };
        for scalar in ScalarType::ALL {
            let id = registry.push(scalar.as_str().to_string(), TypeKind::Scalar(scalar));
            registry
                .names
                .insert(scalar.as_str().to_string(), TypeRef::Defined(id));
        }
        registry
    }

    /// Resolves every alias, struct and variant of the document on top of the built-ins.
    pub fn from_abi(abi: &AbiDef) -> Result<Self, AbiError> {
        let mut registry = Self::builtin();

        // Allocate ids first so definitions may reference each other in any order.
        let mut struct_ids = Vec::with_capacity(abi.structs.len());
        for def in &abi.structs {
            struct_ids.push(registry.declare(&def.name)?);
        }
        let mut variant_ids = Vec::with_capacity(abi.variants.len());
        for def in &abi.variants {
            variant_ids.push(registry.declare(&def.name)?);
        }
        registry.resolve_aliases(abi)?;

        for (def, id) in abi.variants.iter().zip(variant_ids) {
            let alternatives = def
                .types
                .iter()
                .map(|ty| Ok((ty.clone(), registry.parse(ty)?)))
                .collect::<Result<Vec<_>, AbiError>>()?;
            registry.descriptors[id.index()].kind = TypeKind::Variant(alternatives);
        }

        let own_fields = abi
            .structs
            .iter()
            .map(|def| {
                def.fields
                    .iter()
                    .map(|field| {
                        Ok(Field {
                            name: field.name.clone(),
                            ty: registry.parse(&field.ty)?,
                        })
                    })
                    .collect::<Result<Vec<_>, AbiError>>()
            })
            .collect::<Result<Vec<_>, AbiError>>()?;
        let by_name: HashMap<&str, usize> = abi
            .structs
            .iter()
            .enumerate()
            .map(|(idx, def)| (def.name.as_str(), idx))
            .collect();
        for (idx, id) in struct_ids.iter().enumerate() {
            let fields = flatten_struct(abi, &by_name, &own_fields, idx)?;
            registry.descriptors[id.index()].kind = TypeKind::Struct(fields);
        }

        Ok(registry)
    }

    /// Resolves a type expression such as `table_delta[]` or `block_position?`.
    pub fn resolve(&self, expr: &str) -> Result<TypeRef, DecodeError> {
        self.parse(expr)
            .map_err(|_| DecodeError::UnknownType(expr.to_string()))
    }

    pub fn descriptor(&self, id: TypeId) -> &TypeDescriptor {
        &self.descriptors[id.index()]
    }

    /// Descriptor of a named (non-suffixed) type, following aliases.
    pub fn get(&self, name: &str) -> Option<&TypeDescriptor> {
        match self.names.get(name)? {
            TypeRef::Defined(id) => Some(self.descriptor(*id)),
            _ => None,
        }
    }

    /// Id of a named type, following aliases.
    pub fn id_of(&self, name: &str) -> Option<TypeId> {
        match self.names.get(name)? {
            TypeRef::Defined(id) => Some(*id),
            _ => None,
        }
    }

    /// Renders a type reference back to schema-language syntax.
    pub fn display(&self, ty: &TypeRef) -> String {
        match ty {
            TypeRef::Defined(id) => self.descriptor(*id).name.clone(),
            TypeRef::Array(inner) => format!("{}[]", self.display(inner)),
            TypeRef::Optional(inner) => format!("{}?", self.display(inner)),
            TypeRef::Extension(inner) => format!("{}$", self.display(inner)),
        }
    }

    fn push(&mut self, name: String, kind: TypeKind) -> TypeId {
        let id = TypeId(self.descriptors.len() as u32);
        self.descriptors.push(TypeDescriptor { name, kind });
        id
    }

    fn declare(&mut self, name: &str) -> Result<TypeId, AbiError> {
        if self.names.contains_key(name) {
            return Err(AbiError::DuplicateType(name.to_string()));
        }
        // Placeholder kind, replaced once every name is known.
        let id = self.push(name.to_string(), TypeKind::Struct(Vec::new()));
        self.names.insert(name.to_string(), TypeRef::Defined(id));
        Ok(id)
    }

    /// Aliases may point at other aliases declared later; resolve until a fixpoint.
    fn resolve_aliases(&mut self, abi: &AbiDef) -> Result<(), AbiError> {
        let mut pending: Vec<_> = abi.types.iter().collect();
        for def in &pending {
            if self.names.contains_key(&def.new_type_name) {
                return Err(AbiError::DuplicateType(def.new_type_name.clone()));
            }
        }
        while !pending.is_empty() {
            let before = pending.len();
            let mut unresolved = Vec::new();
            for def in pending {
                match self.parse(&def.ty) {
                    Ok(target) => {
                        self.names.insert(def.new_type_name.clone(), target);
                    }
                    Err(_) => unresolved.push(def),
                }
            }
            if unresolved.len() == before {
                let def = unresolved[0];
                return Err(
                    if unresolved.iter().any(|other| other.new_type_name == base_name(&def.ty)) {
                        AbiError::Recursive(def.new_type_name.clone())
                    } else {
                        AbiError::UnknownType(def.ty.clone())
                    },
                );
            }
            pending = unresolved;
        }
        Ok(())
    }

    fn parse(&self, expr: &str) -> Result<TypeRef, AbiError> {
        if let Some(inner) = expr.strip_suffix("[]") {
            return Ok(TypeRef::Array(Box::new(self.parse(inner)?)));
        }
        if let Some(inner) = expr.strip_suffix('?') {
            return Ok(TypeRef::Optional(Box::new(self.parse(inner)?)));
        }
        if let Some(inner) = expr.strip_suffix('$') {
            return Ok(TypeRef::Extension(Box::new(self.parse(inner)?)));
        }
        self.names
            .get(expr)
            .cloned()
            .ok_or_else(|| AbiError::UnknownType(expr.to_string()))
    }
}

fn base_name(expr: &str) -> &str {
    expr.trim_end_matches(['[', ']', '?', '$'])
}

fn flatten_struct(
    abi: &AbiDef,
    by_name: &HashMap<&str, usize>,
    own_fields: &[Vec<Field>],
    idx: usize,
) -> Result<Vec<Field>, AbiError> {
    // Walk the base chain up to the root, then emit fields root first.
    let mut chain = vec![idx];
    let mut current = idx;
    while !abi.structs[current].base.is_empty() {
        let def = &abi.structs[current];
        let Some(&base) = by_name.get(def.base.as_str()) else {
            return Err(AbiError::InvalidBase {
                name: def.name.clone(),
                base: def.base.clone(),
            });
        };
        if chain.contains(&base) {
            return Err(AbiError::Recursive(abi.structs[idx].name.clone()));
        }
        chain.push(base);
        current = base;
    }
    Ok(chain
        .into_iter()
        .rev()
        .flat_map(|idx| own_fields[idx].iter().cloned())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{AbiField, AbiStruct, AbiTypeDef, AbiVariant};

    fn field(name: &str, ty: &str) -> AbiField {
        AbiField {
            name: name.to_string(),
            ty: ty.to_string(),
        }
    }

    fn abi_struct(name: &str, base: &str, fields: Vec<AbiField>) -> AbiStruct {
        AbiStruct {
            name: name.to_string(),
            base: base.to_string(),
            fields,
        }
    }

    fn alias(new_type_name: &str, ty: &str) -> AbiTypeDef {
        AbiTypeDef {
            new_type_name: new_type_name.to_string(),
            ty: ty.to_string(),
        }
    }

    #[test]
    fn from_abi_flattens_base_fields_ahead_of_own_fields() {
        //* Given
        let abi = AbiDef {
            structs: vec![
                abi_struct("child", "parent", vec![field("c", "uint8")]),
                abi_struct("parent", "", vec![field("p", "name")]),
            ],
            ..Default::default()
        };

        //* When
        let registry = TypeRegistry::from_abi(&abi).expect("registry should build");

        //* Then
        let TypeKind::Struct(fields) = &registry.get("child").unwrap().kind else {
            panic!("child should be a struct");
        };
        let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["p", "c"]);
    }

    #[test]
    fn from_abi_resolves_alias_chains_declared_out_of_order() {
        //* Given
        let abi = AbiDef {
            types: vec![alias("trx_id", "transaction_id"), alias("transaction_id", "checksum256")],
            ..Default::default()
        };

        //* When
        let registry = TypeRegistry::from_abi(&abi).expect("registry should build");

        //* Then
        let descriptor = registry.get("trx_id").expect("alias should resolve");
        assert_eq!(descriptor.kind, TypeKind::Scalar(ScalarType::Checksum256));
    }

    #[test]
    fn from_abi_resolves_suffixed_field_types() {
        let abi = AbiDef {
            structs: vec![abi_struct(
                "holder",
                "",
                vec![field("list", "uint8[]"), field("maybe", "name?"), field("ext", "bool$")],
            )],
            ..Default::default()
        };
        let registry = TypeRegistry::from_abi(&abi).unwrap();

        let TypeKind::Struct(fields) = &registry.get("holder").unwrap().kind else {
            panic!("holder should be a struct");
        };
        assert_eq!(registry.display(&fields[0].ty), "uint8[]");
        assert_eq!(registry.display(&fields[1].ty), "name?");
        assert_eq!(registry.display(&fields[2].ty), "bool$");
    }

    #[test]
    fn from_abi_rejects_unknown_field_types() {
        let abi = AbiDef {
            structs: vec![abi_struct("broken", "", vec![field("x", "no_such_type")])],
            ..Default::default()
        };

        let err = TypeRegistry::from_abi(&abi).unwrap_err();

        assert!(matches!(err, AbiError::UnknownType(name) if name == "no_such_type"));
    }

    #[test]
    fn from_abi_rejects_duplicate_and_recursive_definitions() {
        let duplicate = AbiDef {
            structs: vec![abi_struct("uint8", "", vec![])],
            ..Default::default()
        };
        assert!(matches!(
            TypeRegistry::from_abi(&duplicate),
            Err(AbiError::DuplicateType(_))
        ));

        let recursive = AbiDef {
            structs: vec![abi_struct("a", "b", vec![]), abi_struct("b", "a", vec![])],
            ..Default::default()
        };
        assert!(matches!(
            TypeRegistry::from_abi(&recursive),
            Err(AbiError::Recursive(_))
        ));

        let alias_loop = AbiDef {
            types: vec![alias("x", "y"), alias("y", "x")],
            ..Default::default()
        };
        assert!(matches!(
            TypeRegistry::from_abi(&alias_loop),
            Err(AbiError::Recursive(_))
        ));
    }

    #[test]
    fn variants_keep_alternative_names_in_index_order() {
        let abi = AbiDef {
            structs: vec![abi_struct("v0", "", vec![]), abi_struct("v1", "", vec![])],
            variants: vec![AbiVariant {
                name: "versioned".to_string(),
                types: vec!["v0".to_string(), "v1".to_string()],
            }],
            ..Default::default()
        };
        let registry = TypeRegistry::from_abi(&abi).unwrap();

        let TypeKind::Variant(alternatives) = &registry.get("versioned").unwrap().kind else {
            panic!("versioned should be a variant");
        };
        let names: Vec<_> = alternatives.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["v0", "v1"]);
    }

    #[test]
    fn resolve_reports_unknown_expressions_as_decode_errors() {
        let registry = TypeRegistry::builtin();
        assert!(registry.resolve("uint32[]").is_ok());
        assert!(matches!(
            registry.resolve("table_delta[]"),
            Err(DecodeError::UnknownType(_))
        ));
    }
}
