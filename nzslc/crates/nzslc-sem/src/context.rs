//! Transformer context: the interned identifier tables.
//!
//! Every declaration a module makes is interned into one of nine tables,
//! each handing out dense indices. AST nodes refer to declarations by
//! `(kind, index)` only; the tables own the associated data. Indices are
//! stable within a module and survive serialization.
//!
//! A context is single-owner and single-threaded; compiling modules in
//! parallel requires disjoint contexts.

use nzslc_par::ast::{
    ConstantValue, ExpressionType, IdentifierKind, IntrinsicKind, OptionHash, ParameterSemantic,
    ShaderStage, StructDescription,
};
use nzslc_util::{AstError, Error, Result, SourceLocation};
use rustc_hash::FxHashMap;

/// What an identifier resolves to: a table plus an index into it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdentifierTarget {
    pub kind: IdentifierKind,
    pub index: usize,
}

/// Alias table entry: the name and the (non-alias) target it expands to.
#[derive(Clone, Debug)]
pub struct AliasData {
    pub name: String,
    pub target: IdentifierTarget,
}

/// Constant table entry. Options register here too, with their resolved
/// value.
#[derive(Clone, Debug)]
pub struct ConstantData {
    pub module_index: usize,
    pub name: String,
    pub ty: ExpressionType,
    pub value: Option<ConstantValue>,
}

/// Named external block entry.
#[derive(Clone, Debug)]
pub struct ExternalBlockData {
    pub environment_index: usize,
    pub name: String,
    /// Variables of the block, by name, with their variable-table index.
    pub variables: FxHashMap<String, usize>,
}

/// Function table entry; carries the signature call sites are checked
/// against.
#[derive(Clone, Debug)]
pub struct FunctionData {
    pub module_index: usize,
    pub name: String,
    pub entry_stage: Option<ShaderStage>,
    pub parameters: Vec<(ExpressionType, ParameterSemantic)>,
    pub return_type: ExpressionType,
}

#[derive(Clone, Copy, Debug)]
pub struct IntrinsicData {
    pub kind: IntrinsicKind,
}

#[derive(Clone, Debug)]
pub struct ModuleData {
    pub module_index: usize,
    pub name: String,
}

#[derive(Clone, Debug)]
pub struct StructData {
    pub module_index: usize,
    pub description: StructDescription,
}

/// A type parameter of a partial type (`vec3[f32]`, `array[T, 4]`).
#[derive(Clone, Debug)]
pub enum TypeParameter {
    Type(ExpressionType),
    Constant(ConstantValue),
}

/// A built-in generic type awaiting its bracket arguments.
#[derive(Clone, Copy)]
pub struct PartialType {
    pub name: &'static str,
    /// Number of mandatory parameters.
    pub min_parameters: usize,
    /// Total accepted parameters.
    pub max_parameters: usize,
    pub build: fn(&[TypeParameter], &SourceLocation) -> Result<ExpressionType>,
}

impl std::fmt::Debug for PartialType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartialType").field("name", &self.name).finish()
    }
}

/// Content of a type table entry.
#[derive(Clone, Debug)]
pub enum TypeContent {
    Concrete(ExpressionType),
    Partial(PartialType),
}

#[derive(Clone, Debug)]
pub struct TypeData {
    pub name: String,
    pub content: TypeContent,
}

#[derive(Clone, Debug)]
pub struct VariableData {
    pub name: String,
    pub ty: ExpressionType,
}

#[derive(Debug)]
enum Slot<T> {
    Free,
    Preregistered,
    Occupied(T),
}

impl<T> Slot<T> {
    fn is_free(&self) -> bool {
        matches!(self, Slot::Free)
    }
}

/// One identifier table: dense index allocation with preregistration.
#[derive(Debug)]
pub struct IdentifierTable<T> {
    name: &'static str,
    slots: Vec<Slot<T>>,
}

impl<T> IdentifierTable<T> {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            slots: Vec::new(),
        }
    }

    /// Table name, used in error messages.
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn invalid_index(&self, index: usize, location: &SourceLocation) -> Error {
        Error::new(
            location.clone(),
            AstError::InvalidIndex {
                kind: self.name,
                index,
            },
        )
    }

    fn lowest_free_index(&self) -> usize {
        self.slots
            .iter()
            .position(Slot::is_free)
            .unwrap_or(self.slots.len())
    }

    fn ensure_len(&mut self, index: usize) {
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || Slot::Free);
        }
    }

    /// Allocates the lowest unused index without installing data yet.
    pub fn register_new_index(&mut self) -> usize {
        let index = self.lowest_free_index();
        self.ensure_len(index);
        self.slots[index] = Slot::Preregistered;
        index
    }

    /// Reserves an explicit index without data; it must later be filled
    /// by [`register`](Self::register).
    pub fn preregister_index(&mut self, index: usize, location: &SourceLocation) -> Result<()> {
        if let Some(slot) = self.slots.get(index) {
            if matches!(slot, Slot::Occupied(_)) {
                return Err(Error::new(
                    location.clone(),
                    AstError::AlreadyUsedIndexPreregister { index },
                ));
            }
        }
        self.ensure_len(index);
        self.slots[index] = Slot::Preregistered;
        Ok(())
    }

    /// Installs `value`, either at an explicit index (which must be free
    /// or preregistered) or at the lowest unused one. Returns the index.
    pub fn register(
        &mut self,
        index: Option<usize>,
        value: T,
        location: &SourceLocation,
    ) -> Result<usize> {
        let index = match index {
            Some(index) => {
                if matches!(self.slots.get(index), Some(Slot::Occupied(_))) {
                    return Err(self.invalid_index(index, location));
                }
                index
            }
            None => self.lowest_free_index(),
        };

        self.ensure_len(index);
        self.slots[index] = Slot::Occupied(value);
        Ok(index)
    }

    /// Returns the entry at `index`, failing with `AstInvalidIndex` if it
    /// does not exist.
    pub fn retrieve(&self, index: usize, location: &SourceLocation) -> Result<&T> {
        match self.slots.get(index) {
            Some(Slot::Occupied(value)) => Ok(value),
            _ => Err(self.invalid_index(index, location)),
        }
    }

    /// Mutable access to the entry at `index`.
    pub fn retrieve_mut(&mut self, index: usize, location: &SourceLocation) -> Result<&mut T> {
        if matches!(self.slots.get(index), Some(Slot::Occupied(_))) {
            match &mut self.slots[index] {
                Slot::Occupied(value) => Ok(value),
                _ => unreachable!(),
            }
        } else {
            Err(self.invalid_index(index, location))
        }
    }

    /// Entry at `index`, if occupied.
    pub fn try_retrieve(&self, index: usize) -> Option<&T> {
        match self.slots.get(index) {
            Some(Slot::Occupied(value)) => Some(value),
            _ => None,
        }
    }

    /// True if `index` has data installed.
    pub fn is_registered(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(Slot::Occupied(_)))
    }

    /// Iterates over occupied entries.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| match slot {
            Slot::Occupied(value) => Some((index, value)),
            _ => None,
        })
    }

    /// Number of occupied entries.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry. Only valid between passes, when the caller owns
    /// the context.
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

/// The per-compilation bag of interned identifier tables.
#[derive(Debug)]
pub struct TransformerContext {
    pub aliases: IdentifierTable<AliasData>,
    pub constants: IdentifierTable<ConstantData>,
    pub named_external_blocks: IdentifierTable<ExternalBlockData>,
    pub functions: IdentifierTable<FunctionData>,
    pub intrinsics: IdentifierTable<IntrinsicData>,
    pub modules: IdentifierTable<ModuleData>,
    pub structs: IdentifierTable<StructData>,
    pub types: IdentifierTable<TypeData>,
    pub variables: IdentifierTable<VariableData>,
    pub option_values: FxHashMap<OptionHash, ConstantValue>,
    pub allow_unknown_identifiers: bool,
    pub partial_compilation: bool,
}

impl TransformerContext {
    pub fn new() -> Self {
        Self {
            aliases: IdentifierTable::new("alias"),
            constants: IdentifierTable::new("constant"),
            named_external_blocks: IdentifierTable::new("external block"),
            functions: IdentifierTable::new("function"),
            intrinsics: IdentifierTable::new("intrinsic"),
            modules: IdentifierTable::new("module"),
            structs: IdentifierTable::new("struct"),
            types: IdentifierTable::new("type"),
            variables: IdentifierTable::new("variable"),
            option_values: FxHashMap::default(),
            allow_unknown_identifiers: false,
            partial_compilation: false,
        }
    }

    /// Drops every table entry; flags and option values are kept.
    pub fn reset(&mut self) {
        self.aliases.clear();
        self.constants.clear();
        self.named_external_blocks.clear();
        self.functions.clear();
        self.intrinsics.clear();
        self.modules.clear();
        self.structs.clear();
        self.types.clear();
        self.variables.clear();
    }

    /// Resolves an alias target to its final (non-alias) target. Alias
    /// chains are a single hop by construction.
    pub fn resolve_alias_target(
        &self,
        index: usize,
        location: &SourceLocation,
    ) -> Result<IdentifierTarget> {
        let alias = self.aliases.retrieve(index, location)?;
        debug_assert_ne!(alias.target.kind, IdentifierKind::Alias);
        Ok(alias.target)
    }

    /// Resolves `Alias(i)` types to the underlying type; everything else
    /// is returned unchanged.
    pub fn resolve_alias_type<'t>(
        &self,
        ty: &'t ExpressionType,
        location: &SourceLocation,
    ) -> Result<ExpressionType> {
        match ty {
            ExpressionType::Alias(index) => {
                let target = self.resolve_alias_target(*index, location)?;
                match target.kind {
                    IdentifierKind::Struct => Ok(ExpressionType::Struct(target.index)),
                    IdentifierKind::Type => {
                        let data = self.types.retrieve(target.index, location)?;
                        match &data.content {
                            TypeContent::Concrete(concrete) => Ok(concrete.clone()),
                            TypeContent::Partial(_) => Err(Error::new(
                                location.clone(),
                                AstError::InvalidIndex {
                                    kind: "type",
                                    index: target.index,
                                },
                            )),
                        }
                    }
                    _ => Err(Error::new(
                        location.clone(),
                        AstError::InvalidIndex {
                            kind: "alias",
                            index: *index,
                        },
                    )),
                }
            }
            _ => Ok(ty.clone()),
        }
    }
}

impl Default for TransformerContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> SourceLocation {
        SourceLocation::default()
    }

    #[test]
    fn test_register_new_index_is_dense() {
        let mut table: IdentifierTable<u32> = IdentifierTable::new("test");
        assert_eq!(table.register(None, 10, &loc()).unwrap(), 0);
        assert_eq!(table.register(None, 20, &loc()).unwrap(), 1);
        assert_eq!(table.register(None, 30, &loc()).unwrap(), 2);
    }

    #[test]
    fn test_register_explicit_index() {
        let mut table: IdentifierTable<u32> = IdentifierTable::new("test");
        assert_eq!(table.register(Some(5), 50, &loc()).unwrap(), 5);
        // lowest free index is still 0
        assert_eq!(table.register(None, 0, &loc()).unwrap(), 0);
        // registering over an occupied index fails
        assert!(table.register(Some(5), 51, &loc()).is_err());
    }

    #[test]
    fn test_preregister() {
        let mut table: IdentifierTable<u32> = IdentifierTable::new("test");
        table.preregister_index(2, &loc()).unwrap();
        assert!(!table.is_registered(2));
        // preregistered index can be filled
        assert_eq!(table.register(Some(2), 42, &loc()).unwrap(), 2);
        assert_eq!(table.retrieve(2, &loc()).unwrap(), &42);
        // but not preregistered again once occupied
        assert!(table.preregister_index(2, &loc()).is_err());
    }

    #[test]
    fn test_preregistered_index_not_reallocated() {
        let mut table: IdentifierTable<u32> = IdentifierTable::new("test");
        table.preregister_index(0, &loc()).unwrap();
        // the lowest *free* index skips the reserved slot
        assert_eq!(table.register(None, 1, &loc()).unwrap(), 1);
    }

    #[test]
    fn test_retrieve_invalid_index() {
        let table: IdentifierTable<u32> = IdentifierTable::new("variable");
        let err = table.retrieve(3, &loc()).unwrap_err();
        assert_eq!(err.to_string(), "?: Ast error: invalid variable index 3");
    }

    #[test]
    fn test_retrieve_mut() {
        let mut table: IdentifierTable<u32> = IdentifierTable::new("test");
        table.register(None, 1, &loc()).unwrap();
        *table.retrieve_mut(0, &loc()).unwrap() = 9;
        assert_eq!(table.retrieve(0, &loc()).unwrap(), &9);
    }

    #[test]
    fn test_clear() {
        let mut table: IdentifierTable<u32> = IdentifierTable::new("test");
        table.register(None, 1, &loc()).unwrap();
        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.register(None, 2, &loc()).unwrap(), 0);
    }

    #[test]
    fn test_iter() {
        let mut table: IdentifierTable<u32> = IdentifierTable::new("test");
        table.register(Some(1), 10, &loc()).unwrap();
        table.register(Some(3), 30, &loc()).unwrap();
        let entries: Vec<_> = table.iter().collect();
        assert_eq!(entries, vec![(1, &10), (3, &30)]);
    }
}
