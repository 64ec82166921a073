//! Expression and statement nodes.
//!
//! Every node carries its [`SourceLocation`]; every expression carries an
//! optional cached type filled in by the resolve pass. Parents own their
//! children exclusively, so passes rewrite nodes by replacing the owning
//! slot.

use super::constant_value::{ConstantArrayValue, ConstantValue};
use super::enums::{
    AssignType, BinaryType, BuiltinEntry, DepthWriteMode, IdentifierKind, InterpolationQualifier,
    IntrinsicKind, ParameterSemantic, ShaderStage, TypeConstant, UnaryType,
};
use super::types::{ExpressionType, PrimitiveType};
use nzslc_util::{SourceLocation, StructLayout};
use smallvec::SmallVec;

/// An attribute payload that may still be an unresolved expression or
/// already a resolved value.
///
/// Attributes such as `[binding(BindingBase + 1)]` carry expressions that
/// the resolve pass evaluates to values; synthesized nodes can start out
/// resolved.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum ExpressionValue<T> {
    #[default]
    None,
    Expression(Box<Expression>),
    Value(T),
}

impl<T> ExpressionValue<T> {
    pub fn has_value(&self) -> bool {
        !matches!(self, ExpressionValue::None)
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, ExpressionValue::Value(_))
    }

    pub fn as_value(&self) -> Option<&T> {
        match self {
            ExpressionValue::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_expression(&self) -> Option<&Expression> {
        match self {
            ExpressionValue::Expression(expr) => Some(expr),
            _ => None,
        }
    }

    pub fn as_expression_mut(&mut self) -> Option<&mut Expression> {
        match self {
            ExpressionValue::Expression(expr) => Some(expr),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

/// Every expression node.
#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    AccessField(AccessFieldExpression),
    AccessIdentifier(AccessIdentifierExpression),
    AccessIndex(AccessIndexExpression),
    Assign(AssignExpression),
    Binary(BinaryExpression),
    CallFunction(CallFunctionExpression),
    CallMethod(CallMethodExpression),
    Cast(CastExpression),
    Conditional(ConditionalExpression),
    ConstantArrayValue(ConstantArrayValueExpression),
    ConstantValue(ConstantValueExpression),
    Identifier(IdentifierExpression),
    IdentifierValue(IdentifierValueExpression),
    Intrinsic(IntrinsicExpression),
    Swizzle(SwizzleExpression),
    TypeConstant(TypeConstantExpression),
    Unary(UnaryExpression),
}

/// Resolved access to a struct field by index.
#[derive(Clone, Debug, PartialEq)]
pub struct AccessFieldExpression {
    pub expr: Box<Expression>,
    pub field_index: u32,
    pub cached_type: Option<ExpressionType>,
    pub location: SourceLocation,
}

/// Unresolved member-path access (`value.member.inner`).
#[derive(Clone, Debug, PartialEq)]
pub struct AccessIdentifierExpression {
    pub expr: Box<Expression>,
    pub identifiers: Vec<IdentifierEntry>,
    pub cached_type: Option<ExpressionType>,
    pub location: SourceLocation,
}

/// One link of a member path.
#[derive(Clone, Debug, PartialEq)]
pub struct IdentifierEntry {
    pub identifier: String,
    pub location: SourceLocation,
}

/// Indexed access (`arr[i]`, `matrix[col]`).
#[derive(Clone, Debug, PartialEq)]
pub struct AccessIndexExpression {
    pub expr: Box<Expression>,
    pub indices: Vec<Expression>,
    pub cached_type: Option<ExpressionType>,
    pub location: SourceLocation,
}

/// Assignment, simple or compound.
#[derive(Clone, Debug, PartialEq)]
pub struct AssignExpression {
    pub op: AssignType,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
    pub cached_type: Option<ExpressionType>,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BinaryExpression {
    pub op: BinaryType,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
    pub cached_type: Option<ExpressionType>,
    pub location: SourceLocation,
}

/// Call whose target resolves to a user function.
#[derive(Clone, Debug, PartialEq)]
pub struct CallFunctionExpression {
    pub target: Box<Expression>,
    pub parameters: Vec<Expression>,
    pub cached_type: Option<ExpressionType>,
    pub location: SourceLocation,
}

/// Method-style call (`texture.Sample(...)`), resolved into an intrinsic
/// by the resolve pass.
#[derive(Clone, Debug, PartialEq)]
pub struct CallMethodExpression {
    pub object: Box<Expression>,
    pub method: String,
    pub parameters: Vec<Expression>,
    pub cached_type: Option<ExpressionType>,
    pub location: SourceLocation,
}

/// Type construction / conversion (`vec3[f32](a, b, c)`, `f32(i)`).
#[derive(Clone, Debug, PartialEq)]
pub struct CastExpression {
    pub target_type: ExpressionValue<ExpressionType>,
    pub expressions: Vec<Expression>,
    pub cached_type: Option<ExpressionType>,
    pub location: SourceLocation,
}

/// `const_select(cond, a, b)`.
#[derive(Clone, Debug, PartialEq)]
pub struct ConditionalExpression {
    pub condition: Box<Expression>,
    pub true_path: Box<Expression>,
    pub false_path: Box<Expression>,
    pub cached_type: Option<ExpressionType>,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConstantArrayValueExpression {
    pub values: ConstantArrayValue,
    pub cached_type: Option<ExpressionType>,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConstantValueExpression {
    pub value: ConstantValue,
    pub cached_type: Option<ExpressionType>,
    pub location: SourceLocation,
}

/// An identifier the resolve pass has not bound yet.
#[derive(Clone, Debug, PartialEq)]
pub struct IdentifierExpression {
    pub identifier: String,
    pub cached_type: Option<ExpressionType>,
    pub location: SourceLocation,
}

/// A bound identifier: a table kind plus a live index into that table.
#[derive(Clone, Debug, PartialEq)]
pub struct IdentifierValueExpression {
    pub kind: IdentifierKind,
    pub index: usize,
    pub cached_type: Option<ExpressionType>,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IntrinsicExpression {
    pub intrinsic: IntrinsicKind,
    pub parameters: Vec<Expression>,
    pub cached_type: Option<ExpressionType>,
    pub location: SourceLocation,
}

/// Component shuffle (`v.xyz`, `v.wzyx`, scalar `s.xxx`).
#[derive(Clone, Debug, PartialEq)]
pub struct SwizzleExpression {
    pub expr: Box<Expression>,
    pub components: SmallVec<[u32; 4]>,
    pub cached_type: Option<ExpressionType>,
    pub location: SourceLocation,
}

/// A type-level constant such as `f32::Max`.
#[derive(Clone, Debug, PartialEq)]
pub struct TypeConstantExpression {
    pub ty: PrimitiveType,
    pub constant: TypeConstant,
    pub cached_type: Option<ExpressionType>,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnaryExpression {
    pub op: UnaryType,
    pub expr: Box<Expression>,
    pub cached_type: Option<ExpressionType>,
    pub location: SourceLocation,
}

macro_rules! for_each_expression {
    ($self:ident, $node:ident => $body:expr) => {
        match $self {
            Expression::AccessField($node) => $body,
            Expression::AccessIdentifier($node) => $body,
            Expression::AccessIndex($node) => $body,
            Expression::Assign($node) => $body,
            Expression::Binary($node) => $body,
            Expression::CallFunction($node) => $body,
            Expression::CallMethod($node) => $body,
            Expression::Cast($node) => $body,
            Expression::Conditional($node) => $body,
            Expression::ConstantArrayValue($node) => $body,
            Expression::ConstantValue($node) => $body,
            Expression::Identifier($node) => $body,
            Expression::IdentifierValue($node) => $body,
            Expression::Intrinsic($node) => $body,
            Expression::Swizzle($node) => $body,
            Expression::TypeConstant($node) => $body,
            Expression::Unary($node) => $body,
        }
    };
}

impl Expression {
    pub fn location(&self) -> &SourceLocation {
        for_each_expression!(self, node => &node.location)
    }

    pub fn cached_type(&self) -> Option<&ExpressionType> {
        for_each_expression!(self, node => node.cached_type.as_ref())
    }

    pub fn cached_type_mut(&mut self) -> &mut Option<ExpressionType> {
        for_each_expression!(self, node => &mut node.cached_type)
    }

    pub fn set_cached_type(&mut self, ty: ExpressionType) {
        *self.cached_type_mut() = Some(ty);
    }

    /// Builds a constant-value expression with its type already cached.
    pub fn constant(value: ConstantValue, location: SourceLocation) -> Expression {
        let cached_type = Some(value.expression_type());
        Expression::ConstantValue(ConstantValueExpression {
            value,
            cached_type,
            location,
        })
    }

    /// True if re-evaluating this expression is trivially side-effect
    /// free (a constant or an already-bound identifier).
    pub fn is_trivially_reusable(&self) -> bool {
        matches!(
            self,
            Expression::ConstantValue(_) | Expression::IdentifierValue(_)
        )
    }
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

/// Every statement node.
#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    Branch(BranchStatement),
    Break(BreakStatement),
    Conditional(ConditionalStatement),
    Continue(ContinueStatement),
    DeclareAlias(DeclareAliasStatement),
    DeclareConst(DeclareConstStatement),
    DeclareExternal(DeclareExternalStatement),
    DeclareFunction(DeclareFunctionStatement),
    DeclareOption(DeclareOptionStatement),
    DeclareStruct(DeclareStructStatement),
    DeclareVariable(DeclareVariableStatement),
    Discard(DiscardStatement),
    Expression(ExpressionStatement),
    For(ForStatement),
    ForEach(ForEachStatement),
    Import(ImportStatement),
    Multi(MultiStatement),
    NoOp(NoOpStatement),
    Return(ReturnStatement),
    Scoped(ScopedStatement),
    While(WhileStatement),
}

/// `if` / `else if` / `else` chain; `is_const` marks `const if`.
#[derive(Clone, Debug, PartialEq)]
pub struct BranchStatement {
    pub cond_statements: Vec<ConditionalBranch>,
    pub else_statement: Option<Box<Statement>>,
    pub is_const: bool,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConditionalBranch {
    pub condition: Expression,
    pub statement: Box<Statement>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BreakStatement {
    pub location: SourceLocation,
}

/// A statement gated by a `[cond(...)]` compile-time condition.
#[derive(Clone, Debug, PartialEq)]
pub struct ConditionalStatement {
    pub condition: Box<Expression>,
    pub statement: Box<Statement>,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ContinueStatement {
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeclareAliasStatement {
    pub name: String,
    pub alias_index: Option<usize>,
    pub expression: Box<Expression>,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeclareConstStatement {
    pub name: String,
    pub const_index: Option<usize>,
    pub ty: ExpressionValue<ExpressionType>,
    pub expression: Box<Expression>,
    pub is_exported: ExpressionValue<bool>,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeclareExternalStatement {
    /// Block name, when declared as `external Name { ... }`.
    pub name: Option<String>,
    pub external_index: Option<usize>,
    pub auto_binding: ExpressionValue<bool>,
    pub binding_set: ExpressionValue<u32>,
    pub tag: String,
    pub external_vars: Vec<ExternalVar>,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExternalVar {
    pub name: String,
    pub ty: ExpressionValue<ExpressionType>,
    pub binding_set: ExpressionValue<u32>,
    pub binding_index: ExpressionValue<u32>,
    pub tag: String,
    pub var_index: Option<usize>,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeclareFunctionStatement {
    pub name: String,
    pub func_index: Option<usize>,
    pub parameters: Vec<FunctionParameter>,
    pub return_type: ExpressionValue<ExpressionType>,
    pub statements: Vec<Statement>,
    pub entry_stage: ExpressionValue<ShaderStage>,
    pub depth_write: ExpressionValue<DepthWriteMode>,
    pub early_fragment_tests: ExpressionValue<bool>,
    pub is_exported: ExpressionValue<bool>,
    pub workgroup_size: ExpressionValue<[u32; 3]>,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionParameter {
    pub name: String,
    pub ty: ExpressionValue<ExpressionType>,
    pub semantic: ParameterSemantic,
    pub var_index: Option<usize>,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeclareOptionStatement {
    pub name: String,
    pub opt_index: Option<usize>,
    pub ty: ExpressionValue<ExpressionType>,
    pub default_value: Option<Box<Expression>>,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeclareStructStatement {
    pub struct_index: Option<usize>,
    pub description: StructDescription,
    pub is_exported: ExpressionValue<bool>,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructDescription {
    pub name: String,
    pub layout: ExpressionValue<StructLayout>,
    pub tag: String,
    pub members: Vec<StructMember>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructMember {
    pub name: String,
    pub ty: ExpressionValue<ExpressionType>,
    pub builtin: ExpressionValue<BuiltinEntry>,
    pub location_index: ExpressionValue<u32>,
    pub interp: ExpressionValue<InterpolationQualifier>,
    pub cond: ExpressionValue<bool>,
    pub tag: String,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeclareVariableStatement {
    pub name: String,
    pub var_index: Option<usize>,
    pub ty: ExpressionValue<ExpressionType>,
    pub initial_expression: Option<Box<Expression>>,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DiscardStatement {
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExpressionStatement {
    pub expression: Expression,
    pub location: SourceLocation,
}

/// `for ident in from -> to [: step]`.
#[derive(Clone, Debug, PartialEq)]
pub struct ForStatement {
    pub var_name: String,
    pub var_index: Option<usize>,
    pub from_expr: Box<Expression>,
    pub to_expr: Box<Expression>,
    pub step_expr: Option<Box<Expression>>,
    pub statement: Box<Statement>,
    pub unroll: ExpressionValue<bool>,
    pub location: SourceLocation,
}

/// `for ident in array`.
#[derive(Clone, Debug, PartialEq)]
pub struct ForEachStatement {
    pub var_name: String,
    pub var_index: Option<usize>,
    pub expression: Box<Expression>,
    pub statement: Box<Statement>,
    pub unroll: ExpressionValue<bool>,
    pub location: SourceLocation,
}

/// `import a, b as c from Module;`
#[derive(Clone, Debug, PartialEq)]
pub struct ImportStatement {
    pub module_name: String,
    pub identifiers: Vec<ImportIdentifier>,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImportIdentifier {
    /// Imported symbol name; `*` imports everything the module exports.
    pub identifier: String,
    pub renamed_identifier: Option<String>,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct MultiStatement {
    pub statements: Vec<Statement>,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NoOpStatement {
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReturnStatement {
    pub returned_expr: Option<Expression>,
    pub location: SourceLocation,
}

/// An explicit `{ ... }` scope.
#[derive(Clone, Debug, PartialEq)]
pub struct ScopedStatement {
    pub statement: Box<Statement>,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WhileStatement {
    pub condition: Box<Expression>,
    pub body: Box<Statement>,
    pub unroll: ExpressionValue<bool>,
    pub location: SourceLocation,
}

macro_rules! for_each_statement {
    ($self:ident, $node:ident => $body:expr) => {
        match $self {
            Statement::Branch($node) => $body,
            Statement::Break($node) => $body,
            Statement::Conditional($node) => $body,
            Statement::Continue($node) => $body,
            Statement::DeclareAlias($node) => $body,
            Statement::DeclareConst($node) => $body,
            Statement::DeclareExternal($node) => $body,
            Statement::DeclareFunction($node) => $body,
            Statement::DeclareOption($node) => $body,
            Statement::DeclareStruct($node) => $body,
            Statement::DeclareVariable($node) => $body,
            Statement::Discard($node) => $body,
            Statement::Expression($node) => $body,
            Statement::For($node) => $body,
            Statement::ForEach($node) => $body,
            Statement::Import($node) => $body,
            Statement::Multi($node) => $body,
            Statement::NoOp($node) => $body,
            Statement::Return($node) => $body,
            Statement::Scoped($node) => $body,
            Statement::While($node) => $body,
        }
    };
}

impl Statement {
    pub fn location(&self) -> &SourceLocation {
        for_each_statement!(self, node => &node.location)
    }

    /// A no-op statement, used when a pass removes a node it cannot
    /// splice out.
    pub fn no_op(location: SourceLocation) -> Statement {
        Statement::NoOp(NoOpStatement { location })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ConstantValue;

    #[test]
    fn test_constant_expression_caches_type() {
        let expr = Expression::constant(ConstantValue::f32(1.0), SourceLocation::default());
        assert_eq!(expr.cached_type().unwrap().to_string(), "f32");
    }

    #[test]
    fn test_expression_value_states() {
        let mut value: ExpressionValue<u32> = ExpressionValue::None;
        assert!(!value.has_value());
        value = ExpressionValue::Value(3);
        assert!(value.is_resolved());
        assert_eq!(value.as_value(), Some(&3));
    }

    #[test]
    fn test_set_cached_type() {
        let mut expr = Expression::Identifier(IdentifierExpression {
            identifier: String::from("x"),
            cached_type: None,
            location: SourceLocation::default(),
        });
        assert!(expr.cached_type().is_none());
        expr.set_cached_type(ExpressionType::i32());
        assert_eq!(expr.cached_type(), Some(&ExpressionType::i32()));
    }
}
