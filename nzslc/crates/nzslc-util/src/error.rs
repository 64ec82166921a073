//! Compiler error taxonomy.
//!
//! Errors are split into four closed families, one enum per family:
//! lexing, parsing, AST invariant violations and semantic (compilation)
//! errors. Every error is paired with a [`SourceLocation`] inside
//! [`Error`], and formats as
//! `file(line, col): <Category> error: <message>` the way drivers and IDE
//! integrations expect.
//!
//! Passes never swallow errors: they either fail fast with a `Result` or,
//! under partial compilation, leave unresolved nodes in place for a later
//! pass. No error text is ever written onto AST nodes.

use crate::span::SourceLocation;
use std::fmt;
use thiserror::Error;

/// Result alias used across all compiler phases.
pub type Result<T> = std::result::Result<T, Error>;

/// The four error families.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Ast,
    Compilation,
    Lexing,
    Parsing,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Ast => "Ast",
            ErrorCategory::Compilation => "Compilation",
            ErrorCategory::Lexing => "Lexing",
            ErrorCategory::Parsing => "Parsing",
        }
    }
}

/// Errors raised while turning bytes into tokens.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum LexingError {
    #[error("bad number")]
    BadNumber,

    #[error("number is out of range")]
    NumberOutOfRange,

    #[error("unfinished string")]
    UnfinishedString,

    #[error("unrecognized character")]
    UnrecognizedChar,

    #[error("unrecognized token")]
    UnrecognizedToken,
}

/// Errors raised while turning tokens into an AST.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ParsingError {
    #[error("attribute {attribute} requires a string parameter")]
    AttributeExpectString { attribute: String },

    #[error("attribute {attribute} is missing a parameter")]
    AttributeMissingParameter { attribute: String },

    #[error("attribute {attribute} can only be present once")]
    AttributeMultipleUnique { attribute: String },

    #[error("attribute {attribute} has an invalid parameter ({parameter})")]
    AttributeInvalidParameter { attribute: String, parameter: String },

    #[error("attribute {attribute} does not take {count} parameter(s)")]
    AttributeUnexpectedParameterCount { attribute: String, count: usize },

    #[error("\"{version}\" is not a valid version")]
    InvalidVersion { version: String },

    #[error("missing mandatory attribute {attribute}")]
    MissingAttribute { attribute: String },

    #[error("{identifier} is a reserved keyword")]
    ReservedKeyword { identifier: String },

    #[error("unexpected attribute {attribute} on this declaration")]
    UnexpectedAttribute { attribute: String },

    #[error("unexpected token {token}")]
    UnexpectedToken { token: String },

    #[error("unknown attribute \"{attribute}\"")]
    UnknownAttribute { attribute: String },
}

/// Invariant violations between passes (these indicate a broken pass
/// pipeline rather than bad user code).
#[derive(Clone, Debug, Error, PartialEq)]
pub enum AstError {
    #[error("index {index} is already used")]
    AlreadyUsedIndex { index: usize },

    #[error("cannot preregister used index {index}")]
    AlreadyUsedIndexPreregister { index: usize },

    #[error("missing {kind} index")]
    ExpectedIndex { kind: &'static str },

    #[error("invalid {kind} index {index}")]
    InvalidIndex { kind: &'static str, index: usize },

    #[error("expression has no type")]
    MissingType,

    #[error("unresolved identifier \"{identifier}\"")]
    UnresolvedIdentifier { identifier: String },

    #[error("untyped literal was not resolved")]
    UntypedLiteral,
}

/// Semantic errors: typing, binding, intrinsic signatures, options,
/// modules.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum CompilationError {
    #[error("array length is required")]
    ArrayLengthRequired,

    #[error("incompatible types ({left} and {right})")]
    BinaryIncompatibleTypes { left: String, right: String },

    #[error("type {ty} does not support operator {op}")]
    BinaryUnsupported { op: &'static str, ty: String },

    #[error("builtin {builtin} is not available in {stage} stage")]
    BuiltinUnsupportedStage {
        builtin: &'static str,
        stage: &'static str,
    },

    #[error("cannot cast {from} to {to}")]
    CastIncompatibleTypes { from: String, to: String },

    #[error("cast components count mismatch (expected {expected}, got {got})")]
    CastComponentMismatch { expected: u32, got: u32 },

    #[error("circular import detected on module {module}")]
    CircularImport { module: String },

    #[error("expected a boolean condition, got {got}")]
    ConditionExpectedBool { got: String },

    #[error("option {option} has conflicting default values")]
    ConflictingOptionDefaultValues { option: String },

    #[error("a constant expression is required")]
    ConstantExpressionRequired,

    #[error("integer division by zero")]
    DivisionByZero,

    #[error("entry function can only have one parameter")]
    EntryFunctionParameter,

    #[error("entry point {stage} is already defined")]
    EntryPointAlreadyDefined { stage: &'static str },

    #[error("expected a function, got {got}")]
    ExpectedFunction { got: String },

    #[error("binding (set={set}, binding={binding}) is already in use")]
    ExtBindingAlreadyUsed { set: u32, binding: u32 },

    #[error("external variable requires a binding index")]
    ExtMissingBindingIndex,

    #[error("externals cannot have type {ty}")]
    ExtTypeNotAllowed { ty: String },

    #[error("module feature {feature} is not enabled")]
    FeatureNotEnabled { feature: &'static str },

    #[error("for-each is not supported on type {ty}")]
    ForEachUnsupportedType { ty: String },

    #[error("entry function {name} cannot be called")]
    FunctionCallUnexpectedEntryFunction { name: String },

    #[error("function expects {expected} parameter(s), but got {got}")]
    FunctionCallUnmatchingParameterCount { expected: u32, got: u32 },

    #[error("function parameter #{index} type mismatch (expected {expected}, got {got})")]
    FunctionCallUnmatchingParameterType {
        index: u32,
        expected: String,
        got: String,
    },

    #[error("identifier {identifier} is already used")]
    IdentifierAlreadyUsed { identifier: String },

    #[error("indices must be integers, got {got}")]
    IndexRequiresIntegerIndices { got: String },

    #[error("type {ty} cannot be indexed")]
    IndexUnexpectedType { ty: String },

    #[error("intrinsic {intrinsic} expects {expected} parameter(s), got {got}")]
    IntrinsicExpectedParameterCount {
        intrinsic: &'static str,
        expected: u32,
        got: u32,
    },

    #[error("intrinsic {intrinsic} parameter #{index} does not match its signature")]
    IntrinsicSignatureMismatch { intrinsic: &'static str, index: u32 },

    #[error("invalid scalar swizzle")]
    InvalidScalarSwizzle,

    #[error("invalid swizzle {swizzle}")]
    InvalidSwizzle { swizzle: String },

    #[error("literal is out of range for {ty}")]
    LiteralOutOfRange { ty: &'static str },

    #[error("{keyword} must be used inside a loop")]
    LoopControlOutsideOfLoop { keyword: &'static str },

    #[error("missing option value for {option}")]
    MissingOptionValue { option: String },

    #[error("compute entry functions require a workgroup attribute")]
    MissingWorkgroupAttribute,

    #[error("module {module} failed to compile: {error}")]
    ModuleCompilationFailed { module: String, error: String },

    #[error("module {module} was not found")]
    ModuleNotFound { module: String },

    #[error("expression is not assignable")]
    NotAssignable,

    #[error("partial type parameter #{index} must be a {expected}")]
    PartialTypeParameter { index: u32, expected: &'static str },

    #[error("expected a struct, got {got}")]
    StructExpected { got: String },

    #[error("struct {inner} layout does not match containing layout {outer}")]
    StructLayoutInnerMismatch { inner: String, outer: String },

    #[error("cannot write to the same component twice in a swizzle")]
    SwizzleWriteDuplicate,

    #[error("expected a type, got {got}")]
    TypeExpected { got: String },

    #[error("type {ty} does not support unary operator {op}")]
    UnaryUnsupported { op: &'static str, ty: String },

    #[error("type {ty} cannot be accessed")]
    UnexpectedAccessedType { ty: String },

    #[error("unknown field {field}")]
    UnknownField { field: String },

    #[error("unknown identifier {identifier}")]
    UnknownIdentifier { identifier: String },

    #[error("type {ty} has no method {method}")]
    UnknownMethod { method: String, ty: String },

    #[error("unmatching types ({left} and {right})")]
    UnmatchingTypes { left: String, right: String },

    #[error("variable declaration requires a type or an initial value")]
    VarDeclarationMissingTypeAndValue,
}

/// Kind of a compiler error, one variant per family.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ErrorKind {
    #[error(transparent)]
    Ast(#[from] AstError),

    #[error(transparent)]
    Compilation(#[from] CompilationError),

    #[error(transparent)]
    Lexing(#[from] LexingError),

    #[error(transparent)]
    Parsing(#[from] ParsingError),
}

/// A compiler error: a kind plus the source range it applies to.
#[derive(Clone, Debug, PartialEq)]
pub struct Error {
    pub location: SourceLocation,
    pub kind: ErrorKind,
}

impl Error {
    pub fn new(location: SourceLocation, kind: impl Into<ErrorKind>) -> Self {
        Self {
            location,
            kind: kind.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self.kind {
            ErrorKind::Ast(_) => ErrorCategory::Ast,
            ErrorKind::Compilation(_) => ErrorCategory::Compilation,
            ErrorKind::Lexing(_) => ErrorCategory::Lexing,
            ErrorKind::Parsing(_) => ErrorCategory::Parsing,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} error: {}",
            self.location,
            self.category().as_str(),
            self.kind
        )
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_category() {
        let err = Error::new(SourceLocation::default(), LexingError::BadNumber);
        assert_eq!(err.category(), ErrorCategory::Lexing);

        let err = Error::new(
            SourceLocation::default(),
            CompilationError::ConstantExpressionRequired,
        );
        assert_eq!(err.category(), ErrorCategory::Compilation);
    }

    #[test]
    fn test_display_with_location() {
        let file = Arc::new(String::from("shader.nzsl"));
        let err = Error::new(
            SourceLocation::new(Some(file), 4, 2),
            ParsingError::UnexpectedToken {
                token: String::from("Semicolon"),
            },
        );
        assert_eq!(
            err.to_string(),
            "shader.nzsl(4, 2): Parsing error: unexpected token Semicolon"
        );
    }

    #[test]
    fn test_display_without_location() {
        let err = Error::new(SourceLocation::default(), AstError::MissingType);
        assert_eq!(err.to_string(), "?: Ast error: expression has no type");
    }

    #[test]
    fn test_binding_error_message() {
        let err = Error::new(
            SourceLocation::default(),
            CompilationError::ExtBindingAlreadyUsed { set: 0, binding: 1 },
        );
        assert_eq!(
            err.to_string(),
            "?: Compilation error: binding (set=0, binding=1) is already in use"
        );
    }
}
