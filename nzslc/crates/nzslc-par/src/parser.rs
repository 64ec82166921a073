//! Recursive-descent parser.
//!
//! Turns the token vector into one [`Module`]. The parser performs no
//! identifier resolution: names stay as [`IdentifierExpression`] /
//! [`AccessIdentifierExpression`] member paths, types stay as type
//! expressions (`vec3[f32]` is an index access on the identifier `vec3`),
//! and attribute arguments that are not compile-time-mapped keywords stay
//! as expressions for the resolve pass to evaluate.
//!
//! Only local lookahead is used (at most two tokens).

use crate::ast::*;
use nzslc_lex::{tokenize, Token, TokenKind};
use nzslc_util::{Error, ParsingError, Result, SourceLocation, StructLayout};

/// Parses a full module from source text.
pub fn parse_source(source: &str, file_path: Option<&str>) -> Result<Module> {
    let tokens = tokenize(source, file_path)?;
    parse_tokens(&tokens)
}

/// Parses a full module from source text without a file path.
pub fn parse(source: &str) -> Result<Module> {
    parse_source(source, None)
}

/// Parses a full module from an already-lexed token sequence.
pub fn parse_tokens(tokens: &[Token]) -> Result<Module> {
    if tokens.is_empty() {
        return Err(Error::new(
            SourceLocation::default(),
            ParsingError::UnexpectedToken {
                token: String::from("EndOfStream"),
            },
        ));
    }
    Parser::new(tokens).parse_module()
}

/// Attribute names recognized on declarations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AttributeType {
    Author,
    AutoBinding,
    Binding,
    Builtin,
    Cond,
    DepthWrite,
    Desc,
    EarlyFragmentTests,
    Entry,
    Export,
    Feature,
    Interp,
    Layout,
    License,
    Location,
    NzslVersion,
    Set,
    Tag,
    Unroll,
    Workgroup,
}

impl AttributeType {
    fn from_identifier(name: &str) -> Option<Self> {
        Some(match name {
            "author" => AttributeType::Author,
            "auto_binding" => AttributeType::AutoBinding,
            "binding" => AttributeType::Binding,
            "builtin" => AttributeType::Builtin,
            "cond" => AttributeType::Cond,
            "depth_write" => AttributeType::DepthWrite,
            "desc" => AttributeType::Desc,
            "early_fragment_tests" => AttributeType::EarlyFragmentTests,
            "entry" => AttributeType::Entry,
            "export" => AttributeType::Export,
            "feature" => AttributeType::Feature,
            "interp" => AttributeType::Interp,
            "layout" => AttributeType::Layout,
            "license" => AttributeType::License,
            "location" => AttributeType::Location,
            "nzsl_version" => AttributeType::NzslVersion,
            "set" => AttributeType::Set,
            "tag" => AttributeType::Tag,
            "unroll" => AttributeType::Unroll,
            "workgroup" => AttributeType::Workgroup,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            AttributeType::Author => "author",
            AttributeType::AutoBinding => "auto_binding",
            AttributeType::Binding => "binding",
            AttributeType::Builtin => "builtin",
            AttributeType::Cond => "cond",
            AttributeType::DepthWrite => "depth_write",
            AttributeType::Desc => "desc",
            AttributeType::EarlyFragmentTests => "early_fragment_tests",
            AttributeType::Entry => "entry",
            AttributeType::Export => "export",
            AttributeType::Feature => "feature",
            AttributeType::Interp => "interp",
            AttributeType::Layout => "layout",
            AttributeType::License => "license",
            AttributeType::Location => "location",
            AttributeType::NzslVersion => "nzsl_version",
            AttributeType::Set => "set",
            AttributeType::Tag => "tag",
            AttributeType::Unroll => "unroll",
            AttributeType::Workgroup => "workgroup",
        }
    }
}

#[derive(Debug)]
struct Attribute {
    ty: AttributeType,
    args: Vec<Expression>,
    location: SourceLocation,
}

struct Parser<'a> {
    tokens: &'a [Token],
    index: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, index: 0 }
    }

    // -----------------------------------------------------------------------
    // Flow control
    // -----------------------------------------------------------------------

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.index)
            .unwrap_or_else(|| self.tokens.last().expect("token stream is never empty"))
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.index + offset)
            .unwrap_or_else(|| self.tokens.last().expect("token stream is never empty"))
    }

    fn advance(&mut self) -> &Token {
        let token = self
            .tokens
            .get(self.index)
            .unwrap_or_else(|| self.tokens.last().expect("token stream is never empty"));
        if self.index < self.tokens.len() {
            self.index += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    fn consume_if(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn unexpected(&self, token: &Token) -> Error {
        Error::new(
            token.location.clone(),
            ParsingError::UnexpectedToken {
                token: token.kind.name().to_owned(),
            },
        )
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<&Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(self.peek()))
        }
    }

    fn expect_identifier(&mut self) -> Result<(String, SourceLocation)> {
        match &self.peek().kind {
            TokenKind::Identifier(_) => {
                let token = self.advance();
                let TokenKind::Identifier(name) = &token.kind else {
                    unreachable!()
                };
                Ok((name.clone(), token.location.clone()))
            }
            _ => Err(self.unexpected(self.peek())),
        }
    }

    fn expect_string(&mut self) -> Result<(String, SourceLocation)> {
        match &self.peek().kind {
            TokenKind::StringValue(_) => {
                let token = self.advance();
                let TokenKind::StringValue(value) = &token.kind else {
                    unreachable!()
                };
                Ok((value.clone(), token.location.clone()))
            }
            _ => Err(self.unexpected(self.peek())),
        }
    }

    // -----------------------------------------------------------------------
    // Attributes
    // -----------------------------------------------------------------------

    /// Parses zero or more `[attr(args...), attr]` groups.
    fn parse_attributes(&mut self) -> Result<Vec<Attribute>> {
        let mut attributes = Vec::new();
        while self.check(&TokenKind::OpenSquareBracket) {
            self.advance();
            loop {
                let (name, location) = self.expect_identifier()?;
                let ty = AttributeType::from_identifier(&name).ok_or_else(|| {
                    Error::new(
                        location.clone(),
                        ParsingError::UnknownAttribute { attribute: name },
                    )
                })?;

                let mut args = Vec::new();
                if self.consume_if(&TokenKind::OpenParenthesis) {
                    if !self.check(&TokenKind::ClosingParenthesis) {
                        loop {
                            args.push(self.parse_expression()?);
                            if !self.consume_if(&TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(&TokenKind::ClosingParenthesis)?;
                }

                attributes.push(Attribute {
                    ty,
                    args,
                    location,
                });

                if !self.consume_if(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::ClosingSquareBracket)?;
        }
        Ok(attributes)
    }

    fn attribute_error(attribute: &Attribute, error: ParsingError) -> Error {
        Error::new(attribute.location.clone(), error)
    }

    fn single_argument(attribute: Attribute) -> Result<(Expression, SourceLocation)> {
        let name = attribute.ty.name().to_owned();
        let location = attribute.location;
        let mut args = attribute.args;
        match args.len() {
            1 => Ok((args.pop().expect("length checked"), location)),
            0 => Err(Error::new(
                location,
                ParsingError::AttributeMissingParameter { attribute: name },
            )),
            count => Err(Error::new(
                location,
                ParsingError::AttributeUnexpectedParameterCount {
                    attribute: name,
                    count,
                },
            )),
        }
    }

    fn string_argument(attribute: Attribute) -> Result<(String, SourceLocation)> {
        let name = attribute.ty.name().to_owned();
        let (arg, location) = Self::single_argument(attribute)?;
        match arg {
            Expression::ConstantValue(ConstantValueExpression {
                value: ConstantValue::Single(ConstantSingleValue::String(value)),
                ..
            }) => Ok((value, location)),
            _ => Err(Error::new(
                location,
                ParsingError::AttributeExpectString { attribute: name },
            )),
        }
    }

    fn identifier_argument(attribute: Attribute) -> Result<(String, SourceLocation)> {
        let name = attribute.ty.name().to_owned();
        let (arg, location) = Self::single_argument(attribute)?;
        match arg {
            Expression::Identifier(IdentifierExpression { identifier, .. }) => {
                Ok((identifier, location))
            }
            _ => Err(Error::new(
                location,
                ParsingError::AttributeMissingParameter { attribute: name },
            )),
        }
    }

    /// Installs a unique expression-valued attribute, rejecting
    /// duplicates.
    fn handle_unique_attribute<T>(
        target: &mut ExpressionValue<T>,
        attribute: Attribute,
    ) -> Result<()> {
        if target.has_value() {
            return Err(Self::attribute_error(
                &attribute,
                ParsingError::AttributeMultipleUnique {
                    attribute: attribute.ty.name().to_owned(),
                },
            ));
        }
        let (arg, _) = Self::single_argument(attribute)?;
        *target = ExpressionValue::Expression(Box::new(arg));
        Ok(())
    }

    /// Installs a unique flag attribute (`[export]`-style, no argument =
    /// true, or one expression).
    fn handle_unique_flag_attribute(
        target: &mut ExpressionValue<bool>,
        attribute: Attribute,
    ) -> Result<()> {
        if target.has_value() {
            return Err(Self::attribute_error(
                &attribute,
                ParsingError::AttributeMultipleUnique {
                    attribute: attribute.ty.name().to_owned(),
                },
            ));
        }
        if attribute.args.is_empty() {
            *target = ExpressionValue::Value(true);
            Ok(())
        } else {
            let (arg, _) = Self::single_argument(attribute)?;
            *target = ExpressionValue::Expression(Box::new(arg));
            Ok(())
        }
    }

    /// Installs a unique attribute whose argument is one of a closed set
    /// of keywords.
    fn handle_unique_mapped_attribute<T>(
        target: &mut ExpressionValue<T>,
        attribute: Attribute,
        map: impl Fn(&str) -> Option<T>,
    ) -> Result<()> {
        if target.has_value() {
            return Err(Self::attribute_error(
                &attribute,
                ParsingError::AttributeMultipleUnique {
                    attribute: attribute.ty.name().to_owned(),
                },
            ));
        }
        let name = attribute.ty.name().to_owned();
        let (identifier, location) = Self::identifier_argument(attribute)?;
        match map(&identifier) {
            Some(value) => {
                *target = ExpressionValue::Value(value);
                Ok(())
            }
            None => Err(Error::new(
                location,
                ParsingError::AttributeInvalidParameter {
                    attribute: name,
                    parameter: identifier,
                },
            )),
        }
    }

    fn reject_attribute(attribute: Attribute) -> Error {
        Self::attribute_error(
            &attribute,
            ParsingError::UnexpectedAttribute {
                attribute: attribute.ty.name().to_owned(),
            },
        )
    }

    // -----------------------------------------------------------------------
    // Module
    // -----------------------------------------------------------------------

    fn parse_module(mut self) -> Result<Module> {
        let attributes = self.parse_attributes()?;
        let module_token_location = self.peek().location.clone();

        let mut lang_version = None;
        let mut metadata = Metadata::default();
        for attribute in attributes {
            match attribute.ty {
                AttributeType::NzslVersion => {
                    if lang_version.is_some() {
                        return Err(Self::attribute_error(
                            &attribute,
                            ParsingError::AttributeMultipleUnique {
                                attribute: String::from("nzsl_version"),
                            },
                        ));
                    }
                    let (text, location) = Self::string_argument(attribute)?;
                    let version = Version::parse(&text).ok_or_else(|| {
                        Error::new(location, ParsingError::InvalidVersion { version: text })
                    })?;
                    lang_version = Some(version);
                }
                AttributeType::Author => {
                    metadata.author = Self::string_argument(attribute)?.0;
                }
                AttributeType::Desc => {
                    metadata.description = Self::string_argument(attribute)?.0;
                }
                AttributeType::License => {
                    metadata.license = Self::string_argument(attribute)?.0;
                }
                AttributeType::Feature => {
                    let (identifier, location) = Self::identifier_argument(attribute)?;
                    let feature = ModuleFeature::from_identifier(&identifier).ok_or_else(|| {
                        Error::new(
                            location,
                            ParsingError::AttributeInvalidParameter {
                                attribute: String::from("feature"),
                                parameter: identifier,
                            },
                        )
                    })?;
                    if !metadata.enabled_features.contains(&feature) {
                        metadata.enabled_features.push(feature);
                    }
                }
                _ => return Err(Self::reject_attribute(attribute)),
            }
        }

        let Some(lang_version) = lang_version else {
            return Err(Error::new(
                module_token_location,
                ParsingError::MissingAttribute {
                    attribute: String::from("nzsl_version"),
                },
            ));
        };
        metadata.lang_version = lang_version;

        self.expect(&TokenKind::Module)?;
        if !self.check(&TokenKind::Semicolon) {
            metadata.module_name = self.parse_module_name()?;
        }
        self.expect(&TokenKind::Semicolon)?;

        let mut module = Module::new(metadata);
        loop {
            if self.check(&TokenKind::EndOfStream) {
                break;
            }
            let statement = self.parse_root_statement()?;
            module.root.statements.push(statement);
        }

        Ok(module)
    }

    /// Parses a dotted module name (`Engine.Lighting.Phong`).
    fn parse_module_name(&mut self) -> Result<String> {
        let (mut name, _) = self.expect_identifier()?;
        while self.consume_if(&TokenKind::Dot) {
            let (part, _) = self.expect_identifier()?;
            name.push('.');
            name.push_str(&part);
        }
        Ok(name)
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    fn parse_root_statement(&mut self) -> Result<Statement> {
        let attributes = self.parse_attributes()?;
        match &self.peek().kind {
            TokenKind::Alias => {
                Self::reject_all(attributes)?;
                self.parse_alias_declaration()
            }
            TokenKind::Const => self.parse_const_statement(attributes),
            TokenKind::External => self.parse_external_block(attributes),
            TokenKind::FunctionDeclaration => self.parse_function_declaration(attributes),
            TokenKind::Import => {
                Self::reject_all(attributes)?;
                self.parse_import_statement()
            }
            TokenKind::Option => {
                Self::reject_all(attributes)?;
                self.parse_option_declaration()
            }
            TokenKind::Struct => self.parse_struct_declaration(attributes),
            _ => Err(self.unexpected(self.peek())),
        }
    }

    fn reject_all(attributes: Vec<Attribute>) -> Result<()> {
        if let Some(attribute) = attributes.into_iter().next() {
            return Err(Self::reject_attribute(attribute));
        }
        Ok(())
    }

    fn parse_alias_declaration(&mut self) -> Result<Statement> {
        let start = self.expect(&TokenKind::Alias)?.location.clone();
        let (name, _) = self.expect_identifier()?;
        self.expect(&TokenKind::Assign)?;
        let expression = self.parse_type_expression()?;
        let end = self.expect(&TokenKind::Semicolon)?.location.clone();

        Ok(Statement::DeclareAlias(DeclareAliasStatement {
            name,
            alias_index: None,
            expression: Box::new(expression),
            location: SourceLocation::build_from_to(&start, &end),
        }))
    }

    /// `const name [: type] = expr;` or `const if (...) ...`.
    fn parse_const_statement(&mut self, attributes: Vec<Attribute>) -> Result<Statement> {
        let start = self.expect(&TokenKind::Const)?.location.clone();

        if self.check(&TokenKind::If) {
            Self::reject_all(attributes)?;
            return self.parse_branch_statement(start, true);
        }

        let mut is_exported = ExpressionValue::None;
        for attribute in attributes {
            match attribute.ty {
                AttributeType::Export => {
                    Self::handle_unique_flag_attribute(&mut is_exported, attribute)?
                }
                _ => return Err(Self::reject_attribute(attribute)),
            }
        }

        let (name, _) = self.expect_identifier()?;
        let mut ty = ExpressionValue::None;
        if self.consume_if(&TokenKind::Colon) {
            ty = ExpressionValue::Expression(Box::new(self.parse_type_expression()?));
        }
        self.expect(&TokenKind::Assign)?;
        let expression = self.parse_expression()?;
        let end = self.expect(&TokenKind::Semicolon)?.location.clone();

        Ok(Statement::DeclareConst(DeclareConstStatement {
            name,
            const_index: None,
            ty,
            expression: Box::new(expression),
            is_exported,
            location: SourceLocation::build_from_to(&start, &end),
        }))
    }

    fn parse_option_declaration(&mut self) -> Result<Statement> {
        let start = self.expect(&TokenKind::Option)?.location.clone();
        let (name, _) = self.expect_identifier()?;
        self.expect(&TokenKind::Colon)?;
        let ty = ExpressionValue::Expression(Box::new(self.parse_type_expression()?));

        let mut default_value = None;
        if self.consume_if(&TokenKind::Assign) {
            default_value = Some(Box::new(self.parse_expression()?));
        }
        let end = self.expect(&TokenKind::Semicolon)?.location.clone();

        Ok(Statement::DeclareOption(DeclareOptionStatement {
            name,
            opt_index: None,
            ty,
            default_value,
            location: SourceLocation::build_from_to(&start, &end),
        }))
    }

    fn parse_import_statement(&mut self) -> Result<Statement> {
        let start = self.expect(&TokenKind::Import)?.location.clone();

        // `import Module.Name;` (whole module) or
        // `import a, b as c from Module.Name;`
        let mut identifiers = Vec::new();
        let whole_module = {
            // an identifier list is followed by `from`; a module path is
            // followed by `.`, `;` or `as`
            let mut offset = 0;
            loop {
                match &self.peek_at(offset).kind {
                    TokenKind::Identifier(_) | TokenKind::Multiply => offset += 1,
                    TokenKind::Comma | TokenKind::As => break false,
                    TokenKind::From => break false,
                    _ => break true,
                }
            }
        };

        if whole_module {
            let module_name = self.parse_module_name()?;
            let end = self.expect(&TokenKind::Semicolon)?.location.clone();
            return Ok(Statement::Import(ImportStatement {
                module_name,
                identifiers,
                location: SourceLocation::build_from_to(&start, &end),
            }));
        }

        loop {
            let (identifier, location) = if self.consume_if(&TokenKind::Multiply) {
                (String::from("*"), start.clone())
            } else {
                self.expect_identifier()?
            };

            let mut renamed_identifier = None;
            if self.consume_if(&TokenKind::As) {
                renamed_identifier = Some(self.expect_identifier()?.0);
            }

            identifiers.push(ImportIdentifier {
                identifier,
                renamed_identifier,
                location,
            });

            if !self.consume_if(&TokenKind::Comma) {
                break;
            }
        }

        self.expect(&TokenKind::From)?;
        let module_name = self.parse_module_name()?;
        let end = self.expect(&TokenKind::Semicolon)?.location.clone();

        Ok(Statement::Import(ImportStatement {
            module_name,
            identifiers,
            location: SourceLocation::build_from_to(&start, &end),
        }))
    }

    fn parse_struct_declaration(&mut self, attributes: Vec<Attribute>) -> Result<Statement> {
        let mut layout = ExpressionValue::None;
        let mut is_exported = ExpressionValue::None;
        let mut tag = String::new();
        for attribute in attributes {
            match attribute.ty {
                AttributeType::Layout => Self::handle_unique_mapped_attribute(
                    &mut layout,
                    attribute,
                    |name| match name {
                        "scalar" => Some(StructLayout::Scalar),
                        "std140" => Some(StructLayout::Std140),
                        "std430" => Some(StructLayout::Std430),
                        _ => None,
                    },
                )?,
                AttributeType::Export => {
                    Self::handle_unique_flag_attribute(&mut is_exported, attribute)?
                }
                AttributeType::Tag => tag = Self::string_argument(attribute)?.0,
                _ => return Err(Self::reject_attribute(attribute)),
            }
        }

        let start = self.expect(&TokenKind::Struct)?.location.clone();
        let (name, _) = self.expect_identifier()?;
        self.expect(&TokenKind::OpenCurlyBracket)?;

        let mut members = Vec::new();
        while !self.check(&TokenKind::ClosingCurlyBracket) {
            members.push(self.parse_struct_member()?);
            if !self.consume_if(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(&TokenKind::ClosingCurlyBracket)?.location.clone();

        Ok(Statement::DeclareStruct(DeclareStructStatement {
            struct_index: None,
            description: StructDescription {
                name,
                layout,
                tag,
                members,
            },
            is_exported,
            location: SourceLocation::build_from_to(&start, &end),
        }))
    }

    fn parse_struct_member(&mut self) -> Result<StructMember> {
        let attributes = self.parse_attributes()?;

        let mut builtin = ExpressionValue::None;
        let mut location_index = ExpressionValue::None;
        let mut interp = ExpressionValue::None;
        let mut cond = ExpressionValue::None;
        let mut tag = String::new();
        for attribute in attributes {
            match attribute.ty {
                AttributeType::Builtin => Self::handle_unique_mapped_attribute(
                    &mut builtin,
                    attribute,
                    BuiltinEntry::from_identifier,
                )?,
                AttributeType::Location => {
                    Self::handle_unique_attribute(&mut location_index, attribute)?
                }
                AttributeType::Interp => Self::handle_unique_mapped_attribute(
                    &mut interp,
                    attribute,
                    |name| match name {
                        "flat" => Some(InterpolationQualifier::Flat),
                        "no_perspective" => Some(InterpolationQualifier::NoPerspective),
                        "smooth" => Some(InterpolationQualifier::Smooth),
                        _ => None,
                    },
                )?,
                AttributeType::Cond => Self::handle_unique_attribute(&mut cond, attribute)?,
                AttributeType::Tag => tag = Self::string_argument(attribute)?.0,
                _ => return Err(Self::reject_attribute(attribute)),
            }
        }

        let (name, member_location) = self.expect_identifier()?;
        self.expect(&TokenKind::Colon)?;
        let ty = self.parse_type_expression()?;

        Ok(StructMember {
            name,
            ty: ExpressionValue::Expression(Box::new(ty)),
            builtin,
            location_index,
            interp,
            cond,
            tag,
            location: member_location,
        })
    }

    fn parse_external_block(&mut self, attributes: Vec<Attribute>) -> Result<Statement> {
        let mut auto_binding = ExpressionValue::None;
        let mut binding_set = ExpressionValue::None;
        let mut tag = String::new();
        for attribute in attributes {
            match attribute.ty {
                AttributeType::AutoBinding => {
                    Self::handle_unique_flag_attribute(&mut auto_binding, attribute)?
                }
                AttributeType::Set => Self::handle_unique_attribute(&mut binding_set, attribute)?,
                AttributeType::Tag => tag = Self::string_argument(attribute)?.0,
                _ => return Err(Self::reject_attribute(attribute)),
            }
        }

        let start = self.expect(&TokenKind::External)?.location.clone();
        let mut name = None;
        if let TokenKind::Identifier(_) = self.peek().kind {
            name = Some(self.expect_identifier()?.0);
        }
        self.expect(&TokenKind::OpenCurlyBracket)?;

        let mut external_vars = Vec::new();
        while !self.check(&TokenKind::ClosingCurlyBracket) {
            external_vars.push(self.parse_external_var()?);
            if !self.consume_if(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(&TokenKind::ClosingCurlyBracket)?.location.clone();

        Ok(Statement::DeclareExternal(DeclareExternalStatement {
            name,
            external_index: None,
            auto_binding,
            binding_set,
            tag,
            external_vars,
            location: SourceLocation::build_from_to(&start, &end),
        }))
    }

    fn parse_external_var(&mut self) -> Result<ExternalVar> {
        let attributes = self.parse_attributes()?;

        let mut binding_set = ExpressionValue::None;
        let mut binding_index = ExpressionValue::None;
        let mut tag = String::new();
        for attribute in attributes {
            match attribute.ty {
                AttributeType::Set => Self::handle_unique_attribute(&mut binding_set, attribute)?,
                AttributeType::Binding => {
                    Self::handle_unique_attribute(&mut binding_index, attribute)?
                }
                AttributeType::AutoBinding => {
                    // block-level attribute reused on a variable is a
                    // placement error
                    return Err(Self::reject_attribute(attribute));
                }
                AttributeType::Tag => tag = Self::string_argument(attribute)?.0,
                _ => return Err(Self::reject_attribute(attribute)),
            }
        }

        let (name, location) = self.expect_identifier()?;
        self.expect(&TokenKind::Colon)?;
        let ty = self.parse_type_expression()?;

        Ok(ExternalVar {
            name,
            ty: ExpressionValue::Expression(Box::new(ty)),
            binding_set,
            binding_index,
            tag,
            var_index: None,
            location,
        })
    }

    fn parse_function_declaration(&mut self, attributes: Vec<Attribute>) -> Result<Statement> {
        let mut entry_stage = ExpressionValue::None;
        let mut depth_write = ExpressionValue::None;
        let mut early_fragment_tests = ExpressionValue::None;
        let mut is_exported = ExpressionValue::None;
        let mut workgroup_size = ExpressionValue::None;
        let mut cond = ExpressionValue::None;
        for attribute in attributes {
            match attribute.ty {
                AttributeType::Entry => Self::handle_unique_mapped_attribute(
                    &mut entry_stage,
                    attribute,
                    ShaderStage::from_identifier,
                )?,
                AttributeType::DepthWrite => Self::handle_unique_mapped_attribute(
                    &mut depth_write,
                    attribute,
                    |name| match name {
                        "greater" => Some(DepthWriteMode::Greater),
                        "less" => Some(DepthWriteMode::Less),
                        "replace" => Some(DepthWriteMode::Replace),
                        "unchanged" => Some(DepthWriteMode::Unchanged),
                        _ => None,
                    },
                )?,
                AttributeType::EarlyFragmentTests => {
                    Self::handle_unique_flag_attribute(&mut early_fragment_tests, attribute)?
                }
                AttributeType::Export => {
                    Self::handle_unique_flag_attribute(&mut is_exported, attribute)?
                }
                AttributeType::Workgroup => {
                    if workgroup_size.has_value() {
                        return Err(Self::attribute_error(
                            &attribute,
                            ParsingError::AttributeMultipleUnique {
                                attribute: String::from("workgroup"),
                            },
                        ));
                    }
                    if attribute.args.len() != 3 {
                        return Err(Self::attribute_error(
                            &attribute,
                            ParsingError::AttributeUnexpectedParameterCount {
                                attribute: String::from("workgroup"),
                                count: attribute.args.len(),
                            },
                        ));
                    }
                    // carried as a vec3[u32] constructor so the resolve
                    // pass can evaluate all three components at once
                    let location = attribute.location.clone();
                    workgroup_size = ExpressionValue::Expression(Box::new(Expression::Cast(
                        CastExpression {
                            target_type: ExpressionValue::Value(ExpressionType::vector(
                                3,
                                PrimitiveType::UInt32,
                            )),
                            expressions: attribute.args,
                            cached_type: None,
                            location,
                        },
                    )));
                }
                AttributeType::Cond => Self::handle_unique_attribute(&mut cond, attribute)?,
                _ => return Err(Self::reject_attribute(attribute)),
            }
        }

        let start = self.expect(&TokenKind::FunctionDeclaration)?.location.clone();
        let (name, _) = self.expect_identifier()?;

        self.expect(&TokenKind::OpenParenthesis)?;
        let mut parameters = Vec::new();
        while !self.check(&TokenKind::ClosingParenthesis) {
            parameters.push(self.parse_function_parameter()?);
            if !self.consume_if(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::ClosingParenthesis)?;

        let mut return_type = ExpressionValue::None;
        if self.consume_if(&TokenKind::Arrow) {
            return_type = ExpressionValue::Expression(Box::new(self.parse_type_expression()?));
        }

        let (statements, end) = self.parse_statement_block()?;

        let location = SourceLocation::build_from_to(&start, &end);
        let function = Statement::DeclareFunction(DeclareFunctionStatement {
            name,
            func_index: None,
            parameters,
            return_type,
            statements,
            entry_stage,
            depth_write,
            early_fragment_tests,
            is_exported,
            workgroup_size,
            location: location.clone(),
        });

        Ok(Self::wrap_conditional(function, cond, location))
    }

    fn parse_function_parameter(&mut self) -> Result<FunctionParameter> {
        let semantic = if self.consume_if(&TokenKind::In) {
            ParameterSemantic::In
        } else if self.consume_if(&TokenKind::Out) {
            ParameterSemantic::Out
        } else if self.consume_if(&TokenKind::InOut) {
            ParameterSemantic::InOut
        } else {
            ParameterSemantic::In
        };

        let (name, location) = self.expect_identifier()?;
        self.expect(&TokenKind::Colon)?;
        let ty = self.parse_type_expression()?;

        Ok(FunctionParameter {
            name,
            ty: ExpressionValue::Expression(Box::new(ty)),
            semantic,
            var_index: None,
            location,
        })
    }

    /// Wraps a statement in a `ConditionalStatement` when a `[cond]`
    /// attribute was present.
    fn wrap_conditional(
        statement: Statement,
        cond: ExpressionValue<bool>,
        location: SourceLocation,
    ) -> Statement {
        match cond {
            ExpressionValue::Expression(condition) => Statement::Conditional(ConditionalStatement {
                condition,
                statement: Box::new(statement),
                location,
            }),
            _ => statement,
        }
    }

    /// Parses `{ statement* }` and returns the statements plus the
    /// closing bracket location.
    fn parse_statement_block(&mut self) -> Result<(Vec<Statement>, SourceLocation)> {
        self.expect(&TokenKind::OpenCurlyBracket)?;
        let mut statements = Vec::new();
        while !self.check(&TokenKind::ClosingCurlyBracket) {
            if self.check(&TokenKind::EndOfStream) {
                return Err(self.unexpected(self.peek()));
            }
            statements.push(self.parse_statement()?);
        }
        let end = self.expect(&TokenKind::ClosingCurlyBracket)?.location.clone();
        Ok((statements, end))
    }

    fn parse_statement(&mut self) -> Result<Statement> {
        let attributes = self.parse_attributes()?;

        let mut unroll = ExpressionValue::None;
        let mut cond = ExpressionValue::None;
        for attribute in attributes {
            match attribute.ty {
                AttributeType::Unroll => {
                    Self::handle_unique_flag_attribute(&mut unroll, attribute)?
                }
                AttributeType::Cond => Self::handle_unique_attribute(&mut cond, attribute)?,
                _ => return Err(Self::reject_attribute(attribute)),
            }
        }

        let statement = self.parse_single_statement(unroll)?;
        let location = statement.location().clone();
        Ok(Self::wrap_conditional(statement, cond, location))
    }

    fn parse_single_statement(&mut self, unroll: ExpressionValue<bool>) -> Result<Statement> {
        match &self.peek().kind {
            TokenKind::Let => self.parse_variable_declaration(),
            TokenKind::Const => self.parse_const_statement(Vec::new()),
            TokenKind::If => {
                let start = self.peek().location.clone();
                self.parse_branch_statement(start, false)
            }
            TokenKind::For => self.parse_for_statement(unroll),
            TokenKind::While => self.parse_while_statement(unroll),
            TokenKind::Break => {
                let location = self.advance().location.clone();
                self.expect(&TokenKind::Semicolon)?;
                Ok(Statement::Break(BreakStatement { location }))
            }
            TokenKind::Continue => {
                let location = self.advance().location.clone();
                self.expect(&TokenKind::Semicolon)?;
                Ok(Statement::Continue(ContinueStatement { location }))
            }
            TokenKind::Discard => {
                let location = self.advance().location.clone();
                self.expect(&TokenKind::Semicolon)?;
                Ok(Statement::Discard(DiscardStatement { location }))
            }
            TokenKind::Return => self.parse_return_statement(),
            TokenKind::OpenCurlyBracket => {
                let start = self.peek().location.clone();
                let (statements, end) = self.parse_statement_block()?;
                let location = SourceLocation::build_from_to(&start, &end);
                Ok(Statement::Scoped(ScopedStatement {
                    statement: Box::new(Statement::Multi(MultiStatement {
                        statements,
                        location: location.clone(),
                    })),
                    location,
                }))
            }
            _ => {
                let expression = self.parse_expression()?;
                let start = expression.location().clone();
                let end = self.expect(&TokenKind::Semicolon)?.location.clone();
                Ok(Statement::Expression(ExpressionStatement {
                    expression,
                    location: SourceLocation::build_from_to(&start, &end),
                }))
            }
        }
    }

    fn parse_variable_declaration(&mut self) -> Result<Statement> {
        let start = self.expect(&TokenKind::Let)?.location.clone();
        let (name, _) = self.expect_identifier()?;

        let mut ty = ExpressionValue::None;
        if self.consume_if(&TokenKind::Colon) {
            ty = ExpressionValue::Expression(Box::new(self.parse_type_expression()?));
        }

        let mut initial_expression = None;
        if self.consume_if(&TokenKind::Assign) {
            initial_expression = Some(Box::new(self.parse_expression()?));
        }
        let end = self.expect(&TokenKind::Semicolon)?.location.clone();

        Ok(Statement::DeclareVariable(DeclareVariableStatement {
            name,
            var_index: None,
            ty,
            initial_expression,
            location: SourceLocation::build_from_to(&start, &end),
        }))
    }

    fn parse_return_statement(&mut self) -> Result<Statement> {
        let start = self.expect(&TokenKind::Return)?.location.clone();
        let mut returned_expr = None;
        if !self.check(&TokenKind::Semicolon) {
            returned_expr = Some(self.parse_expression()?);
        }
        let end = self.expect(&TokenKind::Semicolon)?.location.clone();

        Ok(Statement::Return(ReturnStatement {
            returned_expr,
            location: SourceLocation::build_from_to(&start, &end),
        }))
    }

    /// Parses `if (...) ... else if (...) ... else ...`; `start` points at
    /// the `const` keyword for `const if`.
    fn parse_branch_statement(&mut self, start: SourceLocation, is_const: bool) -> Result<Statement> {
        let mut cond_statements = Vec::new();
        let mut else_statement = None;

        self.expect(&TokenKind::If)?;
        loop {
            self.expect(&TokenKind::OpenParenthesis)?;
            let condition = self.parse_expression()?;
            self.expect(&TokenKind::ClosingParenthesis)?;
            let statement = self.parse_statement()?;
            cond_statements.push(ConditionalBranch {
                condition,
                statement: Box::new(statement),
            });

            if !self.consume_if(&TokenKind::Else) {
                break;
            }
            if !self.consume_if(&TokenKind::If) {
                else_statement = Some(Box::new(self.parse_statement()?));
                break;
            }
        }

        let end = else_statement
            .as_deref()
            .map(Statement::location)
            .or_else(|| {
                cond_statements
                    .last()
                    .map(|branch| branch.statement.location())
            })
            .cloned()
            .unwrap_or_else(|| start.clone());

        Ok(Statement::Branch(BranchStatement {
            cond_statements,
            else_statement,
            is_const,
            location: SourceLocation::build_from_to(&start, &end),
        }))
    }

    fn parse_for_statement(&mut self, unroll: ExpressionValue<bool>) -> Result<Statement> {
        let start = self.expect(&TokenKind::For)?.location.clone();
        let (var_name, _) = self.expect_identifier()?;
        self.expect(&TokenKind::In)?;

        let first = self.parse_expression()?;
        if self.consume_if(&TokenKind::Arrow) {
            let to_expr = self.parse_expression()?;
            let mut step_expr = None;
            if self.consume_if(&TokenKind::Colon) {
                step_expr = Some(Box::new(self.parse_expression()?));
            }
            let statement = self.parse_statement()?;
            let location = SourceLocation::build_from_to(&start, statement.location());

            Ok(Statement::For(ForStatement {
                var_name,
                var_index: None,
                from_expr: Box::new(first),
                to_expr: Box::new(to_expr),
                step_expr,
                statement: Box::new(statement),
                unroll,
                location,
            }))
        } else {
            let statement = self.parse_statement()?;
            let location = SourceLocation::build_from_to(&start, statement.location());

            Ok(Statement::ForEach(ForEachStatement {
                var_name,
                var_index: None,
                expression: Box::new(first),
                statement: Box::new(statement),
                unroll,
                location,
            }))
        }
    }

    fn parse_while_statement(&mut self, unroll: ExpressionValue<bool>) -> Result<Statement> {
        let start = self.expect(&TokenKind::While)?.location.clone();
        self.expect(&TokenKind::OpenParenthesis)?;
        let condition = self.parse_expression()?;
        self.expect(&TokenKind::ClosingParenthesis)?;
        let body = self.parse_statement()?;
        let location = SourceLocation::build_from_to(&start, body.location());

        Ok(Statement::While(WhileStatement {
            condition: Box::new(condition),
            body: Box::new(body),
            unroll,
            location,
        }))
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    fn parse_expression(&mut self) -> Result<Expression> {
        let left = self.parse_binary_expression(0)?;

        let assign_op = match self.peek().kind {
            TokenKind::Assign => Some(AssignType::Simple),
            TokenKind::PlusAssign => Some(AssignType::CompoundAdd),
            TokenKind::MinusAssign => Some(AssignType::CompoundSubtract),
            TokenKind::MultiplyAssign => Some(AssignType::CompoundMultiply),
            TokenKind::DivideAssign => Some(AssignType::CompoundDivide),
            TokenKind::ModuloAssign => Some(AssignType::CompoundModulo),
            TokenKind::LogicalAndAssign => Some(AssignType::CompoundLogicalAnd),
            TokenKind::LogicalOrAssign => Some(AssignType::CompoundLogicalOr),
            _ => None,
        };

        if let Some(op) = assign_op {
            self.advance();
            let right = self.parse_expression()?;
            let location =
                SourceLocation::build_from_to(left.location(), right.location());
            return Ok(Expression::Assign(AssignExpression {
                op,
                left: Box::new(left),
                right: Box::new(right),
                cached_type: None,
                location,
            }));
        }

        Ok(left)
    }

    fn token_precedence(kind: &TokenKind) -> Option<(BinaryType, i32)> {
        Some(match kind {
            TokenKind::LogicalOr => (BinaryType::LogicalOr, 20),
            TokenKind::LogicalAnd => (BinaryType::LogicalAnd, 30),
            TokenKind::BitwiseOr => (BinaryType::BitwiseOr, 40),
            TokenKind::BitwiseXor => (BinaryType::BitwiseXor, 50),
            TokenKind::BitwiseAnd => (BinaryType::BitwiseAnd, 60),
            TokenKind::Equal => (BinaryType::CompEq, 70),
            TokenKind::NotEqual => (BinaryType::CompNe, 70),
            TokenKind::LessThan => (BinaryType::CompLt, 80),
            TokenKind::LessThanEqual => (BinaryType::CompLe, 80),
            TokenKind::GreaterThan => (BinaryType::CompGt, 80),
            TokenKind::GreaterThanEqual => (BinaryType::CompGe, 80),
            TokenKind::ShiftLeft => (BinaryType::ShiftLeft, 90),
            TokenKind::ShiftRight => (BinaryType::ShiftRight, 90),
            TokenKind::Plus => (BinaryType::Add, 100),
            TokenKind::Minus => (BinaryType::Subtract, 100),
            TokenKind::Multiply => (BinaryType::Multiply, 110),
            TokenKind::Divide => (BinaryType::Divide, 110),
            TokenKind::Modulo => (BinaryType::Modulo, 110),
            _ => return None,
        })
    }

    /// Precedence-climbing loop; all binary operators are
    /// left-associative.
    fn parse_binary_expression(&mut self, min_precedence: i32) -> Result<Expression> {
        let mut left = self.parse_unary_expression()?;

        while let Some((op, precedence)) = Self::token_precedence(&self.peek().kind) {
            if precedence < min_precedence {
                break;
            }
            self.advance();
            let right = self.parse_binary_expression(precedence + 1)?;
            let location = SourceLocation::build_from_to(left.location(), right.location());
            left = Expression::Binary(BinaryExpression {
                op,
                left: Box::new(left),
                right: Box::new(right),
                cached_type: None,
                location,
            });
        }

        Ok(left)
    }

    fn parse_unary_expression(&mut self) -> Result<Expression> {
        let op = match self.peek().kind {
            TokenKind::Minus => Some(UnaryType::Minus),
            TokenKind::Plus => Some(UnaryType::Plus),
            TokenKind::Not => Some(UnaryType::LogicalNot),
            TokenKind::BitwiseNot => Some(UnaryType::BitwiseNot),
            _ => None,
        };

        if let Some(op) = op {
            let start = self.advance().location.clone();
            let expr = self.parse_unary_expression()?;
            let location = SourceLocation::build_from_to(&start, expr.location());
            return Ok(Expression::Unary(UnaryExpression {
                op,
                expr: Box::new(expr),
                cached_type: None,
                location,
            }));
        }

        self.parse_postfix_expression()
    }

    fn parse_postfix_expression(&mut self) -> Result<Expression> {
        let mut expr = self.parse_primary_expression()?;

        loop {
            match self.peek().kind {
                TokenKind::Dot => {
                    self.advance();
                    let (identifier, identifier_location) = self.expect_identifier()?;

                    // `object.Method(args)` is a method call
                    if self.check(&TokenKind::OpenParenthesis) {
                        self.advance();
                        let parameters =
                            self.parse_expression_list(&TokenKind::ClosingParenthesis)?;
                        let end = self
                            .expect(&TokenKind::ClosingParenthesis)?
                            .location
                            .clone();
                        let location = SourceLocation::build_from_to(expr.location(), &end);
                        expr = Expression::CallMethod(CallMethodExpression {
                            object: Box::new(expr),
                            method: identifier,
                            parameters,
                            cached_type: None,
                            location,
                        });
                        continue;
                    }

                    let location =
                        SourceLocation::build_from_to(expr.location(), &identifier_location);
                    // merge into the previous access node so a member path
                    // stays one node
                    if let Expression::AccessIdentifier(access) = &mut expr {
                        access.identifiers.push(IdentifierEntry {
                            identifier,
                            location: identifier_location,
                        });
                        access.location = location;
                    } else {
                        expr = Expression::AccessIdentifier(AccessIdentifierExpression {
                            expr: Box::new(expr),
                            identifiers: vec![IdentifierEntry {
                                identifier,
                                location: identifier_location,
                            }],
                            cached_type: None,
                            location,
                        });
                    }
                }
                TokenKind::OpenSquareBracket => {
                    self.advance();
                    let indices = self.parse_expression_list(&TokenKind::ClosingSquareBracket)?;
                    let end = self
                        .expect(&TokenKind::ClosingSquareBracket)?
                        .location
                        .clone();
                    let location = SourceLocation::build_from_to(expr.location(), &end);
                    expr = Expression::AccessIndex(AccessIndexExpression {
                        expr: Box::new(expr),
                        indices,
                        cached_type: None,
                        location,
                    });
                }
                TokenKind::OpenParenthesis => {
                    self.advance();
                    let parameters = self.parse_expression_list(&TokenKind::ClosingParenthesis)?;
                    let end = self
                        .expect(&TokenKind::ClosingParenthesis)?
                        .location
                        .clone();
                    let location = SourceLocation::build_from_to(expr.location(), &end);
                    expr = Expression::CallFunction(CallFunctionExpression {
                        target: Box::new(expr),
                        parameters,
                        cached_type: None,
                        location,
                    });
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    /// Parses a comma-separated expression list, stopping before
    /// `terminator` (which is not consumed).
    fn parse_expression_list(&mut self, terminator: &TokenKind) -> Result<Vec<Expression>> {
        let mut expressions = Vec::new();
        if self.check(terminator) {
            return Ok(expressions);
        }
        loop {
            expressions.push(self.parse_expression()?);
            if !self.consume_if(&TokenKind::Comma) {
                break;
            }
        }
        Ok(expressions)
    }

    fn parse_primary_expression(&mut self) -> Result<Expression> {
        let location = self.peek().location.clone();
        match &self.peek().kind {
            TokenKind::OpenParenthesis => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(&TokenKind::ClosingParenthesis)?;
                Ok(expr)
            }
            TokenKind::IntegerValue(_) => {
                let token = self.advance();
                let TokenKind::IntegerValue(value) = token.kind else {
                    unreachable!()
                };
                Ok(Expression::ConstantValue(ConstantValueExpression {
                    value: ConstantValue::Single(ConstantSingleValue::IntLiteral(value)),
                    cached_type: None,
                    location,
                }))
            }
            TokenKind::FloatingPointValue(_) => {
                let token = self.advance();
                let TokenKind::FloatingPointValue(value) = token.kind else {
                    unreachable!()
                };
                Ok(Expression::ConstantValue(ConstantValueExpression {
                    value: ConstantValue::Single(ConstantSingleValue::FloatLiteral(value)),
                    cached_type: None,
                    location,
                }))
            }
            TokenKind::StringValue(_) => {
                let token = self.advance();
                let TokenKind::StringValue(value) = &token.kind else {
                    unreachable!()
                };
                Ok(Expression::ConstantValue(ConstantValueExpression {
                    value: ConstantValue::Single(ConstantSingleValue::String(value.clone())),
                    cached_type: None,
                    location,
                }))
            }
            TokenKind::BoolTrue | TokenKind::BoolFalse => {
                let value = self.peek().kind == TokenKind::BoolTrue;
                self.advance();
                Ok(Expression::ConstantValue(ConstantValueExpression {
                    value: ConstantValue::bool(value),
                    cached_type: None,
                    location,
                }))
            }
            TokenKind::ConstSelect => {
                self.advance();
                self.expect(&TokenKind::OpenParenthesis)?;
                let condition = self.parse_expression()?;
                self.expect(&TokenKind::Comma)?;
                let true_path = self.parse_expression()?;
                self.expect(&TokenKind::Comma)?;
                let false_path = self.parse_expression()?;
                let end = self
                    .expect(&TokenKind::ClosingParenthesis)?
                    .location
                    .clone();
                Ok(Expression::Conditional(ConditionalExpression {
                    condition: Box::new(condition),
                    true_path: Box::new(true_path),
                    false_path: Box::new(false_path),
                    cached_type: None,
                    location: SourceLocation::build_from_to(&location, &end),
                }))
            }
            TokenKind::Identifier(_) => {
                let (identifier, location) = self.expect_identifier()?;
                Ok(Expression::Identifier(IdentifierExpression {
                    identifier,
                    cached_type: None,
                    location,
                }))
            }
            _ => Err(self.unexpected(self.peek())),
        }
    }

    /// Parses a type expression: an identifier optionally followed by
    /// bracketed type arguments (`vec3[f32]`, `array[Inner, 5]`) or a
    /// dotted module path (`Module.Type`).
    fn parse_type_expression(&mut self) -> Result<Expression> {
        let (identifier, location) = self.expect_identifier()?;
        let mut expr = Expression::Identifier(IdentifierExpression {
            identifier,
            cached_type: None,
            location,
        });

        loop {
            match self.peek().kind {
                TokenKind::Dot => {
                    self.advance();
                    let (identifier, identifier_location) = self.expect_identifier()?;
                    let location =
                        SourceLocation::build_from_to(expr.location(), &identifier_location);
                    if let Expression::AccessIdentifier(access) = &mut expr {
                        access.identifiers.push(IdentifierEntry {
                            identifier,
                            location: identifier_location,
                        });
                        access.location = location;
                    } else {
                        expr = Expression::AccessIdentifier(AccessIdentifierExpression {
                            expr: Box::new(expr),
                            identifiers: vec![IdentifierEntry {
                                identifier,
                                location: identifier_location,
                            }],
                            cached_type: None,
                            location,
                        });
                    }
                }
                TokenKind::OpenSquareBracket => {
                    self.advance();
                    let indices = self.parse_type_argument_list()?;
                    let end = self
                        .expect(&TokenKind::ClosingSquareBracket)?
                        .location
                        .clone();
                    let location = SourceLocation::build_from_to(expr.location(), &end);
                    expr = Expression::AccessIndex(AccessIndexExpression {
                        expr: Box::new(expr),
                        indices,
                        cached_type: None,
                        location,
                    });
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    /// Type arguments are types or constant expressions
    /// (`array[f32, SIZE * 2]`).
    fn parse_type_argument_list(&mut self) -> Result<Vec<Expression>> {
        let mut arguments = Vec::new();
        loop {
            if let TokenKind::Identifier(_) = self.peek().kind {
                // could be a nested type or the start of a constant
                // expression; a type argument never continues with an
                // operator, so parse it as a type when followed by
                // `[`, `.`, `,` or `]`
                match self.peek_at(1).kind {
                    TokenKind::OpenSquareBracket
                    | TokenKind::Dot
                    | TokenKind::Comma
                    | TokenKind::ClosingSquareBracket => {
                        arguments.push(self.parse_type_expression()?);
                    }
                    _ => arguments.push(self.parse_expression()?),
                }
            } else {
                arguments.push(self.parse_expression()?);
            }

            if !self.consume_if(&TokenKind::Comma) {
                break;
            }
        }
        Ok(arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nzslc_util::ErrorCategory;

    fn parse_ok(source: &str) -> Module {
        parse(source).expect("parsing failed")
    }

    fn parse_err(source: &str) -> Error {
        parse(source).expect_err("parsing should fail")
    }

    const HEADER: &str = "[nzsl_version(\"1.0\")]\nmodule;\n";

    #[test]
    fn test_module_header() {
        let module = parse_ok("[nzsl_version(\"1.0\")]\nmodule Engine.Test;\n");
        assert_eq!(module.metadata.lang_version, Version::new(1, 0, 0));
        assert_eq!(module.name(), "Engine.Test");
    }

    #[test]
    fn test_module_metadata() {
        let module = parse_ok(
            "[nzsl_version(\"1.2.3\")]\n[author(\"me\")]\n[desc(\"test module\")]\n[license(\"MIT\")]\n[feature(float64)]\nmodule;\n",
        );
        assert_eq!(module.metadata.author, "me");
        assert_eq!(module.metadata.description, "test module");
        assert_eq!(module.metadata.license, "MIT");
        assert_eq!(module.metadata.enabled_features, vec![ModuleFeature::Float64]);
    }

    #[test]
    fn test_missing_version_attribute() {
        let err = parse_err("module;\n");
        assert_eq!(err.category(), ErrorCategory::Parsing);
        assert!(err.to_string().contains("nzsl_version"));
    }

    #[test]
    fn test_duplicate_unique_attribute() {
        let err = parse_err("[nzsl_version(\"1.0\"), nzsl_version(\"1.0\")]\nmodule;\n");
        assert!(err.to_string().contains("can only be present once"));
    }

    #[test]
    fn test_struct_declaration() {
        let source = format!(
            "{HEADER}[layout(std140)]\nstruct Data {{ [location(0)] pos: vec3[f32], value: f32 }}\n"
        );
        let module = parse_ok(&source);
        let Statement::DeclareStruct(decl) = &module.root.statements[0] else {
            panic!("expected struct declaration");
        };
        assert_eq!(decl.description.name, "Data");
        assert_eq!(
            decl.description.layout.as_value(),
            Some(&StructLayout::Std140)
        );
        assert_eq!(decl.description.members.len(), 2);
        assert!(decl.description.members[0].location_index.has_value());
    }

    #[test]
    fn test_function_declaration() {
        let source = format!(
            "{HEADER}[entry(frag)]\nfn main(input: Input) -> Output {{ return input.color; }}\n"
        );
        let module = parse_ok(&source);
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function declaration");
        };
        assert_eq!(func.name, "main");
        assert_eq!(func.entry_stage.as_value(), Some(&ShaderStage::Fragment));
        assert_eq!(func.parameters.len(), 1);
        assert!(func.return_type.has_value());
        assert_eq!(func.statements.len(), 1);
    }

    #[test]
    fn test_function_parameter_semantics() {
        let source = format!("{HEADER}fn f(a: f32, out b: f32, inout c: f32) {{ }}\n");
        let module = parse_ok(&source);
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function declaration");
        };
        assert_eq!(func.parameters[0].semantic, ParameterSemantic::In);
        assert_eq!(func.parameters[1].semantic, ParameterSemantic::Out);
        assert_eq!(func.parameters[2].semantic, ParameterSemantic::InOut);
    }

    #[test]
    fn test_external_block() {
        let source = format!(
            "{HEADER}external {{ [binding(0)] tex: sampler2D[f32], [auto_binding] data: uniform[Data] }}\n"
        );
        let err = parse(&source).expect_err("auto_binding is a block attribute");
        assert_eq!(err.category(), ErrorCategory::Parsing);

        let source = format!(
            "{HEADER}[auto_binding]\nexternal {{ [binding(0)] tex: sampler2D[f32], data: uniform[Data] }}\n"
        );
        let module = parse_ok(&source);
        let Statement::DeclareExternal(external) = &module.root.statements[0] else {
            panic!("expected external declaration");
        };
        assert_eq!(external.auto_binding.as_value(), Some(&true));
        assert_eq!(external.external_vars.len(), 2);
        assert!(external.external_vars[0].binding_index.has_value());
        assert!(!external.external_vars[1].binding_index.has_value());
    }

    #[test]
    fn test_operator_precedence() {
        let source = format!("{HEADER}fn f() {{ let x = 1 + 2 * 3; }}\n");
        let module = parse_ok(&source);
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        let Statement::DeclareVariable(var) = &func.statements[0] else {
            panic!("expected variable declaration");
        };
        let Expression::Binary(add) = var.initial_expression.as_deref().unwrap() else {
            panic!("expected binary expression");
        };
        assert_eq!(add.op, BinaryType::Add);
        let Expression::Binary(mul) = add.right.as_ref() else {
            panic!("expected nested multiply");
        };
        assert_eq!(mul.op, BinaryType::Multiply);
    }

    #[test]
    fn test_left_associativity() {
        let source = format!("{HEADER}fn f() {{ let x = 8 - 4 - 2; }}\n");
        let module = parse_ok(&source);
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        let Statement::DeclareVariable(var) = &func.statements[0] else {
            panic!("expected variable declaration");
        };
        // (8 - 4) - 2
        let Expression::Binary(outer) = var.initial_expression.as_deref().unwrap() else {
            panic!("expected binary expression");
        };
        assert!(matches!(outer.left.as_ref(), Expression::Binary(_)));
        assert!(matches!(outer.right.as_ref(), Expression::ConstantValue(_)));
    }

    #[test]
    fn test_member_path_is_single_node() {
        let source = format!("{HEADER}fn f() {{ let x = a.b.c; }}\n");
        let module = parse_ok(&source);
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        let Statement::DeclareVariable(var) = &func.statements[0] else {
            panic!("expected variable declaration");
        };
        let Expression::AccessIdentifier(access) = var.initial_expression.as_deref().unwrap()
        else {
            panic!("expected access identifier");
        };
        assert_eq!(access.identifiers.len(), 2);
        assert_eq!(access.identifiers[0].identifier, "b");
        assert_eq!(access.identifiers[1].identifier, "c");
    }

    #[test]
    fn test_method_call() {
        let source = format!("{HEADER}fn f() {{ let c = tex.Sample(uv); }}\n");
        let module = parse_ok(&source);
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        let Statement::DeclareVariable(var) = &func.statements[0] else {
            panic!("expected variable declaration");
        };
        let Expression::CallMethod(call) = var.initial_expression.as_deref().unwrap() else {
            panic!("expected method call");
        };
        assert_eq!(call.method, "Sample");
        assert_eq!(call.parameters.len(), 1);
    }

    #[test]
    fn test_type_expression_is_index_access() {
        let source = format!("{HEADER}fn f() {{ let v: vec3[f32]; }}\n");
        let module = parse_ok(&source);
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        let Statement::DeclareVariable(var) = &func.statements[0] else {
            panic!("expected variable declaration");
        };
        let ty = var.ty.as_expression().unwrap();
        let Expression::AccessIndex(access) = ty else {
            panic!("expected index access, got {ty:?}");
        };
        assert!(matches!(access.expr.as_ref(), Expression::Identifier(_)));
        assert_eq!(access.indices.len(), 1);
    }

    #[test]
    fn test_const_select() {
        let source = format!("{HEADER}fn f() {{ let x = const_select(true, 1.0, 2.0); }}\n");
        parse_ok(&source);
    }

    #[test]
    fn test_const_if() {
        let source = format!(
            "{HEADER}option UseInt: bool = false;\nfn f() {{ const if (UseInt) {{ let a = 1; }} else {{ let a = 2.0; }} }}\n"
        );
        let module = parse_ok(&source);
        let Statement::DeclareFunction(func) = &module.root.statements[1] else {
            panic!("expected function");
        };
        let Statement::Branch(branch) = &func.statements[0] else {
            panic!("expected branch");
        };
        assert!(branch.is_const);
        assert!(branch.else_statement.is_some());
    }

    #[test]
    fn test_for_range_and_foreach() {
        let source = format!(
            "{HEADER}fn f() {{ [unroll] for i in 0 -> 3 {{ }}\nfor v in data {{ }} }}\n"
        );
        let module = parse_ok(&source);
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        let Statement::For(for_stmt) = &func.statements[0] else {
            panic!("expected for statement");
        };
        assert_eq!(for_stmt.unroll.as_value(), Some(&true));
        assert!(matches!(&func.statements[1], Statement::ForEach(_)));
    }

    #[test]
    fn test_import_forms() {
        let source = format!(
            "{HEADER}import Engine.Data;\nimport a, b as c from Engine.Utils;\nimport * from Engine.Math;\n"
        );
        let module = parse_ok(&source);
        let Statement::Import(whole) = &module.root.statements[0] else {
            panic!("expected import");
        };
        assert_eq!(whole.module_name, "Engine.Data");
        assert!(whole.identifiers.is_empty());

        let Statement::Import(list) = &module.root.statements[1] else {
            panic!("expected import");
        };
        assert_eq!(list.module_name, "Engine.Utils");
        assert_eq!(list.identifiers.len(), 2);
        assert_eq!(list.identifiers[1].renamed_identifier.as_deref(), Some("c"));

        let Statement::Import(star) = &module.root.statements[2] else {
            panic!("expected import");
        };
        assert_eq!(star.identifiers[0].identifier, "*");
    }

    #[test]
    fn test_compound_assignment() {
        let source = format!("{HEADER}fn f() {{ counter += 1; }}\n");
        let module = parse_ok(&source);
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        let Statement::Expression(stmt) = &func.statements[0] else {
            panic!("expected expression statement");
        };
        let Expression::Assign(assign) = &stmt.expression else {
            panic!("expected assignment");
        };
        assert_eq!(assign.op, AssignType::CompoundAdd);
    }

    #[test]
    fn test_unexpected_token() {
        let err = parse_err("[nzsl_version(\"1.0\")]\nmodule;\nstruct;");
        assert_eq!(err.category(), ErrorCategory::Parsing);
        assert!(err.to_string().contains("unexpected token"));
    }

    #[test]
    fn test_option_declaration() {
        let source = format!("{HEADER}option Multiplier: f32 = 2.0;\n");
        let module = parse_ok(&source);
        let Statement::DeclareOption(option) = &module.root.statements[0] else {
            panic!("expected option declaration");
        };
        assert_eq!(option.name, "Multiplier");
        assert!(option.default_value.is_some());
    }

    #[test]
    fn test_alias_declaration() {
        let source = format!("{HEADER}alias Vec = vec3[f32];\n");
        let module = parse_ok(&source);
        assert!(matches!(
            &module.root.statements[0],
            Statement::DeclareAlias(_)
        ));
    }

    #[test]
    fn test_workgroup_attribute() {
        let source = format!("{HEADER}[entry(comp)]\n[workgroup(8, 8, 1)]\nfn main() {{ }}\n");
        let module = parse_ok(&source);
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        let Some(Expression::Cast(cast)) = func.workgroup_size.as_expression() else {
            panic!("expected workgroup cast expression");
        };
        assert_eq!(cast.expressions.len(), 3);
    }

    #[test]
    fn test_conditional_function() {
        let source = format!(
            "{HEADER}option Enable: bool = true;\n[cond(Enable)]\nfn extra() {{ }}\n"
        );
        let module = parse_ok(&source);
        assert!(matches!(
            &module.root.statements[1],
            Statement::Conditional(_)
        ));
    }
}
