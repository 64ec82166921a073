//! Module binary form (`nzslb`).
//!
//! Layout: `magic | version | metadata | imported module count |
//! imported modules | root statement tree`. Every node writes a one-byte
//! tag, its fields in a fixed order, then its children. Identifier
//! references are written as their table index; optional fields are a
//! presence byte followed by the payload.
//!
//! Source locations are preserved: file paths are interned on first use
//! (a marker byte distinguishes "no file" / "new path" / "known path"),
//! so deserialization rebuilds the exact tree and
//! parse-serialize-deserialize is the identity on the structural IR.

use crate::error::{Result, SerializationError};
use crate::serializer::{Deserializer, Serializer};
use nzslc_par::ast::*;
use nzslc_util::{SourceLocation, StructLayout};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::sync::Arc;

/// `'NSLB'`.
const MAGIC: u32 = 0x4E534C42;

/// Current binary version; readers reject newer major versions.
pub const BINARY_VERSION: Version = Version::new(1, 0, 0);

/// Serializes a module to its binary form.
pub fn serialize_module(module: &Module) -> Vec<u8> {
    let mut writer = ModuleWriter {
        serializer: Serializer::new(),
        files: FxHashMap::default(),
    };
    writer.serializer.serialize_u32(MAGIC);
    writer.serializer.serialize_u8(BINARY_VERSION.major);
    writer.serializer.serialize_u8(BINARY_VERSION.minor);
    writer.serializer.serialize_u16(BINARY_VERSION.patch);
    writer.write_module(module);
    writer.serializer.into_data()
}

/// Deserializes a module from its binary form.
pub fn deserialize_module(data: &[u8]) -> Result<Module> {
    let mut reader = ModuleReader {
        deserializer: Deserializer::new(data),
        files: Vec::new(),
    };
    if reader.deserializer.deserialize_u32()? != MAGIC {
        return Err(SerializationError::InvalidMagic);
    }
    let major = reader.deserializer.deserialize_u8()?;
    let _minor = reader.deserializer.deserialize_u8()?;
    let _patch = reader.deserializer.deserialize_u16()?;
    if major > BINARY_VERSION.major {
        return Err(SerializationError::UnsupportedBinaryVersion(u32::from(
            major,
        )));
    }
    reader.read_module()
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

struct ModuleWriter {
    serializer: Serializer,
    files: FxHashMap<String, u32>,
}

impl ModuleWriter {
    fn write_module(&mut self, module: &Module) {
        let metadata = &module.metadata;
        self.serializer.serialize_u8(metadata.lang_version.major);
        self.serializer.serialize_u8(metadata.lang_version.minor);
        self.serializer.serialize_u16(metadata.lang_version.patch);
        self.serializer.serialize_string(&metadata.module_name);
        self.serializer.serialize_string(&metadata.author);
        self.serializer.serialize_string(&metadata.description);
        self.serializer.serialize_string(&metadata.license);
        self.serializer
            .serialize_u32(metadata.enabled_features.len() as u32);
        for feature in &metadata.enabled_features {
            self.serializer.serialize_u32(feature.to_index());
        }

        self.serializer
            .serialize_u32(module.imported_modules.len() as u32);
        for imported in &module.imported_modules {
            self.serializer.serialize_string(&imported.identifier);
            self.write_module(&imported.module);
        }

        self.write_location(&module.root.location);
        self.serializer
            .serialize_u32(module.root.statements.len() as u32);
        for stmt in &module.root.statements {
            self.write_statement(stmt);
        }
    }

    fn write_location(&mut self, location: &SourceLocation) {
        match &location.file {
            None => {
                self.serializer.serialize_u8(0);
            }
            Some(file) => match self.files.get(file.as_str()) {
                Some(&id) => {
                    self.serializer.serialize_u8(2);
                    self.serializer.serialize_u32(id);
                }
                None => {
                    let id = self.files.len() as u32;
                    self.files.insert((**file).clone(), id);
                    self.serializer.serialize_u8(1);
                    self.serializer.serialize_string(file);
                }
            },
        }
        self.serializer.serialize_u32(location.start_line);
        self.serializer.serialize_u32(location.start_column);
        self.serializer.serialize_u32(location.end_line);
        self.serializer.serialize_u32(location.end_column);
    }

    fn write_index(&mut self, index: &Option<usize>) {
        match index {
            Some(index) => {
                self.serializer.serialize_bool(true);
                self.serializer.serialize_u32(*index as u32);
            }
            None => {
                self.serializer.serialize_bool(false);
            }
        }
    }

    fn write_type(&mut self, ty: &ExpressionType) {
        match ty {
            ExpressionType::Primitive(primitive) => {
                self.serializer.serialize_u8(0);
                self.serializer.serialize_u32(primitive.to_index());
            }
            ExpressionType::Vector(vector) => {
                self.serializer.serialize_u8(1);
                self.serializer.serialize_u32(vector.component_count);
                self.serializer.serialize_u32(vector.base.to_index());
            }
            ExpressionType::Matrix(matrix) => {
                self.serializer.serialize_u8(2);
                self.serializer.serialize_u32(matrix.column_count);
                self.serializer.serialize_u32(matrix.row_count);
                self.serializer.serialize_u32(matrix.base.to_index());
            }
            ExpressionType::Array(array) => {
                self.serializer.serialize_u8(3);
                self.write_type(&array.inner);
                self.serializer.serialize_u32(array.length);
            }
            ExpressionType::DynArray(array) => {
                self.serializer.serialize_u8(4);
                self.write_type(&array.inner);
            }
            ExpressionType::Struct(index) => {
                self.serializer.serialize_u8(5);
                self.serializer.serialize_u32(*index as u32);
            }
            ExpressionType::Sampler(sampler) => {
                self.serializer.serialize_u8(6);
                self.serializer.serialize_u32(sampler.dim.to_index());
                self.serializer.serialize_u32(sampler.base.to_index());
                self.serializer.serialize_bool(sampler.depth);
            }
            ExpressionType::Texture(texture) => {
                self.serializer.serialize_u8(7);
                self.serializer.serialize_u32(texture.dim.to_index());
                self.serializer.serialize_u32(texture.base.to_index());
                self.serializer.serialize_u32(texture.access.to_index());
            }
            ExpressionType::Storage(storage) => {
                self.serializer.serialize_u8(8);
                self.serializer.serialize_u32(storage.struct_index as u32);
                self.serializer.serialize_u32(storage.access.to_index());
            }
            ExpressionType::Uniform(uniform) => {
                self.serializer.serialize_u8(9);
                self.serializer.serialize_u32(uniform.struct_index as u32);
            }
            ExpressionType::PushConstant(push_constant) => {
                self.serializer.serialize_u8(10);
                self.serializer
                    .serialize_u32(push_constant.struct_index as u32);
            }
            ExpressionType::Alias(index) => {
                self.serializer.serialize_u8(11);
                self.serializer.serialize_u32(*index as u32);
            }
            ExpressionType::Function(index) => {
                self.serializer.serialize_u8(12);
                self.serializer.serialize_u32(*index as u32);
            }
            ExpressionType::Intrinsic(kind) => {
                self.serializer.serialize_u8(13);
                self.serializer.serialize_u32(kind.to_index());
            }
            ExpressionType::Method { object, method } => {
                self.serializer.serialize_u8(14);
                self.write_type(object);
                self.serializer.serialize_string(method);
            }
            ExpressionType::Module(index) => {
                self.serializer.serialize_u8(15);
                self.serializer.serialize_u32(*index as u32);
            }
            ExpressionType::NamedExternalBlock(index) => {
                self.serializer.serialize_u8(16);
                self.serializer.serialize_u32(*index as u32);
            }
            ExpressionType::Type(inner) => {
                self.serializer.serialize_u8(17);
                self.write_type(inner);
            }
            ExpressionType::ImplicitVector(count) => {
                self.serializer.serialize_u8(18);
                self.serializer.serialize_u32(*count);
            }
            ExpressionType::NoType => {
                self.serializer.serialize_u8(19);
            }
        }
    }

    fn write_optional_type(&mut self, ty: &Option<ExpressionType>) {
        match ty {
            Some(ty) => {
                self.serializer.serialize_bool(true);
                self.write_type(ty);
            }
            None => {
                self.serializer.serialize_bool(false);
            }
        }
    }

    fn write_single_value(&mut self, value: &ConstantSingleValue) {
        match value {
            ConstantSingleValue::Bool(v) => {
                self.serializer.serialize_u8(0);
                self.serializer.serialize_bool(*v);
            }
            ConstantSingleValue::F32(v) => {
                self.serializer.serialize_u8(1);
                self.serializer.serialize_f32(*v);
            }
            ConstantSingleValue::F64(v) => {
                self.serializer.serialize_u8(2);
                self.serializer.serialize_f64(*v);
            }
            ConstantSingleValue::I32(v) => {
                self.serializer.serialize_u8(3);
                self.serializer.serialize_i32(*v);
            }
            ConstantSingleValue::U32(v) => {
                self.serializer.serialize_u8(4);
                self.serializer.serialize_u32(*v);
            }
            ConstantSingleValue::String(v) => {
                self.serializer.serialize_u8(5);
                self.serializer.serialize_string(v);
            }
            ConstantSingleValue::FloatLiteral(v) => {
                self.serializer.serialize_u8(6);
                self.serializer.serialize_f64(*v);
            }
            ConstantSingleValue::IntLiteral(v) => {
                self.serializer.serialize_u8(7);
                self.serializer.serialize_i64(*v);
            }
        }
    }

    fn write_constant_value(&mut self, value: &ConstantValue) {
        match value {
            ConstantValue::NoValue => {
                self.serializer.serialize_u8(0);
            }
            ConstantValue::Single(single) => {
                self.serializer.serialize_u8(1);
                self.write_single_value(single);
            }
            ConstantValue::Vector(vector) => {
                self.serializer.serialize_u8(2);
                self.serializer
                    .serialize_u32(vector.components.len() as u32);
                for component in &vector.components {
                    self.write_single_value(component);
                }
            }
            ConstantValue::Array(array) => {
                self.serializer.serialize_u8(3);
                self.serializer.serialize_u32(array.values.len() as u32);
                for element in &array.values {
                    self.write_constant_value(element);
                }
            }
        }
    }

    fn write_expression_value<T>(
        &mut self,
        value: &ExpressionValue<T>,
        mut write_value: impl FnMut(&mut Self, &T),
    ) {
        match value {
            ExpressionValue::None => {
                self.serializer.serialize_u8(0);
            }
            ExpressionValue::Expression(expr) => {
                self.serializer.serialize_u8(1);
                self.write_expression(expr);
            }
            ExpressionValue::Value(v) => {
                self.serializer.serialize_u8(2);
                write_value(self, v);
            }
        }
    }

    fn write_type_value(&mut self, value: &ExpressionValue<ExpressionType>) {
        self.write_expression_value(value, |this, ty| this.write_type(ty));
    }

    fn write_bool_value(&mut self, value: &ExpressionValue<bool>) {
        self.write_expression_value(value, |this, v| {
            this.serializer.serialize_bool(*v);
        });
    }

    fn write_u32_value(&mut self, value: &ExpressionValue<u32>) {
        self.write_expression_value(value, |this, v| {
            this.serializer.serialize_u32(*v);
        });
    }

    fn write_expression(&mut self, expr: &Expression) {
        match expr {
            Expression::AccessField(node) => {
                self.serializer.serialize_u8(0);
                self.write_location(&node.location);
                self.write_optional_type(&node.cached_type);
                self.serializer.serialize_u32(node.field_index);
                self.write_expression(&node.expr);
            }
            Expression::AccessIdentifier(node) => {
                self.serializer.serialize_u8(1);
                self.write_location(&node.location);
                self.write_optional_type(&node.cached_type);
                self.serializer
                    .serialize_u32(node.identifiers.len() as u32);
                for entry in &node.identifiers {
                    self.serializer.serialize_string(&entry.identifier);
                    self.write_location(&entry.location);
                }
                self.write_expression(&node.expr);
            }
            Expression::AccessIndex(node) => {
                self.serializer.serialize_u8(2);
                self.write_location(&node.location);
                self.write_optional_type(&node.cached_type);
                self.serializer.serialize_u32(node.indices.len() as u32);
                self.write_expression(&node.expr);
                for index in &node.indices {
                    self.write_expression(index);
                }
            }
            Expression::Assign(node) => {
                self.serializer.serialize_u8(3);
                self.write_location(&node.location);
                self.write_optional_type(&node.cached_type);
                self.serializer.serialize_u32(node.op.to_index());
                self.write_expression(&node.left);
                self.write_expression(&node.right);
            }
            Expression::Binary(node) => {
                self.serializer.serialize_u8(4);
                self.write_location(&node.location);
                self.write_optional_type(&node.cached_type);
                self.serializer.serialize_u32(node.op.to_index());
                self.write_expression(&node.left);
                self.write_expression(&node.right);
            }
            Expression::CallFunction(node) => {
                self.serializer.serialize_u8(5);
                self.write_location(&node.location);
                self.write_optional_type(&node.cached_type);
                self.serializer.serialize_u32(node.parameters.len() as u32);
                self.write_expression(&node.target);
                for parameter in &node.parameters {
                    self.write_expression(parameter);
                }
            }
            Expression::CallMethod(node) => {
                self.serializer.serialize_u8(6);
                self.write_location(&node.location);
                self.write_optional_type(&node.cached_type);
                self.serializer.serialize_string(&node.method);
                self.serializer.serialize_u32(node.parameters.len() as u32);
                self.write_expression(&node.object);
                for parameter in &node.parameters {
                    self.write_expression(parameter);
                }
            }
            Expression::Cast(node) => {
                self.serializer.serialize_u8(7);
                self.write_location(&node.location);
                self.write_optional_type(&node.cached_type);
                self.write_type_value(&node.target_type);
                self.serializer
                    .serialize_u32(node.expressions.len() as u32);
                for sub in &node.expressions {
                    self.write_expression(sub);
                }
            }
            Expression::Conditional(node) => {
                self.serializer.serialize_u8(8);
                self.write_location(&node.location);
                self.write_optional_type(&node.cached_type);
                self.write_expression(&node.condition);
                self.write_expression(&node.true_path);
                self.write_expression(&node.false_path);
            }
            Expression::ConstantArrayValue(node) => {
                self.serializer.serialize_u8(9);
                self.write_location(&node.location);
                self.write_optional_type(&node.cached_type);
                self.write_constant_value(&ConstantValue::Array(node.values.clone()));
            }
            Expression::ConstantValue(node) => {
                self.serializer.serialize_u8(10);
                self.write_location(&node.location);
                self.write_optional_type(&node.cached_type);
                self.write_constant_value(&node.value);
            }
            Expression::Identifier(node) => {
                self.serializer.serialize_u8(11);
                self.write_location(&node.location);
                self.write_optional_type(&node.cached_type);
                self.serializer.serialize_string(&node.identifier);
            }
            Expression::IdentifierValue(node) => {
                self.serializer.serialize_u8(12);
                self.write_location(&node.location);
                self.write_optional_type(&node.cached_type);
                self.serializer.serialize_u32(node.kind.to_index());
                self.serializer.serialize_u32(node.index as u32);
            }
            Expression::Intrinsic(node) => {
                self.serializer.serialize_u8(13);
                self.write_location(&node.location);
                self.write_optional_type(&node.cached_type);
                self.serializer.serialize_u32(node.intrinsic.to_index());
                self.serializer.serialize_u32(node.parameters.len() as u32);
                for parameter in &node.parameters {
                    self.write_expression(parameter);
                }
            }
            Expression::Swizzle(node) => {
                self.serializer.serialize_u8(14);
                self.write_location(&node.location);
                self.write_optional_type(&node.cached_type);
                self.serializer.serialize_u32(node.components.len() as u32);
                for &component in &node.components {
                    self.serializer.serialize_u32(component);
                }
                self.write_expression(&node.expr);
            }
            Expression::TypeConstant(node) => {
                self.serializer.serialize_u8(15);
                self.write_location(&node.location);
                self.write_optional_type(&node.cached_type);
                self.serializer.serialize_u32(node.ty.to_index());
                self.serializer.serialize_u32(node.constant.to_index());
            }
            Expression::Unary(node) => {
                self.serializer.serialize_u8(16);
                self.write_location(&node.location);
                self.write_optional_type(&node.cached_type);
                self.serializer.serialize_u32(node.op.to_index());
                self.write_expression(&node.expr);
            }
        }
    }

    fn write_optional_expression(&mut self, expr: &Option<Box<Expression>>) {
        match expr {
            Some(expr) => {
                self.serializer.serialize_bool(true);
                self.write_expression(expr);
            }
            None => {
                self.serializer.serialize_bool(false);
            }
        }
    }

    fn write_statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Branch(node) => {
                self.serializer.serialize_u8(0);
                self.write_location(&node.location);
                self.serializer.serialize_bool(node.is_const);
                self.serializer
                    .serialize_u32(node.cond_statements.len() as u32);
                for cond in &node.cond_statements {
                    self.write_expression(&cond.condition);
                    self.write_statement(&cond.statement);
                }
                match &node.else_statement {
                    Some(else_statement) => {
                        self.serializer.serialize_bool(true);
                        self.write_statement(else_statement);
                    }
                    None => {
                        self.serializer.serialize_bool(false);
                    }
                }
            }
            Statement::Break(node) => {
                self.serializer.serialize_u8(1);
                self.write_location(&node.location);
            }
            Statement::Conditional(node) => {
                self.serializer.serialize_u8(2);
                self.write_location(&node.location);
                self.write_expression(&node.condition);
                self.write_statement(&node.statement);
            }
            Statement::Continue(node) => {
                self.serializer.serialize_u8(3);
                self.write_location(&node.location);
            }
            Statement::DeclareAlias(node) => {
                self.serializer.serialize_u8(4);
                self.write_location(&node.location);
                self.serializer.serialize_string(&node.name);
                self.write_index(&node.alias_index);
                self.write_expression(&node.expression);
            }
            Statement::DeclareConst(node) => {
                self.serializer.serialize_u8(5);
                self.write_location(&node.location);
                self.serializer.serialize_string(&node.name);
                self.write_index(&node.const_index);
                self.write_type_value(&node.ty);
                self.write_bool_value(&node.is_exported);
                self.write_expression(&node.expression);
            }
            Statement::DeclareExternal(node) => {
                self.serializer.serialize_u8(6);
                self.write_location(&node.location);
                match &node.name {
                    Some(name) => {
                        self.serializer.serialize_bool(true);
                        self.serializer.serialize_string(name);
                    }
                    None => {
                        self.serializer.serialize_bool(false);
                    }
                }
                self.write_index(&node.external_index);
                self.write_bool_value(&node.auto_binding);
                self.write_u32_value(&node.binding_set);
                self.serializer.serialize_string(&node.tag);
                self.serializer
                    .serialize_u32(node.external_vars.len() as u32);
                for var in &node.external_vars {
                    self.write_location(&var.location);
                    self.serializer.serialize_string(&var.name);
                    self.write_type_value(&var.ty);
                    self.write_u32_value(&var.binding_set);
                    self.write_u32_value(&var.binding_index);
                    self.serializer.serialize_string(&var.tag);
                    self.write_index(&var.var_index);
                }
            }
            Statement::DeclareFunction(node) => {
                self.serializer.serialize_u8(7);
                self.write_location(&node.location);
                self.serializer.serialize_string(&node.name);
                self.write_index(&node.func_index);
                self.serializer.serialize_u32(node.parameters.len() as u32);
                for parameter in &node.parameters {
                    self.write_location(&parameter.location);
                    self.serializer.serialize_string(&parameter.name);
                    self.write_type_value(&parameter.ty);
                    self.serializer
                        .serialize_u32(parameter.semantic.to_index());
                    self.write_index(&parameter.var_index);
                }
                self.write_type_value(&node.return_type);
                self.write_expression_value(&node.entry_stage, |this, stage| {
                    this.serializer.serialize_u32(stage.to_index());
                });
                self.write_expression_value(&node.depth_write, |this, mode| {
                    this.serializer.serialize_u32(mode.to_index());
                });
                self.write_bool_value(&node.early_fragment_tests);
                self.write_bool_value(&node.is_exported);
                self.write_expression_value(&node.workgroup_size, |this, size| {
                    this.serializer.serialize_u32(size[0]);
                    this.serializer.serialize_u32(size[1]);
                    this.serializer.serialize_u32(size[2]);
                });
                self.serializer.serialize_u32(node.statements.len() as u32);
                for inner in &node.statements {
                    self.write_statement(inner);
                }
            }
            Statement::DeclareOption(node) => {
                self.serializer.serialize_u8(8);
                self.write_location(&node.location);
                self.serializer.serialize_string(&node.name);
                self.write_index(&node.opt_index);
                self.write_type_value(&node.ty);
                self.write_optional_expression(&node.default_value);
            }
            Statement::DeclareStruct(node) => {
                self.serializer.serialize_u8(9);
                self.write_location(&node.location);
                self.write_index(&node.struct_index);
                self.write_bool_value(&node.is_exported);
                self.serializer
                    .serialize_string(&node.description.name);
                self.write_expression_value(&node.description.layout, |this, layout| {
                    this.serializer.serialize_u32(match layout {
                        StructLayout::Scalar => 0,
                        StructLayout::Std140 => 1,
                        StructLayout::Std430 => 2,
                    });
                });
                self.serializer.serialize_string(&node.description.tag);
                self.serializer
                    .serialize_u32(node.description.members.len() as u32);
                for member in &node.description.members {
                    self.write_location(&member.location);
                    self.serializer.serialize_string(&member.name);
                    self.write_type_value(&member.ty);
                    self.write_expression_value(&member.builtin, |this, builtin| {
                        this.serializer.serialize_u32(builtin.to_index());
                    });
                    self.write_u32_value(&member.location_index);
                    self.write_expression_value(&member.interp, |this, interp| {
                        this.serializer.serialize_u32(interp.to_index());
                    });
                    self.write_bool_value(&member.cond);
                    self.serializer.serialize_string(&member.tag);
                }
            }
            Statement::DeclareVariable(node) => {
                self.serializer.serialize_u8(10);
                self.write_location(&node.location);
                self.serializer.serialize_string(&node.name);
                self.write_index(&node.var_index);
                self.write_type_value(&node.ty);
                self.write_optional_expression(&node.initial_expression);
            }
            Statement::Discard(node) => {
                self.serializer.serialize_u8(11);
                self.write_location(&node.location);
            }
            Statement::Expression(node) => {
                self.serializer.serialize_u8(12);
                self.write_location(&node.location);
                self.write_expression(&node.expression);
            }
            Statement::For(node) => {
                self.serializer.serialize_u8(13);
                self.write_location(&node.location);
                self.serializer.serialize_string(&node.var_name);
                self.write_index(&node.var_index);
                self.write_expression(&node.from_expr);
                self.write_expression(&node.to_expr);
                self.write_optional_expression(&node.step_expr);
                self.write_bool_value(&node.unroll);
                self.write_statement(&node.statement);
            }
            Statement::ForEach(node) => {
                self.serializer.serialize_u8(14);
                self.write_location(&node.location);
                self.serializer.serialize_string(&node.var_name);
                self.write_index(&node.var_index);
                self.write_expression(&node.expression);
                self.write_bool_value(&node.unroll);
                self.write_statement(&node.statement);
            }
            Statement::Import(node) => {
                self.serializer.serialize_u8(15);
                self.write_location(&node.location);
                self.serializer.serialize_string(&node.module_name);
                self.serializer
                    .serialize_u32(node.identifiers.len() as u32);
                for identifier in &node.identifiers {
                    self.write_location(&identifier.location);
                    self.serializer.serialize_string(&identifier.identifier);
                    match &identifier.renamed_identifier {
                        Some(renamed) => {
                            self.serializer.serialize_bool(true);
                            self.serializer.serialize_string(renamed);
                        }
                        None => {
                            self.serializer.serialize_bool(false);
                        }
                    }
                }
            }
            Statement::Multi(node) => {
                self.serializer.serialize_u8(16);
                self.write_location(&node.location);
                self.serializer.serialize_u32(node.statements.len() as u32);
                for inner in &node.statements {
                    self.write_statement(inner);
                }
            }
            Statement::NoOp(node) => {
                self.serializer.serialize_u8(17);
                self.write_location(&node.location);
            }
            Statement::Return(node) => {
                self.serializer.serialize_u8(18);
                self.write_location(&node.location);
                match &node.returned_expr {
                    Some(expr) => {
                        self.serializer.serialize_bool(true);
                        self.write_expression(expr);
                    }
                    None => {
                        self.serializer.serialize_bool(false);
                    }
                }
            }
            Statement::Scoped(node) => {
                self.serializer.serialize_u8(19);
                self.write_location(&node.location);
                self.write_statement(&node.statement);
            }
            Statement::While(node) => {
                self.serializer.serialize_u8(20);
                self.write_location(&node.location);
                self.write_expression(&node.condition);
                self.write_bool_value(&node.unroll);
                self.write_statement(&node.body);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

struct ModuleReader<'a> {
    deserializer: Deserializer<'a>,
    files: Vec<Arc<String>>,
}

fn enum_value<T>(
    value: u32,
    what: &'static str,
    from_index: impl Fn(u32) -> Option<T>,
) -> Result<T> {
    from_index(value).ok_or(SerializationError::InvalidEnum { what, value })
}

impl<'a> ModuleReader<'a> {
    fn read_module(&mut self) -> Result<Module> {
        let lang_version = Version::new(
            self.deserializer.deserialize_u8()?,
            self.deserializer.deserialize_u8()?,
            self.deserializer.deserialize_u16()?,
        );
        let module_name = self.deserializer.deserialize_string()?;
        let author = self.deserializer.deserialize_string()?;
        let description = self.deserializer.deserialize_string()?;
        let license = self.deserializer.deserialize_string()?;
        let feature_count = self.deserializer.deserialize_u32()?;
        let mut enabled_features = Vec::with_capacity(feature_count as usize);
        for _ in 0..feature_count {
            let value = self.deserializer.deserialize_u32()?;
            enabled_features.push(enum_value(value, "module feature", ModuleFeature::from_index)?);
        }

        let imported_count = self.deserializer.deserialize_u32()?;
        let mut imported_modules = Vec::with_capacity(imported_count as usize);
        for _ in 0..imported_count {
            let identifier = self.deserializer.deserialize_string()?;
            let module = self.read_module()?;
            imported_modules.push(ImportedModule { identifier, module });
        }

        let root_location = self.read_location()?;
        let statement_count = self.deserializer.deserialize_u32()?;
        let mut statements = Vec::with_capacity(statement_count as usize);
        for _ in 0..statement_count {
            statements.push(self.read_statement()?);
        }

        Ok(Module {
            metadata: Arc::new(Metadata {
                lang_version,
                module_name,
                author,
                description,
                license,
                enabled_features,
            }),
            imported_modules,
            root: MultiStatement {
                statements,
                location: root_location,
            },
        })
    }

    fn read_location(&mut self) -> Result<SourceLocation> {
        let file = match self.deserializer.deserialize_u8()? {
            0 => None,
            1 => {
                let path = Arc::new(self.deserializer.deserialize_string()?);
                self.files.push(path.clone());
                Some(path)
            }
            2 => {
                let id = self.deserializer.deserialize_u32()? as usize;
                Some(
                    self.files
                        .get(id)
                        .cloned()
                        .ok_or(SerializationError::UnexpectedEndOfStream)?,
                )
            }
            tag => return Err(SerializationError::InvalidTag(tag)),
        };
        Ok(SourceLocation {
            file,
            start_line: self.deserializer.deserialize_u32()?,
            start_column: self.deserializer.deserialize_u32()?,
            end_line: self.deserializer.deserialize_u32()?,
            end_column: self.deserializer.deserialize_u32()?,
        })
    }

    fn read_index(&mut self) -> Result<Option<usize>> {
        Ok(if self.deserializer.deserialize_bool()? {
            Some(self.deserializer.deserialize_u32()? as usize)
        } else {
            None
        })
    }

    fn read_type(&mut self) -> Result<ExpressionType> {
        let tag = self.deserializer.deserialize_u8()?;
        Ok(match tag {
            0 => ExpressionType::Primitive(enum_value(
                self.deserializer.deserialize_u32()?,
                "primitive type",
                PrimitiveType::from_index,
            )?),
            1 => {
                let component_count = self.deserializer.deserialize_u32()?;
                let base = enum_value(
                    self.deserializer.deserialize_u32()?,
                    "primitive type",
                    PrimitiveType::from_index,
                )?;
                ExpressionType::Vector(VectorType {
                    component_count,
                    base,
                })
            }
            2 => {
                let column_count = self.deserializer.deserialize_u32()?;
                let row_count = self.deserializer.deserialize_u32()?;
                let base = enum_value(
                    self.deserializer.deserialize_u32()?,
                    "primitive type",
                    PrimitiveType::from_index,
                )?;
                ExpressionType::Matrix(MatrixType {
                    column_count,
                    row_count,
                    base,
                })
            }
            3 => {
                let inner = Box::new(self.read_type()?);
                let length = self.deserializer.deserialize_u32()?;
                ExpressionType::Array(ArrayType { inner, length })
            }
            4 => ExpressionType::DynArray(DynArrayType {
                inner: Box::new(self.read_type()?),
            }),
            5 => ExpressionType::Struct(self.deserializer.deserialize_u32()? as usize),
            6 => {
                let dim = enum_value(
                    self.deserializer.deserialize_u32()?,
                    "texture dimension",
                    TextureDim::from_index,
                )?;
                let base = enum_value(
                    self.deserializer.deserialize_u32()?,
                    "primitive type",
                    PrimitiveType::from_index,
                )?;
                let depth = self.deserializer.deserialize_bool()?;
                ExpressionType::Sampler(SamplerType { dim, base, depth })
            }
            7 => {
                let dim = enum_value(
                    self.deserializer.deserialize_u32()?,
                    "texture dimension",
                    TextureDim::from_index,
                )?;
                let base = enum_value(
                    self.deserializer.deserialize_u32()?,
                    "primitive type",
                    PrimitiveType::from_index,
                )?;
                let access = enum_value(
                    self.deserializer.deserialize_u32()?,
                    "access policy",
                    AccessPolicy::from_index,
                )?;
                ExpressionType::Texture(TextureType { dim, base, access })
            }
            8 => {
                let struct_index = self.deserializer.deserialize_u32()? as usize;
                let access = enum_value(
                    self.deserializer.deserialize_u32()?,
                    "access policy",
                    AccessPolicy::from_index,
                )?;
                ExpressionType::Storage(StorageType {
                    struct_index,
                    access,
                })
            }
            9 => ExpressionType::Uniform(UniformType {
                struct_index: self.deserializer.deserialize_u32()? as usize,
            }),
            10 => ExpressionType::PushConstant(PushConstantType {
                struct_index: self.deserializer.deserialize_u32()? as usize,
            }),
            11 => ExpressionType::Alias(self.deserializer.deserialize_u32()? as usize),
            12 => ExpressionType::Function(self.deserializer.deserialize_u32()? as usize),
            13 => ExpressionType::Intrinsic(enum_value(
                self.deserializer.deserialize_u32()?,
                "intrinsic",
                IntrinsicKind::from_index,
            )?),
            14 => {
                let object = Box::new(self.read_type()?);
                let method = self.deserializer.deserialize_string()?;
                ExpressionType::Method { object, method }
            }
            15 => ExpressionType::Module(self.deserializer.deserialize_u32()? as usize),
            16 => {
                ExpressionType::NamedExternalBlock(self.deserializer.deserialize_u32()? as usize)
            }
            17 => ExpressionType::Type(Box::new(self.read_type()?)),
            18 => ExpressionType::ImplicitVector(self.deserializer.deserialize_u32()?),
            19 => ExpressionType::NoType,
            tag => return Err(SerializationError::InvalidTag(tag)),
        })
    }

    fn read_optional_type(&mut self) -> Result<Option<ExpressionType>> {
        Ok(if self.deserializer.deserialize_bool()? {
            Some(self.read_type()?)
        } else {
            None
        })
    }

    fn read_single_value(&mut self) -> Result<ConstantSingleValue> {
        let tag = self.deserializer.deserialize_u8()?;
        Ok(match tag {
            0 => ConstantSingleValue::Bool(self.deserializer.deserialize_bool()?),
            1 => ConstantSingleValue::F32(self.deserializer.deserialize_f32()?),
            2 => ConstantSingleValue::F64(self.deserializer.deserialize_f64()?),
            3 => ConstantSingleValue::I32(self.deserializer.deserialize_i32()?),
            4 => ConstantSingleValue::U32(self.deserializer.deserialize_u32()?),
            5 => ConstantSingleValue::String(self.deserializer.deserialize_string()?),
            6 => ConstantSingleValue::FloatLiteral(self.deserializer.deserialize_f64()?),
            7 => ConstantSingleValue::IntLiteral(self.deserializer.deserialize_i64()?),
            tag => return Err(SerializationError::InvalidTag(tag)),
        })
    }

    fn read_constant_value(&mut self) -> Result<ConstantValue> {
        let tag = self.deserializer.deserialize_u8()?;
        Ok(match tag {
            0 => ConstantValue::NoValue,
            1 => ConstantValue::Single(self.read_single_value()?),
            2 => {
                let count = self.deserializer.deserialize_u32()?;
                let mut components = SmallVec::new();
                for _ in 0..count {
                    components.push(self.read_single_value()?);
                }
                ConstantValue::Vector(ConstantVectorValue::new(components))
            }
            3 => {
                let count = self.deserializer.deserialize_u32()?;
                let mut values = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    values.push(self.read_constant_value()?);
                }
                ConstantValue::Array(ConstantArrayValue { values })
            }
            tag => return Err(SerializationError::InvalidTag(tag)),
        })
    }

    fn read_expression_value<T>(
        &mut self,
        mut read_value: impl FnMut(&mut Self) -> Result<T>,
    ) -> Result<ExpressionValue<T>> {
        Ok(match self.deserializer.deserialize_u8()? {
            0 => ExpressionValue::None,
            1 => ExpressionValue::Expression(Box::new(self.read_expression()?)),
            2 => ExpressionValue::Value(read_value(self)?),
            tag => return Err(SerializationError::InvalidTag(tag)),
        })
    }

    fn read_type_value(&mut self) -> Result<ExpressionValue<ExpressionType>> {
        self.read_expression_value(|this| this.read_type())
    }

    fn read_bool_value(&mut self) -> Result<ExpressionValue<bool>> {
        self.read_expression_value(|this| this.deserializer.deserialize_bool())
    }

    fn read_u32_value(&mut self) -> Result<ExpressionValue<u32>> {
        self.read_expression_value(|this| this.deserializer.deserialize_u32())
    }

    fn read_expression(&mut self) -> Result<Expression> {
        let tag = self.deserializer.deserialize_u8()?;
        let location = self.read_location()?;
        let cached_type = self.read_optional_type()?;

        Ok(match tag {
            0 => {
                let field_index = self.deserializer.deserialize_u32()?;
                let expr = Box::new(self.read_expression()?);
                Expression::AccessField(AccessFieldExpression {
                    expr,
                    field_index,
                    cached_type,
                    location,
                })
            }
            1 => {
                let count = self.deserializer.deserialize_u32()?;
                let mut identifiers = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let identifier = self.deserializer.deserialize_string()?;
                    let entry_location = self.read_location()?;
                    identifiers.push(IdentifierEntry {
                        identifier,
                        location: entry_location,
                    });
                }
                let expr = Box::new(self.read_expression()?);
                Expression::AccessIdentifier(AccessIdentifierExpression {
                    expr,
                    identifiers,
                    cached_type,
                    location,
                })
            }
            2 => {
                let count = self.deserializer.deserialize_u32()?;
                let expr = Box::new(self.read_expression()?);
                let mut indices = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    indices.push(self.read_expression()?);
                }
                Expression::AccessIndex(AccessIndexExpression {
                    expr,
                    indices,
                    cached_type,
                    location,
                })
            }
            3 => {
                let op = enum_value(
                    self.deserializer.deserialize_u32()?,
                    "assign operator",
                    AssignType::from_index,
                )?;
                let left = Box::new(self.read_expression()?);
                let right = Box::new(self.read_expression()?);
                Expression::Assign(AssignExpression {
                    op,
                    left,
                    right,
                    cached_type,
                    location,
                })
            }
            4 => {
                let op = enum_value(
                    self.deserializer.deserialize_u32()?,
                    "binary operator",
                    BinaryType::from_index,
                )?;
                let left = Box::new(self.read_expression()?);
                let right = Box::new(self.read_expression()?);
                Expression::Binary(BinaryExpression {
                    op,
                    left,
                    right,
                    cached_type,
                    location,
                })
            }
            5 => {
                let count = self.deserializer.deserialize_u32()?;
                let target = Box::new(self.read_expression()?);
                let mut parameters = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    parameters.push(self.read_expression()?);
                }
                Expression::CallFunction(CallFunctionExpression {
                    target,
                    parameters,
                    cached_type,
                    location,
                })
            }
            6 => {
                let method = self.deserializer.deserialize_string()?;
                let count = self.deserializer.deserialize_u32()?;
                let object = Box::new(self.read_expression()?);
                let mut parameters = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    parameters.push(self.read_expression()?);
                }
                Expression::CallMethod(CallMethodExpression {
                    object,
                    method,
                    parameters,
                    cached_type,
                    location,
                })
            }
            7 => {
                let target_type = self.read_type_value()?;
                let count = self.deserializer.deserialize_u32()?;
                let mut expressions = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    expressions.push(self.read_expression()?);
                }
                Expression::Cast(CastExpression {
                    target_type,
                    expressions,
                    cached_type,
                    location,
                })
            }
            8 => {
                let condition = Box::new(self.read_expression()?);
                let true_path = Box::new(self.read_expression()?);
                let false_path = Box::new(self.read_expression()?);
                Expression::Conditional(ConditionalExpression {
                    condition,
                    true_path,
                    false_path,
                    cached_type,
                    location,
                })
            }
            9 => {
                let value = self.read_constant_value()?;
                let ConstantValue::Array(values) = value else {
                    return Err(SerializationError::InvalidTag(9));
                };
                Expression::ConstantArrayValue(ConstantArrayValueExpression {
                    values,
                    cached_type,
                    location,
                })
            }
            10 => Expression::ConstantValue(ConstantValueExpression {
                value: self.read_constant_value()?,
                cached_type,
                location,
            }),
            11 => Expression::Identifier(IdentifierExpression {
                identifier: self.deserializer.deserialize_string()?,
                cached_type,
                location,
            }),
            12 => {
                let kind = enum_value(
                    self.deserializer.deserialize_u32()?,
                    "identifier kind",
                    IdentifierKind::from_index,
                )?;
                let index = self.deserializer.deserialize_u32()? as usize;
                Expression::IdentifierValue(IdentifierValueExpression {
                    kind,
                    index,
                    cached_type,
                    location,
                })
            }
            13 => {
                let intrinsic = enum_value(
                    self.deserializer.deserialize_u32()?,
                    "intrinsic",
                    IntrinsicKind::from_index,
                )?;
                let count = self.deserializer.deserialize_u32()?;
                let mut parameters = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    parameters.push(self.read_expression()?);
                }
                Expression::Intrinsic(IntrinsicExpression {
                    intrinsic,
                    parameters,
                    cached_type,
                    location,
                })
            }
            14 => {
                let count = self.deserializer.deserialize_u32()?;
                let mut components = SmallVec::new();
                for _ in 0..count {
                    components.push(self.deserializer.deserialize_u32()?);
                }
                let expr = Box::new(self.read_expression()?);
                Expression::Swizzle(SwizzleExpression {
                    expr,
                    components,
                    cached_type,
                    location,
                })
            }
            15 => {
                let ty = enum_value(
                    self.deserializer.deserialize_u32()?,
                    "primitive type",
                    PrimitiveType::from_index,
                )?;
                let constant = enum_value(
                    self.deserializer.deserialize_u32()?,
                    "type constant",
                    TypeConstant::from_index,
                )?;
                Expression::TypeConstant(TypeConstantExpression {
                    ty,
                    constant,
                    cached_type,
                    location,
                })
            }
            16 => {
                let op = enum_value(
                    self.deserializer.deserialize_u32()?,
                    "unary operator",
                    UnaryType::from_index,
                )?;
                let expr = Box::new(self.read_expression()?);
                Expression::Unary(UnaryExpression {
                    op,
                    expr,
                    cached_type,
                    location,
                })
            }
            tag => return Err(SerializationError::InvalidTag(tag)),
        })
    }

    fn read_optional_expression(&mut self) -> Result<Option<Box<Expression>>> {
        Ok(if self.deserializer.deserialize_bool()? {
            Some(Box::new(self.read_expression()?))
        } else {
            None
        })
    }

    fn read_statement(&mut self) -> Result<Statement> {
        let tag = self.deserializer.deserialize_u8()?;
        let location = self.read_location()?;

        Ok(match tag {
            0 => {
                let is_const = self.deserializer.deserialize_bool()?;
                let count = self.deserializer.deserialize_u32()?;
                let mut cond_statements = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let condition = self.read_expression()?;
                    let statement = Box::new(self.read_statement()?);
                    cond_statements.push(ConditionalBranch {
                        condition,
                        statement,
                    });
                }
                let else_statement = if self.deserializer.deserialize_bool()? {
                    Some(Box::new(self.read_statement()?))
                } else {
                    None
                };
                Statement::Branch(BranchStatement {
                    cond_statements,
                    else_statement,
                    is_const,
                    location,
                })
            }
            1 => Statement::Break(BreakStatement { location }),
            2 => {
                let condition = Box::new(self.read_expression()?);
                let statement = Box::new(self.read_statement()?);
                Statement::Conditional(ConditionalStatement {
                    condition,
                    statement,
                    location,
                })
            }
            3 => Statement::Continue(ContinueStatement { location }),
            4 => {
                let name = self.deserializer.deserialize_string()?;
                let alias_index = self.read_index()?;
                let expression = Box::new(self.read_expression()?);
                Statement::DeclareAlias(DeclareAliasStatement {
                    name,
                    alias_index,
                    expression,
                    location,
                })
            }
            5 => {
                let name = self.deserializer.deserialize_string()?;
                let const_index = self.read_index()?;
                let ty = self.read_type_value()?;
                let is_exported = self.read_bool_value()?;
                let expression = Box::new(self.read_expression()?);
                Statement::DeclareConst(DeclareConstStatement {
                    name,
                    const_index,
                    ty,
                    expression,
                    is_exported,
                    location,
                })
            }
            6 => {
                let name = if self.deserializer.deserialize_bool()? {
                    Some(self.deserializer.deserialize_string()?)
                } else {
                    None
                };
                let external_index = self.read_index()?;
                let auto_binding = self.read_bool_value()?;
                let binding_set = self.read_u32_value()?;
                let tag = self.deserializer.deserialize_string()?;
                let count = self.deserializer.deserialize_u32()?;
                let mut external_vars = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let var_location = self.read_location()?;
                    let var_name = self.deserializer.deserialize_string()?;
                    let ty = self.read_type_value()?;
                    let binding_set = self.read_u32_value()?;
                    let binding_index = self.read_u32_value()?;
                    let var_tag = self.deserializer.deserialize_string()?;
                    let var_index = self.read_index()?;
                    external_vars.push(ExternalVar {
                        name: var_name,
                        ty,
                        binding_set,
                        binding_index,
                        tag: var_tag,
                        var_index,
                        location: var_location,
                    });
                }
                Statement::DeclareExternal(DeclareExternalStatement {
                    name,
                    external_index,
                    auto_binding,
                    binding_set,
                    tag,
                    external_vars,
                    location,
                })
            }
            7 => {
                let name = self.deserializer.deserialize_string()?;
                let func_index = self.read_index()?;
                let parameter_count = self.deserializer.deserialize_u32()?;
                let mut parameters = Vec::with_capacity(parameter_count as usize);
                for _ in 0..parameter_count {
                    let parameter_location = self.read_location()?;
                    let parameter_name = self.deserializer.deserialize_string()?;
                    let ty = self.read_type_value()?;
                    let semantic = enum_value(
                        self.deserializer.deserialize_u32()?,
                        "parameter semantic",
                        ParameterSemantic::from_index,
                    )?;
                    let var_index = self.read_index()?;
                    parameters.push(FunctionParameter {
                        name: parameter_name,
                        ty,
                        semantic,
                        var_index,
                        location: parameter_location,
                    });
                }
                let return_type = self.read_type_value()?;
                let entry_stage = self.read_expression_value(|this| {
                    enum_value(
                        this.deserializer.deserialize_u32()?,
                        "shader stage",
                        ShaderStage::from_index,
                    )
                })?;
                let depth_write = self.read_expression_value(|this| {
                    enum_value(
                        this.deserializer.deserialize_u32()?,
                        "depth-write mode",
                        DepthWriteMode::from_index,
                    )
                })?;
                let early_fragment_tests = self.read_bool_value()?;
                let is_exported = self.read_bool_value()?;
                let workgroup_size = self.read_expression_value(|this| {
                    Ok([
                        this.deserializer.deserialize_u32()?,
                        this.deserializer.deserialize_u32()?,
                        this.deserializer.deserialize_u32()?,
                    ])
                })?;
                let statement_count = self.deserializer.deserialize_u32()?;
                let mut statements = Vec::with_capacity(statement_count as usize);
                for _ in 0..statement_count {
                    statements.push(self.read_statement()?);
                }
                Statement::DeclareFunction(DeclareFunctionStatement {
                    name,
                    func_index,
                    parameters,
                    return_type,
                    statements,
                    entry_stage,
                    depth_write,
                    early_fragment_tests,
                    is_exported,
                    workgroup_size,
                    location,
                })
            }
            8 => {
                let name = self.deserializer.deserialize_string()?;
                let opt_index = self.read_index()?;
                let ty = self.read_type_value()?;
                let default_value = self.read_optional_expression()?;
                Statement::DeclareOption(DeclareOptionStatement {
                    name,
                    opt_index,
                    ty,
                    default_value,
                    location,
                })
            }
            9 => {
                let struct_index = self.read_index()?;
                let is_exported = self.read_bool_value()?;
                let name = self.deserializer.deserialize_string()?;
                let layout = self.read_expression_value(|this| {
                    Ok(match this.deserializer.deserialize_u32()? {
                        0 => StructLayout::Scalar,
                        1 => StructLayout::Std140,
                        2 => StructLayout::Std430,
                        value => {
                            return Err(SerializationError::InvalidEnum {
                                what: "struct layout",
                                value,
                            })
                        }
                    })
                })?;
                let tag = self.deserializer.deserialize_string()?;
                let member_count = self.deserializer.deserialize_u32()?;
                let mut members = Vec::with_capacity(member_count as usize);
                for _ in 0..member_count {
                    let member_location = self.read_location()?;
                    let member_name = self.deserializer.deserialize_string()?;
                    let ty = self.read_type_value()?;
                    let builtin = self.read_expression_value(|this| {
                        enum_value(
                            this.deserializer.deserialize_u32()?,
                            "builtin",
                            BuiltinEntry::from_index,
                        )
                    })?;
                    let location_index = self.read_u32_value()?;
                    let interp = self.read_expression_value(|this| {
                        enum_value(
                            this.deserializer.deserialize_u32()?,
                            "interpolation qualifier",
                            InterpolationQualifier::from_index,
                        )
                    })?;
                    let cond = self.read_bool_value()?;
                    let member_tag = self.deserializer.deserialize_string()?;
                    members.push(StructMember {
                        name: member_name,
                        ty,
                        builtin,
                        location_index,
                        interp,
                        cond,
                        tag: member_tag,
                        location: member_location,
                    });
                }
                Statement::DeclareStruct(DeclareStructStatement {
                    struct_index,
                    description: StructDescription {
                        name,
                        layout,
                        tag,
                        members,
                    },
                    is_exported,
                    location,
                })
            }
            10 => {
                let name = self.deserializer.deserialize_string()?;
                let var_index = self.read_index()?;
                let ty = self.read_type_value()?;
                let initial_expression = self.read_optional_expression()?;
                Statement::DeclareVariable(DeclareVariableStatement {
                    name,
                    var_index,
                    ty,
                    initial_expression,
                    location,
                })
            }
            11 => Statement::Discard(DiscardStatement { location }),
            12 => Statement::Expression(ExpressionStatement {
                expression: self.read_expression()?,
                location,
            }),
            13 => {
                let var_name = self.deserializer.deserialize_string()?;
                let var_index = self.read_index()?;
                let from_expr = Box::new(self.read_expression()?);
                let to_expr = Box::new(self.read_expression()?);
                let step_expr = self.read_optional_expression()?;
                let unroll = self.read_bool_value()?;
                let statement = Box::new(self.read_statement()?);
                Statement::For(ForStatement {
                    var_name,
                    var_index,
                    from_expr,
                    to_expr,
                    step_expr,
                    statement,
                    unroll,
                    location,
                })
            }
            14 => {
                let var_name = self.deserializer.deserialize_string()?;
                let var_index = self.read_index()?;
                let expression = Box::new(self.read_expression()?);
                let unroll = self.read_bool_value()?;
                let statement = Box::new(self.read_statement()?);
                Statement::ForEach(ForEachStatement {
                    var_name,
                    var_index,
                    expression,
                    statement,
                    unroll,
                    location,
                })
            }
            15 => {
                let module_name = self.deserializer.deserialize_string()?;
                let count = self.deserializer.deserialize_u32()?;
                let mut identifiers = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let identifier_location = self.read_location()?;
                    let identifier = self.deserializer.deserialize_string()?;
                    let renamed_identifier = if self.deserializer.deserialize_bool()? {
                        Some(self.deserializer.deserialize_string()?)
                    } else {
                        None
                    };
                    identifiers.push(ImportIdentifier {
                        identifier,
                        renamed_identifier,
                        location: identifier_location,
                    });
                }
                Statement::Import(ImportStatement {
                    module_name,
                    identifiers,
                    location,
                })
            }
            16 => {
                let count = self.deserializer.deserialize_u32()?;
                let mut statements = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    statements.push(self.read_statement()?);
                }
                Statement::Multi(MultiStatement {
                    statements,
                    location,
                })
            }
            17 => Statement::NoOp(NoOpStatement { location }),
            18 => {
                let returned_expr = if self.deserializer.deserialize_bool()? {
                    Some(self.read_expression()?)
                } else {
                    None
                };
                Statement::Return(ReturnStatement {
                    returned_expr,
                    location,
                })
            }
            19 => Statement::Scoped(ScopedStatement {
                statement: Box::new(self.read_statement()?),
                location,
            }),
            20 => {
                let condition = Box::new(self.read_expression()?);
                let unroll = self.read_bool_value()?;
                let body = Box::new(self.read_statement()?);
                Statement::While(WhileStatement {
                    condition,
                    body,
                    unroll,
                    location,
                })
            }
            tag => return Err(SerializationError::InvalidTag(tag)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nzslc_par::parse_source;

    fn round_trip(source: &str) -> (Module, Module) {
        let module = parse_source(source, Some("test.nzsl")).expect("parse");
        let data = serialize_module(&module);
        let restored = deserialize_module(&data).expect("deserialize");
        (module, restored)
    }

    #[test]
    fn test_magic_is_nslb() {
        let module = Module::new(Metadata::default());
        let data = serialize_module(&module);
        assert_eq!(&data[0..4], &[0x42, 0x4C, 0x53, 0x4E]);
    }

    #[test]
    fn test_round_trip_is_identity() {
        let source = r#"[nzsl_version("1.0")]
[author("tester")]
module Engine.Test;

option Quality: i32 = 2;

const Scale: f32 = 2.0;

[layout(std140)]
struct Data
{
    [location(0)] color: vec4[f32],
    value: f32
}

external
{
    [binding(0)] data: uniform[Data]
}

fn helper(input: f32) -> f32
{
    return input * Scale;
}

[entry(frag)]
fn main()
{
    let value = 42.0;
    let vec = value.xxx;
    let result = helper(data.value);
    [unroll] for i in 0 -> 3
    {
        result += f32(i);
    }
    if (result > 1.0)
    {
        discard;
    }
    else
    {
        result = 0.0;
    }
    while (result < 10.0)
    {
        result += 1.0;
    }
}
"#;
        let (module, restored) = round_trip(source);
        assert_eq!(module, restored);
    }

    #[test]
    fn test_round_trip_preserves_imports() {
        let source = r#"[nzsl_version("1.0")]
module;

import a, b as c from Engine.Utils;
import * from Engine.Math;
"#;
        let (module, restored) = round_trip(source);
        assert_eq!(module, restored);
    }

    #[test]
    fn test_invalid_magic_rejected() {
        let err = deserialize_module(&[0, 1, 2, 3, 4, 5, 6, 7]).unwrap_err();
        assert_eq!(err, SerializationError::InvalidMagic);
    }

    #[test]
    fn test_newer_major_version_rejected() {
        let module = Module::new(Metadata::default());
        let mut data = serialize_module(&module);
        data[4] = BINARY_VERSION.major + 1;
        let err = deserialize_module(&data).unwrap_err();
        assert!(matches!(
            err,
            SerializationError::UnsupportedBinaryVersion(_)
        ));
    }

    #[test]
    fn test_truncated_stream_rejected() {
        let module = Module::new(Metadata::default());
        let data = serialize_module(&module);
        let err = deserialize_module(&data[..data.len() - 1]).unwrap_err();
        assert_eq!(err, SerializationError::UnexpectedEndOfStream);
    }
}
