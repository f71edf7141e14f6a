use std::sync::Arc;

use crate::{
    consts::{ClassAccessFlag, FieldAccessFlag, MethodAccessFlag},
    descriptor::{FieldType, MethodDescriptor},
    error::ClassReadError,
    name::ClassName,
};

mod builder;
pub(crate) mod instructions;

/// Immutable structural view of one class, produced by [`ClassDefinition::parse`].
#[derive(Debug)]
pub struct ClassDefinition {
    pub(crate) name: ClassName,
    pub(crate) super_name: Option<ClassName>,
    pub(crate) interfaces: Vec<ClassName>,
    pub(crate) access_flags: ClassAccessFlag,
    pub(crate) fields: Vec<FieldDefinition>,
    pub(crate) methods: Vec<MethodDefinition>,
    pub(crate) nest_host: Option<ClassName>,
    pub(crate) signature_classes: Vec<ClassName>,
    pub(crate) major_version: u16,
    pub(crate) minor_version: u16,
}

#[derive(Debug)]
pub struct FieldDefinition {
    pub(crate) name: Arc<str>,
    pub(crate) descriptor: Arc<str>,
    pub(crate) field_type: FieldType,
    pub(crate) access_flags: FieldAccessFlag,
    pub(crate) signature_classes: Vec<ClassName>,
}

#[derive(Debug)]
pub struct MethodDefinition {
    pub(crate) name: Arc<str>,
    pub(crate) descriptor: Arc<str>,
    pub(crate) parsed_descriptor: MethodDescriptor,
    pub(crate) access_flags: MethodAccessFlag,
    pub(crate) exceptions: Vec<ClassName>,
    pub(crate) signature_classes: Vec<ClassName>,
    // deduplicated, in bytecode order
    pub(crate) references: Vec<Reference>,
}

/// A symbolic reference made from a method body.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reference {
    Type(TypeReference),
    Method(MethodReference),
    Field(FieldReference),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeReference {
    pub class_name: ClassName,
    pub usage: TypeUsage,
}

/// Where a type reference comes from. The first group resolves a `Class`
/// constant at link time; the rest only name a type in metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeUsage {
    New,
    CheckCast,
    InstanceOf,
    NewArray,
    MultiNewArray,
    ClassLiteral,
    Catch,
    LocalVariable,
}

impl TypeUsage {
    pub fn resolves_class_constant(&self) -> bool {
        !matches!(self, TypeUsage::LocalVariable)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodReference {
    pub owner: ClassName,
    pub name: Arc<str>,
    pub descriptor: Arc<str>,
    pub invocation: Invocation,
    /// Whether the constant is an `InterfaceMethodref`.
    pub interface_ref: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Invocation {
    Virtual,
    Special,
    Static,
    Interface,
}

impl Invocation {
    pub fn instruction(&self) -> &'static str {
        match self {
            Invocation::Virtual => "invokevirtual",
            Invocation::Special => "invokespecial",
            Invocation::Static => "invokestatic",
            Invocation::Interface => "invokeinterface",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldReference {
    pub owner: ClassName,
    pub name: Arc<str>,
    pub descriptor: Arc<str>,
    pub instruction: FieldInstruction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldInstruction {
    GetStatic,
    PutStatic,
    GetField,
    PutField,
}

impl FieldInstruction {
    pub fn is_static(&self) -> bool {
        matches!(self, FieldInstruction::GetStatic | FieldInstruction::PutStatic)
    }

    pub fn is_put(&self) -> bool {
        matches!(self, FieldInstruction::PutStatic | FieldInstruction::PutField)
    }

    pub fn instruction(&self) -> &'static str {
        match self {
            FieldInstruction::GetStatic => "getstatic",
            FieldInstruction::PutStatic => "putstatic",
            FieldInstruction::GetField => "getfield",
            FieldInstruction::PutField => "putfield",
        }
    }
}

impl ClassDefinition {
    /// Parses classfile bytes. Pure: the result only depends on `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<ClassDefinition, ClassReadError> {
        let class = crate::class::parser::class_file(bytes)?;
        builder::build(&class)
    }

    pub fn name(&self) -> &ClassName {
        &self.name
    }

    pub fn super_name(&self) -> Option<&ClassName> {
        self.super_name.as_ref()
    }

    pub fn interfaces(&self) -> &[ClassName] {
        &self.interfaces
    }

    pub fn access_flags(&self) -> ClassAccessFlag {
        self.access_flags
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn methods(&self) -> &[MethodDefinition] {
        &self.methods
    }

    pub fn version(&self) -> (u16, u16) {
        (self.major_version, self.minor_version)
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlag::INTERFACE)
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags.contains(ClassAccessFlag::ABSTRACT)
    }

    pub fn is_final(&self) -> bool {
        self.access_flags.contains(ClassAccessFlag::FINAL)
    }

    /// Host of the nest this class belongs to; a class without `NestHost` hosts itself.
    pub fn nest_host(&self) -> &ClassName {
        self.nest_host.as_ref().unwrap_or(&self.name)
    }

    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&MethodDefinition> {
        self.methods
            .iter()
            .find(|m| &*m.name == name && &*m.descriptor == descriptor)
    }

    pub fn find_field(&self, name: &str, descriptor: &str) -> Option<&FieldDefinition> {
        self.fields
            .iter()
            .find(|f| &*f.name == name && &*f.descriptor == descriptor)
    }
}

impl FieldDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn access_flags(&self) -> FieldAccessFlag {
        self.access_flags
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(FieldAccessFlag::STATIC)
    }

    pub fn is_final(&self) -> bool {
        self.access_flags.contains(FieldAccessFlag::FINAL)
    }
}

impl MethodDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn access_flags(&self) -> MethodAccessFlag {
        self.access_flags
    }

    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlag::STATIC)
    }

    pub fn is_private(&self) -> bool {
        self.access_flags.contains(MethodAccessFlag::PRIVATE)
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags.contains(MethodAccessFlag::ABSTRACT)
    }

    pub fn is_final(&self) -> bool {
        self.access_flags.contains(MethodAccessFlag::FINAL)
    }

    pub fn is_initializer(&self) -> bool {
        &*self.name == "<init>" || &*self.name == "<clinit>"
    }

    /// Classes named by parameter, return and declared exception types.
    pub fn signature_types(&self) -> impl Iterator<Item = ClassName> + '_ {
        self.parsed_descriptor
            .referenced_classes()
            .chain(self.exceptions.iter().cloned())
    }
}
