use std::sync::Arc;

use indexmap::IndexSet;
use nom::{
    IResult, Parser,
    bytes::complete::take,
    multi::count,
    number::complete::{be_u16, be_u32},
};
use tracing::debug;

use crate::{
    class::{self, AttributeInfo, CpMemberRef, parser::parse_attributes},
    definition::{
        ClassDefinition, FieldDefinition, FieldInstruction, FieldReference, Invocation,
        MethodDefinition, MethodReference, Reference, TypeReference, TypeUsage,
        instructions::{self as inst, Instructions},
    },
    descriptor::{
        FieldDescriptor, parse_field_descriptor, parse_method_descriptor,
        signature::{class_signature_classes, field_signature_classes, method_signature_classes},
    },
    error::ClassReadError,
    name::ClassName,
};

struct CodeAttribute<'a> {
    code: &'a [u8],
    catch_types: Vec<u16>,
    attributes: Vec<AttributeInfo>,
}

struct BootstrapMethod {
    method_ref: u16,
    arguments: Vec<u16>,
}

pub(super) fn build(class_file: &class::Class) -> Result<ClassDefinition, ClassReadError> {
    let name = ClassName::from(class_file.resolve_class(class_file.this_class)?);

    // java.lang.Object
    let super_name = if class_file.super_class == 0 {
        None
    } else {
        Some(ClassName::from(class_file.resolve_class(class_file.super_class)?))
    };
    let interfaces = class_file
        .interfaces
        .iter()
        .map(|index| class_file.resolve_class(*index).map(ClassName::from))
        .collect::<Result<Vec<_>, _>>()?;

    let mut nest_host = None;
    let mut signature_classes = Vec::new();
    let mut bootstrap_methods = Vec::new();
    for attribute in &class_file.attributes {
        match &*class_file.attribute_name(attribute)? {
            "NestHost" => {
                let index = single_index(&attribute.info)?;
                nest_host = Some(ClassName::from(class_file.resolve_class(index)?));
            }
            "Signature" => {
                signature_classes = signature_attribute(class_file, attribute, class_signature_classes);
            }
            "BootstrapMethods" => {
                bootstrap_methods = parse_bootstrap_methods(&attribute.info)
                    .map_err(|err| ClassReadError::from_nom(attribute.info.len(), err))?
                    .1;
            }
            _ => {}
        }
    }

    let fields = class_file
        .fields
        .iter()
        .map(|f| build_field(class_file, f))
        .collect::<Result<Vec<_>, _>>()?;
    let methods = class_file
        .methods
        .iter()
        .map(|m| build_method(class_file, m, &bootstrap_methods))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ClassDefinition {
        name,
        super_name,
        interfaces,
        access_flags: class_file.access_flags,
        fields,
        methods,
        nest_host,
        signature_classes,
        major_version: class_file.major_version,
        minor_version: class_file.minor_version,
    })
}

fn single_index(info: &[u8]) -> Result<u16, ClassReadError> {
    be_u16::<_, nom::error::Error<&[u8]>>(info)
        .map(|(_, index)| index)
        .map_err(|err| ClassReadError::from_nom(info.len(), err))
}

/// Classes named by a generic `Signature` attribute. A malformed signature
/// names no classes.
fn signature_attribute(
    class_file: &class::Class,
    attribute: &AttributeInfo,
    classes: fn(&str) -> Option<Vec<ClassName>>,
) -> Vec<ClassName> {
    let signature = match single_index(&attribute.info)
        .and_then(|index| class_file.resolve_utf8(index))
    {
        Ok(signature) => signature,
        Err(err) => {
            debug!(%err, "ignoring unreadable Signature attribute");
            return Vec::new();
        }
    };
    classes(&signature).unwrap_or_else(|| {
        debug!(%signature, "ignoring malformed Signature attribute");
        Vec::new()
    })
}

fn build_field(
    class_file: &class::Class,
    field: &class::FieldInfo,
) -> Result<FieldDefinition, ClassReadError> {
    let name = class_file.resolve_utf8(field.name_index)?;
    let descriptor = class_file.resolve_utf8(field.descriptor_index)?;
    let (_, FieldDescriptor(field_type)) = parse_field_descriptor(&descriptor)
        .map_err(|_| ClassReadError::Descriptor(descriptor.to_string()))?;

    let mut signature_classes = Vec::new();
    for attribute in &field.attributes {
        if &*class_file.attribute_name(attribute)? == "Signature" {
            signature_classes = signature_attribute(class_file, attribute, field_signature_classes);
        }
    }

    Ok(FieldDefinition {
        name,
        descriptor,
        field_type,
        access_flags: field.access_flags,
        signature_classes,
    })
}

fn build_method(
    class_file: &class::Class,
    method: &class::MethodInfo,
    bootstrap_methods: &[BootstrapMethod],
) -> Result<MethodDefinition, ClassReadError> {
    let name = class_file.resolve_utf8(method.name_index)?;
    let descriptor = class_file.resolve_utf8(method.descriptor_index)?;
    let (_, parsed_descriptor) = parse_method_descriptor(&descriptor)
        .map_err(|_| ClassReadError::Descriptor(descriptor.to_string()))?;

    let mut exceptions = Vec::new();
    let mut signature_classes = Vec::new();
    let mut references = IndexSet::new();
    for attribute in &method.attributes {
        match &*class_file.attribute_name(attribute)? {
            "Code" => {
                let (_, code) = parse_code_attribute(&attribute.info)
                    .map_err(|err| ClassReadError::from_nom(attribute.info.len(), err))?;
                collect_code_references(class_file, &code, bootstrap_methods, &mut references)
                    .map_err(|err| match err {
                        ClassReadError::Bytecode { reason, .. } => ClassReadError::Bytecode {
                            method: format!("{name}{descriptor}"),
                            reason,
                        },
                        other => other,
                    })?;
            }
            "Exceptions" => {
                let (_, indices) = parse_index_table(&attribute.info)
                    .map_err(|err| ClassReadError::from_nom(attribute.info.len(), err))?;
                for index in indices {
                    exceptions.push(ClassName::from(class_file.resolve_class(index)?));
                }
            }
            "Signature" => {
                signature_classes = signature_attribute(class_file, attribute, method_signature_classes);
            }
            _ => {}
        }
    }

    Ok(MethodDefinition {
        name,
        descriptor,
        parsed_descriptor,
        access_flags: method.access_flags,
        exceptions,
        signature_classes,
        references: references.into_iter().collect(),
    })
}

fn parse_code_attribute(input: &[u8]) -> IResult<&[u8], CodeAttribute<'_>> {
    let (input, _max_stack) = be_u16(input)?;
    let (input, _max_locals) = be_u16(input)?;

    let (input, code_length) = be_u32(input)?;
    let (input, code) = take(code_length).parse(input)?;

    let (input, exception_table_length) = be_u16(input)?;
    let (input, catch_types) = count(
        |input| {
            let (input, _start_pc) = be_u16(input)?;
            let (input, _end_pc) = be_u16(input)?;
            let (input, _handler_pc) = be_u16(input)?;
            be_u16(input)
        },
        exception_table_length as _,
    )
    .parse(input)?;

    let (input, attributes) = parse_attributes(input)?;

    Ok((
        input,
        CodeAttribute {
            code,
            catch_types,
            attributes,
        },
    ))
}

fn parse_index_table(input: &[u8]) -> IResult<&[u8], Vec<u16>> {
    let (input, length) = be_u16(input)?;
    count(be_u16, length as _).parse(input)
}

fn parse_bootstrap_methods(input: &[u8]) -> IResult<&[u8], Vec<BootstrapMethod>> {
    let (input, num_bootstrap_methods) = be_u16(input)?;
    count(
        |input| {
            let (input, method_ref) = be_u16(input)?;
            let (input, arguments) = parse_index_table(input)?;
            Ok((
                input,
                BootstrapMethod {
                    method_ref,
                    arguments,
                },
            ))
        },
        num_bootstrap_methods as _,
    )
    .parse(input)
}

/// `(start_pc, length, name_index, descriptor_index, index)` entries; only the
/// descriptor matters here.
fn parse_local_variable_descriptors(input: &[u8]) -> IResult<&[u8], Vec<u16>> {
    let (input, length) = be_u16(input)?;
    count(
        |input| {
            let (input, _start_pc) = be_u16(input)?;
            let (input, _length) = be_u16(input)?;
            let (input, _name_index) = be_u16(input)?;
            let (input, descriptor_index) = be_u16(input)?;
            let (input, _index) = be_u16(input)?;
            Ok((input, descriptor_index))
        },
        length as _,
    )
    .parse(input)
}

fn type_reference(name: &str, usage: TypeUsage) -> Option<Reference> {
    ClassName::new(name)
        .element_class()
        .map(|class_name| Reference::Type(TypeReference { class_name, usage }))
}

fn method_reference(member: CpMemberRef, invocation: Invocation) -> Reference {
    Reference::Method(MethodReference {
        owner: ClassName::from(member.class_name),
        name: member.name,
        descriptor: member.descriptor,
        invocation,
        interface_ref: member.interface,
    })
}

fn field_reference(member: CpMemberRef, instruction: FieldInstruction) -> Reference {
    Reference::Field(FieldReference {
        owner: ClassName::from(member.class_name),
        name: member.name,
        descriptor: member.descriptor,
        instruction,
    })
}

/// Reference made through a `CONSTANT_MethodHandle` (JVMS 5.4.3.5).
fn method_handle_reference(reference_kind: u8, member: CpMemberRef) -> Option<Reference> {
    let reference = match reference_kind {
        1 => field_reference(member, FieldInstruction::GetField),
        2 => field_reference(member, FieldInstruction::GetStatic),
        3 => field_reference(member, FieldInstruction::PutField),
        4 => field_reference(member, FieldInstruction::PutStatic),
        5 => method_reference(member, Invocation::Virtual),
        6 => method_reference(member, Invocation::Static),
        7 | 8 => method_reference(member, Invocation::Special),
        9 => method_reference(member, Invocation::Interface),
        _ => return None,
    };
    Some(reference)
}

fn bytecode_error(reason: impl Into<String>) -> ClassReadError {
    ClassReadError::Bytecode {
        method: String::new(),
        reason: reason.into(),
    }
}

fn collect_loadable_constant(
    class_file: &class::Class,
    index: u16,
    references: &mut IndexSet<Reference>,
) -> Result<(), ClassReadError> {
    if let Some(name) = class_file.class_constant(index)? {
        references.extend(type_reference(&name, TypeUsage::ClassLiteral));
    } else if let Some((kind, member)) = class_file.resolve_method_handle(index)? {
        references.extend(method_handle_reference(kind, member));
    }
    Ok(())
}

fn collect_code_references(
    class_file: &class::Class,
    code: &CodeAttribute<'_>,
    bootstrap_methods: &[BootstrapMethod],
    references: &mut IndexSet<Reference>,
) -> Result<(), ClassReadError> {
    for instruction in Instructions::new(code.code) {
        let instruction = instruction.map_err(bytecode_error)?;
        match instruction.opcode {
            inst::NEW | inst::CHECKCAST | inst::INSTANCEOF | inst::ANEWARRAY
            | inst::MULTIANEWARRAY => {
                let usage = match instruction.opcode {
                    inst::NEW => TypeUsage::New,
                    inst::CHECKCAST => TypeUsage::CheckCast,
                    inst::INSTANCEOF => TypeUsage::InstanceOf,
                    inst::ANEWARRAY => TypeUsage::NewArray,
                    _ => TypeUsage::MultiNewArray,
                };
                let name = class_file.resolve_class(instruction.u16_operand())?;
                references.extend(type_reference(&name, usage));
            }
            inst::LDC => {
                collect_loadable_constant(class_file, instruction.u8_operand() as u16, references)?;
            }
            inst::LDC_W => {
                collect_loadable_constant(class_file, instruction.u16_operand(), references)?;
            }
            inst::GETSTATIC | inst::PUTSTATIC | inst::GETFIELD | inst::PUTFIELD => {
                let field_instruction = match instruction.opcode {
                    inst::GETSTATIC => FieldInstruction::GetStatic,
                    inst::PUTSTATIC => FieldInstruction::PutStatic,
                    inst::GETFIELD => FieldInstruction::GetField,
                    _ => FieldInstruction::PutField,
                };
                let member = class_file.resolve_member_ref(instruction.u16_operand())?;
                references.insert(field_reference(member, field_instruction));
            }
            inst::INVOKEVIRTUAL | inst::INVOKESPECIAL | inst::INVOKESTATIC
            | inst::INVOKEINTERFACE => {
                let invocation = match instruction.opcode {
                    inst::INVOKEVIRTUAL => Invocation::Virtual,
                    inst::INVOKESPECIAL => Invocation::Special,
                    inst::INVOKESTATIC => Invocation::Static,
                    _ => Invocation::Interface,
                };
                let member = class_file.resolve_member_ref(instruction.u16_operand())?;
                references.insert(method_reference(member, invocation));
            }
            inst::INVOKEDYNAMIC => {
                let index = instruction.u16_operand();
                let Some(class::ConstantPoolInfo::InvokeDynamic {
                    bootstrap_method_attr_index,
                    ..
                }) = class_file.constant_pool.get((index as usize).wrapping_sub(1))
                else {
                    return Err(ClassReadError::ConstantPool {
                        index,
                        expected: "InvokeDynamic",
                    });
                };
                let bootstrap = bootstrap_methods
                    .get(*bootstrap_method_attr_index as usize)
                    .ok_or_else(|| bytecode_error("invokedynamic without bootstrap method"))?;
                collect_loadable_constant(class_file, bootstrap.method_ref, references)?;
                for argument in &bootstrap.arguments {
                    collect_loadable_constant(class_file, *argument, references)?;
                }
            }
            _ => {}
        }
    }

    for catch_type in &code.catch_types {
        // 0 is a finally handler
        if *catch_type != 0 {
            let name = class_file.resolve_class(*catch_type)?;
            references.extend(type_reference(&name, TypeUsage::Catch));
        }
    }

    for attribute in &code.attributes {
        if &*class_file.attribute_name(attribute)? != "LocalVariableTable" {
            continue;
        }
        // debugging metadata only: a broken table is skipped, not fatal
        match local_variable_types(class_file, attribute) {
            Ok(types) => references.extend(types.into_iter().map(|class_name| {
                Reference::Type(TypeReference {
                    class_name,
                    usage: TypeUsage::LocalVariable,
                })
            })),
            Err(err) => debug!(%err, "ignoring malformed LocalVariableTable"),
        }
    }
    Ok(())
}

fn local_variable_types(
    class_file: &class::Class,
    attribute: &AttributeInfo,
) -> Result<Vec<ClassName>, ClassReadError> {
    let (_, descriptors) = parse_local_variable_descriptors(&attribute.info)
        .map_err(|err| ClassReadError::from_nom(attribute.info.len(), err))?;
    let mut types = Vec::new();
    for index in descriptors {
        let descriptor = class_file.resolve_utf8(index)?;
        let (_, FieldDescriptor(field_type)) = parse_field_descriptor(&descriptor)
            .map_err(|_| ClassReadError::Descriptor(descriptor.to_string()))?;
        types.extend(field_type.element_class());
    }
    Ok(types)
}
