use std::sync::Arc;

use crate::{
    consts::{ClassAccessFlag, FieldAccessFlag, MethodAccessFlag},
    error::ClassReadError,
};

/// Raw classfile as laid out on disk; indices still point into the constant pool.
#[derive(Debug)]
pub struct Class {
    pub(crate) minor_version: u16,
    pub(crate) major_version: u16,
    pub(crate) constant_pool: Vec<ConstantPoolInfo>,
    pub(crate) access_flags: ClassAccessFlag,
    pub(crate) this_class: u16,
    pub(crate) super_class: u16,
    pub(crate) interfaces: Vec<u16>,
    pub(crate) fields: Vec<FieldInfo>,
    pub(crate) methods: Vec<MethodInfo>,
    pub(crate) attributes: Vec<AttributeInfo>,
}

#[derive(Debug)]
pub enum ConstantPoolInfo {
    Utf8(Arc<str>),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class {
        name_index: u16,
    },
    String {
        string_index: u16,
    },
    Fieldref {
        class_index: u16,
        name_and_type_index: u16,
    },
    Methodref {
        class_index: u16,
        name_and_type_index: u16,
    },
    InterfaceMethodref {
        class_index: u16,
        name_and_type_index: u16,
    },
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
    MethodHandle {
        reference_kind: u8,
        reference_index: u16,
    },
    MethodType {
        descriptor_index: u16,
    },
    Dynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    InvokeDynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    Module {
        name_index: u16,
    },
    Package {
        name_index: u16,
    },
    // second slot of a Long or Double
    Empty,
}

#[derive(Debug)]
pub struct FieldInfo {
    pub(crate) access_flags: FieldAccessFlag,
    pub(crate) name_index: u16,
    pub(crate) descriptor_index: u16,
    pub(crate) attributes: Vec<AttributeInfo>,
}

#[derive(Debug)]
pub struct MethodInfo {
    pub(crate) access_flags: MethodAccessFlag,
    pub(crate) name_index: u16,
    pub(crate) descriptor_index: u16,
    pub(crate) attributes: Vec<AttributeInfo>,
}

#[derive(Debug)]
pub struct AttributeInfo {
    pub(crate) attribute_name_index: u16,
    pub(crate) info: Vec<u8>,
}

/// Member reference decoded from a `Fieldref`, `Methodref` or
/// `InterfaceMethodref` constant.
#[derive(Debug, Clone)]
pub struct CpMemberRef {
    pub(crate) class_name: Arc<str>,
    pub(crate) name: Arc<str>,
    pub(crate) descriptor: Arc<str>,
    pub(crate) interface: bool,
}

impl Class {
    fn constant(&self, index: u16) -> Option<&ConstantPoolInfo> {
        if index == 0 {
            return None;
        }
        self.constant_pool.get(index as usize - 1)
    }

    pub(crate) fn resolve_utf8(&self, index: u16) -> Result<Arc<str>, ClassReadError> {
        match self.constant(index) {
            Some(ConstantPoolInfo::Utf8(string)) => Ok(Arc::clone(string)),
            _ => Err(ClassReadError::ConstantPool {
                index,
                expected: "Utf8",
            }),
        }
    }

    pub(crate) fn resolve_class(&self, index: u16) -> Result<Arc<str>, ClassReadError> {
        match self.constant(index) {
            Some(ConstantPoolInfo::Class { name_index }) => self.resolve_utf8(*name_index),
            _ => Err(ClassReadError::ConstantPool {
                index,
                expected: "Class",
            }),
        }
    }

    pub(crate) fn resolve_name_and_type(
        &self,
        index: u16,
    ) -> Result<(Arc<str>, Arc<str>), ClassReadError> {
        match self.constant(index) {
            Some(ConstantPoolInfo::NameAndType {
                name_index,
                descriptor_index,
            }) => Ok((
                self.resolve_utf8(*name_index)?,
                self.resolve_utf8(*descriptor_index)?,
            )),
            _ => Err(ClassReadError::ConstantPool {
                index,
                expected: "NameAndType",
            }),
        }
    }

    pub(crate) fn resolve_member_ref(&self, index: u16) -> Result<CpMemberRef, ClassReadError> {
        let (class_index, name_and_type_index, interface) = match self.constant(index) {
            Some(ConstantPoolInfo::Fieldref {
                class_index,
                name_and_type_index,
            })
            | Some(ConstantPoolInfo::Methodref {
                class_index,
                name_and_type_index,
            }) => (*class_index, *name_and_type_index, false),
            Some(ConstantPoolInfo::InterfaceMethodref {
                class_index,
                name_and_type_index,
            }) => (*class_index, *name_and_type_index, true),
            _ => {
                return Err(ClassReadError::ConstantPool {
                    index,
                    expected: "Fieldref or Methodref",
                });
            }
        };
        let (name, descriptor) = self.resolve_name_and_type(name_and_type_index)?;
        Ok(CpMemberRef {
            class_name: self.resolve_class(class_index)?,
            name,
            descriptor,
            interface,
        })
    }

    pub(crate) fn resolve_method_handle(
        &self,
        index: u16,
    ) -> Result<Option<(u8, CpMemberRef)>, ClassReadError> {
        match self.constant(index) {
            Some(ConstantPoolInfo::MethodHandle {
                reference_kind,
                reference_index,
            }) => Ok(Some((
                *reference_kind,
                self.resolve_member_ref(*reference_index)?,
            ))),
            Some(_) => Ok(None),
            None => Err(ClassReadError::ConstantPool {
                index,
                expected: "loadable constant",
            }),
        }
    }

    /// `Some(name)` when the constant at `index` is a `Class` entry.
    pub(crate) fn class_constant(&self, index: u16) -> Result<Option<Arc<str>>, ClassReadError> {
        match self.constant(index) {
            Some(ConstantPoolInfo::Class { name_index }) => Ok(Some(self.resolve_utf8(*name_index)?)),
            Some(_) => Ok(None),
            None => Err(ClassReadError::ConstantPool {
                index,
                expected: "loadable constant",
            }),
        }
    }

    pub(crate) fn attribute_name(&self, attribute: &AttributeInfo) -> Result<Arc<str>, ClassReadError> {
        self.resolve_utf8(attribute.attribute_name_index)
    }
}
