//! Classfile writer used by tests to synthesise plugin and platform classes.

use std::{
    collections::HashMap,
    io::{Cursor, Write},
    path::Path,
    sync::Arc,
};

use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

use crate::{
    definition::instructions as inst,
    resolver::{ArchiveResolver, Resolver},
};

pub(crate) const PUBLIC: u16 = 0x0001;
pub(crate) const PRIVATE: u16 = 0x0002;
pub(crate) const PROTECTED: u16 = 0x0004;
pub(crate) const STATIC: u16 = 0x0008;
pub(crate) const FINAL: u16 = 0x0010;
pub(crate) const SUPER: u16 = 0x0020;
pub(crate) const INTERFACE: u16 = 0x0200;
pub(crate) const ABSTRACT: u16 = 0x0400;
pub(crate) const NATIVE: u16 = 0x0100;

#[derive(Debug, Clone)]
pub(crate) struct Handle {
    pub kind: u8,
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub interface: bool,
}

#[derive(Debug, Clone)]
pub(crate) enum Insn {
    New(String),
    CheckCast(String),
    InstanceOf(String),
    NewArray(String),
    MultiNewArray(String, u8),
    LdcClass(String),
    InvokeVirtual(String, String, String),
    InvokeSpecial(String, String, String),
    InvokeStatic(String, String, String),
    InvokeInterface(String, String, String),
    /// Any invoke opcode with an explicit choice of `Methodref` or `InterfaceMethodref`.
    Invoke {
        opcode: u8,
        owner: String,
        name: String,
        descriptor: String,
        interface_ref: bool,
    },
    GetStatic(String, String, String),
    PutStatic(String, String, String),
    GetField(String, String, String),
    PutField(String, String, String),
    /// Bootstrap handle followed by handle arguments.
    InvokeDynamic(Handle, Vec<Handle>),
}

#[derive(Default)]
struct ConstantPool {
    entries: Vec<Vec<u8>>,
    dedup: HashMap<Vec<u8>, u16>,
}

impl ConstantPool {
    fn add(&mut self, entry: Vec<u8>) -> u16 {
        if let Some(index) = self.dedup.get(&entry) {
            return *index;
        }
        self.entries.push(entry.clone());
        let index = self.entries.len() as u16;
        self.dedup.insert(entry, index);
        index
    }

    fn utf8(&mut self, value: &str) -> u16 {
        let mut entry = vec![1];
        entry.extend_from_slice(&(value.len() as u16).to_be_bytes());
        entry.extend_from_slice(value.as_bytes());
        self.add(entry)
    }

    fn class(&mut self, name: &str) -> u16 {
        let name_index = self.utf8(name);
        let mut entry = vec![7];
        entry.extend_from_slice(&name_index.to_be_bytes());
        self.add(entry)
    }

    fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        let mut entry = vec![12];
        entry.extend_from_slice(&name_index.to_be_bytes());
        entry.extend_from_slice(&descriptor_index.to_be_bytes());
        self.add(entry)
    }

    fn member(&mut self, tag: u8, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(owner);
        let nat_index = self.name_and_type(name, descriptor);
        let mut entry = vec![tag];
        entry.extend_from_slice(&class_index.to_be_bytes());
        entry.extend_from_slice(&nat_index.to_be_bytes());
        self.add(entry)
    }

    fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str, interface: bool) -> u16 {
        self.member(if interface { 11 } else { 10 }, owner, name, descriptor)
    }

    fn field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.member(9, owner, name, descriptor)
    }

    fn method_handle(&mut self, handle: &Handle) -> u16 {
        let reference_index = if handle.kind <= 4 {
            self.field_ref(&handle.owner, &handle.name, &handle.descriptor)
        } else {
            self.method_ref(&handle.owner, &handle.name, &handle.descriptor, handle.interface)
        };
        let mut entry = vec![15, handle.kind];
        entry.extend_from_slice(&reference_index.to_be_bytes());
        self.add(entry)
    }

    fn invoke_dynamic(&mut self, bootstrap_index: u16) -> u16 {
        let nat_index = self.name_and_type("apply", "()Ljava/lang/Object;");
        let mut entry = vec![18];
        entry.extend_from_slice(&bootstrap_index.to_be_bytes());
        entry.extend_from_slice(&nat_index.to_be_bytes());
        self.add(entry)
    }
}

struct MethodSpec {
    access: u16,
    name: String,
    descriptor: String,
    code: Vec<Insn>,
    catch_types: Vec<String>,
    exceptions: Vec<String>,
    signature: Option<String>,
}

pub(crate) struct ClassBuilder {
    name: String,
    super_name: Option<String>,
    interfaces: Vec<String>,
    access: u16,
    fields: Vec<(u16, String, String, Option<String>)>,
    methods: Vec<MethodSpec>,
    nest_host: Option<String>,
    signature: Option<String>,
}

impl ClassBuilder {
    pub fn new(name: &str) -> Self {
        ClassBuilder {
            name: name.to_string(),
            super_name: Some("java/lang/Object".to_string()),
            interfaces: Vec::new(),
            access: PUBLIC | SUPER,
            fields: Vec::new(),
            methods: Vec::new(),
            nest_host: None,
            signature: None,
        }
    }

    pub fn super_class(mut self, name: &str) -> Self {
        self.super_name = Some(name.to_string());
        self
    }

    /// Only `java/lang/Object` legitimately has no superclass.
    pub fn no_super(mut self) -> Self {
        self.super_name = None;
        self
    }

    pub fn interface(mut self, name: &str) -> Self {
        self.interfaces.push(name.to_string());
        self
    }

    pub fn access(mut self, access: u16) -> Self {
        self.access = access;
        self
    }

    pub fn field(mut self, access: u16, name: &str, descriptor: &str) -> Self {
        self.fields
            .push((access, name.to_string(), descriptor.to_string(), None));
        self
    }

    pub fn field_with_signature(
        mut self,
        access: u16,
        name: &str,
        descriptor: &str,
        signature: &str,
    ) -> Self {
        self.fields.push((
            access,
            name.to_string(),
            descriptor.to_string(),
            Some(signature.to_string()),
        ));
        self
    }

    /// Adds a method; it gets a `Code` attribute unless it is abstract or native.
    pub fn method(mut self, access: u16, name: &str, descriptor: &str, code: Vec<Insn>) -> Self {
        self.methods.push(MethodSpec {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            code,
            catch_types: Vec::new(),
            exceptions: Vec::new(),
            signature: None,
        });
        self
    }

    fn last_method(&mut self, name: &str) -> &mut MethodSpec {
        self.methods
            .iter_mut()
            .rev()
            .find(|m| m.name == name)
            .expect("method declared before its attributes")
    }

    pub fn catch_type(mut self, method: &str, class_name: &str) -> Self {
        self.last_method(method)
            .catch_types
            .push(class_name.to_string());
        self
    }

    pub fn throws(mut self, method: &str, class_name: &str) -> Self {
        self.last_method(method)
            .exceptions
            .push(class_name.to_string());
        self
    }

    pub fn method_signature(mut self, method: &str, signature: &str) -> Self {
        self.last_method(method).signature = Some(signature.to_string());
        self
    }

    pub fn nest_host(mut self, host: &str) -> Self {
        self.nest_host = Some(host.to_string());
        self
    }

    pub fn signature(mut self, signature: &str) -> Self {
        self.signature = Some(signature.to_string());
        self
    }

    pub fn entry_path(&self) -> String {
        format!("{}.class", self.name)
    }

    pub fn build(&self) -> Vec<u8> {
        let mut pool = ConstantPool::default();
        let mut body = Vec::new();
        let mut bootstrap_methods: Vec<(u16, Vec<u16>)> = Vec::new();

        body.extend_from_slice(&self.access.to_be_bytes());
        body.extend_from_slice(&pool.class(&self.name).to_be_bytes());
        let super_index = match &self.super_name {
            Some(name) => pool.class(name),
            None => 0,
        };
        body.extend_from_slice(&super_index.to_be_bytes());

        body.extend_from_slice(&(self.interfaces.len() as u16).to_be_bytes());
        for interface in &self.interfaces {
            body.extend_from_slice(&pool.class(interface).to_be_bytes());
        }

        body.extend_from_slice(&(self.fields.len() as u16).to_be_bytes());
        for (access, name, descriptor, signature) in &self.fields {
            body.extend_from_slice(&access.to_be_bytes());
            body.extend_from_slice(&pool.utf8(name).to_be_bytes());
            body.extend_from_slice(&pool.utf8(descriptor).to_be_bytes());
            match signature {
                Some(signature) => {
                    body.extend_from_slice(&1u16.to_be_bytes());
                    write_index_attribute(&mut body, &mut pool, "Signature", |pool| {
                        pool.utf8(signature)
                    });
                }
                None => body.extend_from_slice(&0u16.to_be_bytes()),
            }
        }

        body.extend_from_slice(&(self.methods.len() as u16).to_be_bytes());
        for method in &self.methods {
            body.extend_from_slice(&method.access.to_be_bytes());
            body.extend_from_slice(&pool.utf8(&method.name).to_be_bytes());
            body.extend_from_slice(&pool.utf8(&method.descriptor).to_be_bytes());

            let mut attributes = Vec::new();
            let mut attribute_count = 0u16;
            if method.access & (ABSTRACT | NATIVE) == 0 {
                attribute_count += 1;
                let code = encode_code(&method.code, &mut pool, &mut bootstrap_methods);
                let mut info = Vec::new();
                info.extend_from_slice(&16u16.to_be_bytes());
                info.extend_from_slice(&16u16.to_be_bytes());
                info.extend_from_slice(&(code.len() as u32).to_be_bytes());
                info.extend_from_slice(&code);
                info.extend_from_slice(&(method.catch_types.len() as u16).to_be_bytes());
                for catch_type in &method.catch_types {
                    info.extend_from_slice(&0u16.to_be_bytes());
                    info.extend_from_slice(&(code.len() as u16).to_be_bytes());
                    info.extend_from_slice(&0u16.to_be_bytes());
                    info.extend_from_slice(&pool.class(catch_type).to_be_bytes());
                }
                info.extend_from_slice(&0u16.to_be_bytes());
                write_attribute(&mut attributes, &mut pool, "Code", &info);
            }
            if !method.exceptions.is_empty() {
                attribute_count += 1;
                let mut info = Vec::new();
                info.extend_from_slice(&(method.exceptions.len() as u16).to_be_bytes());
                for exception in &method.exceptions {
                    info.extend_from_slice(&pool.class(exception).to_be_bytes());
                }
                write_attribute(&mut attributes, &mut pool, "Exceptions", &info);
            }
            if let Some(signature) = &method.signature {
                attribute_count += 1;
                write_index_attribute(&mut attributes, &mut pool, "Signature", |pool| {
                    pool.utf8(signature)
                });
            }
            body.extend_from_slice(&attribute_count.to_be_bytes());
            body.extend_from_slice(&attributes);
        }

        let mut attributes = Vec::new();
        let mut attribute_count = 0u16;
        if let Some(host) = &self.nest_host {
            attribute_count += 1;
            write_index_attribute(&mut attributes, &mut pool, "NestHost", |pool| {
                pool.class(host)
            });
        }
        if let Some(signature) = &self.signature {
            attribute_count += 1;
            write_index_attribute(&mut attributes, &mut pool, "Signature", |pool| {
                pool.utf8(signature)
            });
        }
        if !bootstrap_methods.is_empty() {
            attribute_count += 1;
            let mut info = Vec::new();
            info.extend_from_slice(&(bootstrap_methods.len() as u16).to_be_bytes());
            for (method_ref, arguments) in &bootstrap_methods {
                info.extend_from_slice(&method_ref.to_be_bytes());
                info.extend_from_slice(&(arguments.len() as u16).to_be_bytes());
                for argument in arguments {
                    info.extend_from_slice(&argument.to_be_bytes());
                }
            }
            write_attribute(&mut attributes, &mut pool, "BootstrapMethods", &info);
        }
        body.extend_from_slice(&attribute_count.to_be_bytes());
        body.extend_from_slice(&attributes);

        let mut bytes = vec![0xca, 0xfe, 0xba, 0xbe, 0, 0, 0, 61];
        bytes.extend_from_slice(&(pool.entries.len() as u16 + 1).to_be_bytes());
        for entry in &pool.entries {
            bytes.extend_from_slice(entry);
        }
        bytes.extend_from_slice(&body);
        bytes
    }
}

fn write_attribute(out: &mut Vec<u8>, pool: &mut ConstantPool, name: &str, info: &[u8]) {
    out.extend_from_slice(&pool.utf8(name).to_be_bytes());
    out.extend_from_slice(&(info.len() as u32).to_be_bytes());
    out.extend_from_slice(info);
}

fn write_index_attribute(
    out: &mut Vec<u8>,
    pool: &mut ConstantPool,
    name: &str,
    index: impl FnOnce(&mut ConstantPool) -> u16,
) {
    let index = index(pool);
    write_attribute(out, pool, name, &index.to_be_bytes());
}

fn encode_code(
    code: &[Insn],
    pool: &mut ConstantPool,
    bootstrap_methods: &mut Vec<(u16, Vec<u16>)>,
) -> Vec<u8> {
    let mut out = Vec::new();
    let emit = |out: &mut Vec<u8>, opcode: u8, index: u16| {
        out.push(opcode);
        out.extend_from_slice(&index.to_be_bytes());
    };
    for insn in code {
        match insn {
            Insn::New(name) => emit(&mut out, inst::NEW, pool.class(name)),
            Insn::CheckCast(name) => emit(&mut out, inst::CHECKCAST, pool.class(name)),
            Insn::InstanceOf(name) => emit(&mut out, inst::INSTANCEOF, pool.class(name)),
            Insn::NewArray(name) => emit(&mut out, inst::ANEWARRAY, pool.class(name)),
            Insn::MultiNewArray(name, dimensions) => {
                emit(&mut out, inst::MULTIANEWARRAY, pool.class(name));
                out.push(*dimensions);
            }
            Insn::LdcClass(name) => emit(&mut out, inst::LDC_W, pool.class(name)),
            Insn::InvokeVirtual(owner, name, descriptor) => emit(
                &mut out,
                inst::INVOKEVIRTUAL,
                pool.method_ref(owner, name, descriptor, false),
            ),
            Insn::InvokeSpecial(owner, name, descriptor) => emit(
                &mut out,
                inst::INVOKESPECIAL,
                pool.method_ref(owner, name, descriptor, false),
            ),
            Insn::InvokeStatic(owner, name, descriptor) => emit(
                &mut out,
                inst::INVOKESTATIC,
                pool.method_ref(owner, name, descriptor, false),
            ),
            Insn::InvokeInterface(owner, name, descriptor) => {
                emit(
                    &mut out,
                    inst::INVOKEINTERFACE,
                    pool.method_ref(owner, name, descriptor, true),
                );
                out.extend_from_slice(&[1, 0]);
            }
            Insn::Invoke {
                opcode,
                owner,
                name,
                descriptor,
                interface_ref,
            } => {
                emit(
                    &mut out,
                    *opcode,
                    pool.method_ref(owner, name, descriptor, *interface_ref),
                );
                if *opcode == inst::INVOKEINTERFACE {
                    out.extend_from_slice(&[1, 0]);
                }
            }
            Insn::GetStatic(owner, name, descriptor) => emit(
                &mut out,
                inst::GETSTATIC,
                pool.field_ref(owner, name, descriptor),
            ),
            Insn::PutStatic(owner, name, descriptor) => emit(
                &mut out,
                inst::PUTSTATIC,
                pool.field_ref(owner, name, descriptor),
            ),
            Insn::GetField(owner, name, descriptor) => emit(
                &mut out,
                inst::GETFIELD,
                pool.field_ref(owner, name, descriptor),
            ),
            Insn::PutField(owner, name, descriptor) => emit(
                &mut out,
                inst::PUTFIELD,
                pool.field_ref(owner, name, descriptor),
            ),
            Insn::InvokeDynamic(bootstrap, arguments) => {
                let method_ref = pool.method_handle(bootstrap);
                let arguments = arguments.iter().map(|h| pool.method_handle(h)).collect();
                bootstrap_methods.push((method_ref, arguments));
                let index = pool.invoke_dynamic(bootstrap_methods.len() as u16 - 1);
                emit(&mut out, inst::INVOKEDYNAMIC, index);
                out.extend_from_slice(&[0, 0]);
            }
        }
    }
    out.push(inst::RETURN);
    out
}

/// Stored zip bytes holding `entries`.
pub(crate) fn zip_bytes(entries: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, bytes) in entries {
        writer.start_file(name.as_str(), options).unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub(crate) fn jar_entries(classes: &[ClassBuilder]) -> Vec<(String, Vec<u8>)> {
    classes.iter().map(|c| (c.entry_path(), c.build())).collect()
}

pub(crate) fn write_jar(path: &Path, classes: &[ClassBuilder]) {
    std::fs::write(path, zip_bytes(&jar_entries(classes))).unwrap();
}

/// Eager in-memory resolver over the given classes.
pub(crate) fn classes(moniker: &str, classes: Vec<ClassBuilder>) -> Arc<dyn Resolver> {
    Arc::new(ArchiveResolver::in_memory(moniker, jar_entries(&classes)))
}

/// `java/lang/Object` with a public constructor plus a few commonly used members.
pub(crate) fn object_class() -> ClassBuilder {
    ClassBuilder::new("java/lang/Object")
        .no_super()
        .method(PUBLIC, "<init>", "()V", vec![])
        .method(PUBLIC, "toString", "()Ljava/lang/String;", vec![])
        .method(PUBLIC, "hashCode", "()I", vec![])
        .method(PUBLIC | FINAL | NATIVE, "getClass", "()Ljava/lang/Class;", vec![])
}

/// Minimal runtime library: `Object`, `String`, `Class`.
pub(crate) fn runtime_library() -> Arc<dyn Resolver> {
    classes(
        "jdk",
        vec![
            object_class(),
            ClassBuilder::new("java/lang/String").access(PUBLIC | FINAL | SUPER),
            ClassBuilder::new("java/lang/Class").access(PUBLIC | FINAL | SUPER),
        ],
    )
}
