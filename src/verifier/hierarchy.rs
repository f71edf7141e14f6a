//! Class lookup and member resolution over the effective classpath
//! (JVMS 5.4.3.2 - 5.4.3.4).

use std::{collections::HashSet, sync::Arc};

use crate::{
    consts::MethodAccessFlag,
    definition::{ClassDefinition, FieldDefinition, MethodDefinition},
    error::ClassReadError,
    name::ClassName,
    resolver::Resolver,
};

const SIGNATURE_POLYMORPHIC_OWNERS: [&str; 2] =
    ["java/lang/invoke/MethodHandle", "java/lang/invoke/VarHandle"];

#[derive(Debug, Clone)]
pub(crate) enum Lookup {
    Found(Arc<ClassDefinition>),
    Missing,
    Unreadable(ClassReadError),
}

/// A class that had to be loaded to finish a resolution but could not be.
#[derive(Debug, Clone)]
pub(crate) struct Unresolved {
    pub class: ClassName,
    // None when the class is absent
    pub error: Option<ClassReadError>,
}

#[derive(Debug, Clone)]
pub(crate) enum Resolution<T> {
    Found(T),
    NotFound,
    Incomplete(Unresolved),
}

#[derive(Debug, Clone)]
pub(crate) struct ResolvedMethod {
    pub class: Arc<ClassDefinition>,
    index: usize,
}

impl ResolvedMethod {
    pub fn method(&self) -> &MethodDefinition {
        &self.class.methods()[self.index]
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ResolvedField {
    pub class: Arc<ClassDefinition>,
    index: usize,
}

impl ResolvedField {
    pub fn field(&self) -> &FieldDefinition {
        &self.class.fields()[self.index]
    }
}

pub(crate) struct Hierarchy<'a> {
    resolver: &'a dyn Resolver,
}

impl<'a> Hierarchy<'a> {
    pub fn new(resolver: &'a dyn Resolver) -> Self {
        Hierarchy { resolver }
    }

    pub fn lookup(&self, name: &ClassName) -> Lookup {
        match self.resolver.find(name) {
            Ok(Some(definition)) => Lookup::Found(definition),
            Ok(None) => Lookup::Missing,
            Err(err) => Lookup::Unreadable(err),
        }
    }

    fn require(&self, name: &ClassName) -> Result<Arc<ClassDefinition>, Unresolved> {
        match self.lookup(name) {
            Lookup::Found(definition) => Ok(definition),
            Lookup::Missing => Err(Unresolved {
                class: name.clone(),
                error: None,
            }),
            Lookup::Unreadable(err) => Err(Unresolved {
                class: name.clone(),
                error: Some(err),
            }),
        }
    }

    /// `start` followed by its superclasses up to the root.
    pub fn class_chain(
        &self,
        start: &Arc<ClassDefinition>,
    ) -> Result<Vec<Arc<ClassDefinition>>, Unresolved> {
        let mut chain = vec![Arc::clone(start)];
        let mut seen = HashSet::from([start.name().clone()]);
        let mut current = Arc::clone(start);
        while let Some(super_name) = current.super_name() {
            // circular hierarchies exist only in broken class files
            if !seen.insert(super_name.clone()) {
                break;
            }
            let parent = self.require(super_name)?;
            chain.push(Arc::clone(&parent));
            current = parent;
        }
        Ok(chain)
    }

    /// Every interface `start` implements, directly or through superclasses
    /// and superinterfaces, each once.
    pub fn all_superinterfaces(
        &self,
        start: &Arc<ClassDefinition>,
    ) -> Result<Vec<Arc<ClassDefinition>>, Unresolved> {
        let mut pending: Vec<ClassName> = Vec::new();
        for class in self.class_chain(start)? {
            pending.extend(class.interfaces().iter().cloned());
        }
        let mut seen = HashSet::new();
        let mut interfaces = Vec::new();
        let mut index = 0;
        while index < pending.len() {
            let name = pending[index].clone();
            index += 1;
            if !seen.insert(name.clone()) {
                continue;
            }
            let interface = self.require(&name)?;
            pending.extend(interface.interfaces().iter().cloned());
            interfaces.push(interface);
        }
        Ok(interfaces)
    }

    /// `Some(true)` when `class` is `ancestor` or inherits from it, `None` when
    /// the superclass chain cannot be loaded.
    pub fn is_subclass_of(&self, class: &Arc<ClassDefinition>, ancestor: &ClassName) -> Option<bool> {
        let mut current = Arc::clone(class);
        let mut seen = HashSet::new();
        loop {
            if current.name() == ancestor {
                return Some(true);
            }
            if !seen.insert(current.name().clone()) {
                return Some(false);
            }
            let Some(super_name) = current.super_name() else {
                return Some(false);
            };
            if super_name == ancestor {
                return Some(true);
            }
            current = match self.lookup(super_name) {
                Lookup::Found(parent) => parent,
                _ => return None,
            };
        }
    }

    fn signature_polymorphic(class: &Arc<ClassDefinition>, name: &str) -> Option<ResolvedMethod> {
        if !SIGNATURE_POLYMORPHIC_OWNERS.contains(&class.name().as_str()) {
            return None;
        }
        let mut candidates = class
            .methods()
            .iter()
            .enumerate()
            .filter(|(_, m)| m.name() == name);
        let (index, method) = candidates.next()?;
        let flags = method.access_flags();
        let polymorphic = candidates.next().is_none()
            && flags.contains(MethodAccessFlag::NATIVE | MethodAccessFlag::VARARGS)
            && method.descriptor().starts_with("([Ljava/lang/Object;)");
        polymorphic.then(|| ResolvedMethod {
            class: Arc::clone(class),
            index,
        })
    }

    fn declared_method(
        class: &Arc<ClassDefinition>,
        name: &str,
        descriptor: &str,
    ) -> Option<ResolvedMethod> {
        class
            .methods()
            .iter()
            .position(|m| m.name() == name && m.descriptor() == descriptor)
            .map(|index| ResolvedMethod {
                class: Arc::clone(class),
                index,
            })
    }

    fn superinterface_method(
        &self,
        class: &Arc<ClassDefinition>,
        name: &str,
        descriptor: &str,
    ) -> Resolution<ResolvedMethod> {
        let interfaces = match self.all_superinterfaces(class) {
            Ok(interfaces) => interfaces,
            Err(unresolved) => return Resolution::Incomplete(unresolved),
        };
        // prefer a default method over an abstract one
        let mut abstract_match = None;
        for interface in &interfaces {
            if let Some(found) = Self::declared_method(interface, name, descriptor) {
                let method = found.method();
                if method.is_private() || method.is_static() {
                    continue;
                }
                if !method.is_abstract() {
                    return Resolution::Found(found);
                }
                abstract_match.get_or_insert(found);
            }
        }
        match abstract_match {
            Some(found) => Resolution::Found(found),
            None => Resolution::NotFound,
        }
    }

    /// Resolves a `Methodref` whose owner is the class `owner`.
    pub fn resolve_class_method(
        &self,
        owner: &Arc<ClassDefinition>,
        name: &str,
        descriptor: &str,
    ) -> Resolution<ResolvedMethod> {
        if name == "<init>" || name == "<clinit>" {
            return match Self::declared_method(owner, name, descriptor) {
                Some(found) => Resolution::Found(found),
                None => Resolution::NotFound,
            };
        }
        if let Some(found) = Self::signature_polymorphic(owner, name) {
            return Resolution::Found(found);
        }
        let chain = match self.class_chain(owner) {
            Ok(chain) => chain,
            Err(unresolved) => return Resolution::Incomplete(unresolved),
        };
        for class in &chain {
            if let Some(found) = Self::declared_method(class, name, descriptor) {
                return Resolution::Found(found);
            }
            if let Some(found) = Self::signature_polymorphic(class, name) {
                return Resolution::Found(found);
            }
        }
        self.superinterface_method(owner, name, descriptor)
    }

    /// Resolves an `InterfaceMethodref` whose owner is the interface `owner`.
    pub fn resolve_interface_method(
        &self,
        owner: &Arc<ClassDefinition>,
        name: &str,
        descriptor: &str,
    ) -> Resolution<ResolvedMethod> {
        if let Some(found) = Self::declared_method(owner, name, descriptor) {
            return Resolution::Found(found);
        }
        let object = ClassName::new(ClassName::OBJECT);
        match self.require(&object) {
            Ok(object) => {
                if let Some(found) = Self::declared_method(&object, name, descriptor) {
                    let method = found.method();
                    if method.access_flags().contains(MethodAccessFlag::PUBLIC) && !method.is_static() {
                        return Resolution::Found(found);
                    }
                }
            }
            Err(unresolved) => return Resolution::Incomplete(unresolved),
        }
        self.superinterface_method(owner, name, descriptor)
    }

    /// Field lookup: the class itself, its superinterfaces, then its superclass.
    pub fn resolve_field(
        &self,
        owner: &Arc<ClassDefinition>,
        name: &str,
        descriptor: &str,
    ) -> Resolution<ResolvedField> {
        let mut seen = HashSet::new();
        match self.find_field(owner, name, descriptor, &mut seen) {
            Ok(Some(found)) => Resolution::Found(found),
            Ok(None) => Resolution::NotFound,
            Err(unresolved) => Resolution::Incomplete(unresolved),
        }
    }

    fn find_field(
        &self,
        class: &Arc<ClassDefinition>,
        name: &str,
        descriptor: &str,
        seen: &mut HashSet<ClassName>,
    ) -> Result<Option<ResolvedField>, Unresolved> {
        if !seen.insert(class.name().clone()) {
            return Ok(None);
        }
        if let Some(index) = class
            .fields()
            .iter()
            .position(|f| f.name() == name && f.descriptor() == descriptor)
        {
            return Ok(Some(ResolvedField {
                class: Arc::clone(class),
                index,
            }));
        }
        for interface in class.interfaces() {
            let interface = self.require(interface)?;
            if let Some(found) = self.find_field(&interface, name, descriptor, seen)? {
                return Ok(Some(found));
            }
        }
        if let Some(super_name) = class.super_name() {
            let parent = self.require(super_name)?;
            return self.find_field(&parent, name, descriptor, seen);
        }
        Ok(None)
    }
}
