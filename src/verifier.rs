//! Link-time verification of plugin classes against an effective classpath.
//!
//! Every class owned by the plugin is checked the way the JVM would link it:
//! supertypes, field types, method signatures and every symbolic reference a
//! method body makes. Failures become [`Problem`]s; nothing here aborts the
//! run.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::{
    consts::Visibility,
    definition::{ClassDefinition, MethodDefinition},
    name::ClassName,
    options::VerifierOptions,
    problem::{ClassChange, MemberRef, Problem, ProblemLocation, ProblemSet},
    resolver::Resolver,
};

mod access;
mod hierarchy;
mod references;

use hierarchy::{Hierarchy, Lookup, Unresolved};

/// Verifies every class of `plugin_classes` against `classpath`.
///
/// `classpath` must contain the plugin classes themselves. Classes are visited
/// in name order so the result does not depend on container iteration order.
pub fn verify_plugin_classes(
    plugin_classes: &dyn Resolver,
    classpath: &dyn Resolver,
    options: &VerifierOptions,
) -> ProblemSet {
    let mut verifier = Verifier::new(classpath, options);
    let mut names: Vec<&ClassName> = plugin_classes.all_names().iter().collect();
    names.sort();
    debug!(classes = names.len(), source = %plugin_classes.moniker(), "verifying plugin classes");
    for name in names {
        verifier.verify_class(plugin_classes, name);
    }
    verifier.problems
}

pub(crate) struct Verifier<'a> {
    options: &'a VerifierOptions,
    hierarchy: Hierarchy<'a>,
    problems: ProblemSet,
}

impl<'a> Verifier<'a> {
    fn new(classpath: &'a dyn Resolver, options: &'a VerifierOptions) -> Self {
        Verifier {
            options,
            hierarchy: Hierarchy::new(classpath),
            problems: ProblemSet::new(),
        }
    }

    fn report(&mut self, problem: Problem, location: &ProblemLocation) {
        trace!(%problem, %location, "problem");
        self.problems.add(problem, location.clone());
    }

    /// Reports a class that is absent or unreadable, honouring ignored packages.
    fn report_unresolved(
        &mut self,
        unresolved: Unresolved,
        location: &ProblemLocation,
        missing: impl FnOnce(ClassName) -> Problem,
    ) {
        match unresolved.error {
            Some(err) => self.report(
                Problem::FailedToReadClass {
                    class: unresolved.class,
                    reason: err.to_string(),
                },
                location,
            ),
            None if self.options.is_ignored(unresolved.class.as_str()) => {}
            None => self.report(missing(unresolved.class), location),
        }
    }

    fn class_not_found(&mut self, unresolved: Unresolved, location: &ProblemLocation) {
        self.report_unresolved(unresolved, location, |class| Problem::ClassNotFound { class });
    }

    /// Loads `name`, reporting it at `location` when it cannot be loaded.
    fn require_class(
        &mut self,
        name: &ClassName,
        location: &ProblemLocation,
        missing: impl FnOnce(ClassName) -> Problem,
    ) -> Option<Arc<ClassDefinition>> {
        let error = match self.hierarchy.lookup(name) {
            Lookup::Found(definition) => return Some(definition),
            Lookup::Missing => None,
            Lookup::Unreadable(err) => Some(err),
        };
        self.report_unresolved(
            Unresolved {
                class: name.clone(),
                error,
            },
            location,
            missing,
        );
        None
    }

    fn require_type(&mut self, name: &ClassName, location: &ProblemLocation) -> Option<Arc<ClassDefinition>> {
        self.require_class(name, location, |class| Problem::ClassNotFound { class })
    }

    fn check_class_access(
        &mut self,
        accessor: &ClassDefinition,
        target: &ClassDefinition,
        location: &ProblemLocation,
    ) {
        if !access::class_accessible(accessor, target) {
            self.report(
                Problem::IllegalClassAccess {
                    class: target.name().clone(),
                    visibility: Visibility::PackagePrivate,
                },
                location,
            );
        }
    }

    fn verify_class(&mut self, plugin_classes: &dyn Resolver, name: &ClassName) {
        let location = ProblemLocation::class(name);
        let class = match plugin_classes.find(name) {
            Ok(Some(class)) => class,
            Ok(None) => return,
            Err(err) => {
                debug!(class = %name, %err, "skipping unreadable plugin class");
                self.report(
                    Problem::FailedToReadClass {
                        class: name.clone(),
                        reason: err.to_string(),
                    },
                    &location,
                );
                return;
            }
        };
        trace!(class = %name, "verifying class");

        self.check_supertypes(&class, &location);
        if self.options.check_generic_signatures {
            for referenced in &class.signature_classes {
                self.check_signature_class(referenced, &location);
            }
        }
        self.check_fields(&class);
        for method in class.methods() {
            self.check_method(&class, method);
        }
        if self.options.check_method_implementation {
            self.check_abstract_methods_implemented(&class, &location);
        }
    }

    fn check_signature_class(&mut self, referenced: &ClassName, location: &ProblemLocation) {
        if let Some(element) = referenced.element_class() {
            self.require_type(&element, location);
        }
    }

    fn check_supertypes(&mut self, class: &Arc<ClassDefinition>, location: &ProblemLocation) {
        if let Some(super_name) = class.super_name() {
            let superclass = self.require_class(super_name, location, |missing| {
                Problem::SuperClassNotFound {
                    class: class.name().clone(),
                    missing,
                }
            });
            if let Some(superclass) = superclass {
                if superclass.is_interface() {
                    self.report(
                        Problem::IncompatibleClassChange {
                            class: superclass.name().clone(),
                            change: ClassChange::ClassToInterface,
                        },
                        location,
                    );
                } else if superclass.is_final() {
                    self.report(
                        Problem::InheritFromFinalClass {
                            class: class.name().clone(),
                            superclass: superclass.name().clone(),
                        },
                        location,
                    );
                }
                self.check_class_access(class, &superclass, location);
            }
        }

        for interface_name in class.interfaces() {
            let interface = self.require_class(interface_name, location, |missing| {
                Problem::InterfaceNotFound {
                    class: class.name().clone(),
                    missing,
                }
            });
            if let Some(interface) = interface {
                if !interface.is_interface() {
                    self.report(
                        Problem::IncompatibleClassChange {
                            class: interface.name().clone(),
                            change: ClassChange::InterfaceToClass,
                        },
                        location,
                    );
                }
                self.check_class_access(class, &interface, location);
            }
        }
    }

    fn check_fields(&mut self, class: &Arc<ClassDefinition>) {
        for field in class.fields() {
            let location = ProblemLocation::field(class.name(), field.name(), field.descriptor());
            if let Some(type_name) = field.field_type.element_class() {
                self.require_class(&type_name, &location, |missing| Problem::UnknownTypeField {
                    field: MemberRef::new(class.name().clone(), field.name(), field.descriptor()),
                    missing,
                });
            }
            if self.options.check_generic_signatures {
                for referenced in &field.signature_classes {
                    self.check_signature_class(referenced, &location);
                }
            }
        }
    }

    fn check_method(&mut self, class: &Arc<ClassDefinition>, method: &MethodDefinition) {
        let location = ProblemLocation::method(class.name(), method.name(), method.descriptor());
        for type_name in method.signature_types() {
            self.require_type(&type_name, &location);
        }
        if self.options.check_generic_signatures {
            for referenced in &method.signature_classes {
                self.check_signature_class(referenced, &location);
            }
        }
        self.check_overriding_final(class, method, &location);
        for reference in method.references() {
            self.check_reference(class, reference, &location);
        }
    }

    /// The nearest superclass declaring the same method decides; a final,
    /// overridable declaration there is a linkage error.
    fn check_overriding_final(
        &mut self,
        class: &Arc<ClassDefinition>,
        method: &MethodDefinition,
        location: &ProblemLocation,
    ) {
        if method.is_static() || method.is_private() || method.is_initializer() {
            return;
        }
        let Ok(chain) = self.hierarchy.class_chain(class) else {
            return;
        };
        for ancestor in chain.iter().skip(1) {
            let Some(declared) = ancestor.find_method(method.name(), method.descriptor()) else {
                continue;
            };
            let overridable = match declared.access_flags().visibility() {
                Visibility::Private => false,
                Visibility::PackagePrivate => ancestor.name().same_package(class.name()),
                Visibility::Protected | Visibility::Public => true,
            };
            if overridable && declared.is_final() && !declared.is_static() {
                self.report(
                    Problem::OverridingFinalMethod {
                        method: MemberRef::new(
                            ancestor.name().clone(),
                            declared.name(),
                            declared.descriptor(),
                        ),
                        class: class.name().clone(),
                    },
                    location,
                );
            }
            if overridable {
                return;
            }
        }
    }

    /// A concrete class must have an implementation for every abstract method
    /// it inherits. Skipped when part of the hierarchy cannot be loaded.
    fn check_abstract_methods_implemented(
        &mut self,
        class: &Arc<ClassDefinition>,
        location: &ProblemLocation,
    ) {
        if class.is_abstract() || class.is_interface() {
            return;
        }
        let Ok(chain) = self.hierarchy.class_chain(class) else {
            return;
        };
        let Ok(interfaces) = self.hierarchy.all_superinterfaces(class) else {
            return;
        };

        let mut required: Vec<MemberRef> = Vec::new();
        for declaring in chain.iter().chain(interfaces.iter()) {
            for method in declaring.methods() {
                if method.is_abstract() && !method.is_static() && !method.is_private() {
                    let member = MemberRef::new(declaring.name().clone(), method.name(), method.descriptor());
                    if !required
                        .iter()
                        .any(|r| r.name == member.name && r.descriptor == member.descriptor)
                    {
                        required.push(member);
                    }
                }
            }
        }

        for member in required {
            let from_classes = chain.iter().find_map(|c| {
                c.find_method(&member.name, &member.descriptor)
                    .filter(|m| !m.is_static() && !m.is_private())
            });
            let implemented = match from_classes {
                Some(method) => !method.is_abstract(),
                None => interfaces.iter().any(|i| {
                    i.find_method(&member.name, &member.descriptor)
                        .is_some_and(|m| !m.is_abstract() && !m.is_static() && !m.is_private())
                }),
            };
            if !implemented {
                self.report(
                    Problem::MethodNotImplemented {
                        method: member,
                        class: class.name().clone(),
                    },
                    location,
                );
            }
        }
    }
}
