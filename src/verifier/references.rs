//! Checks for the symbolic references a method body makes.

use std::sync::Arc;

use crate::{
    definition::{
        ClassDefinition, FieldReference, Invocation, MethodReference, Reference, TypeReference,
        TypeUsage,
    },
    name::ClassName,
    problem::{ClassChange, MemberRef, Problem, ProblemLocation},
    verifier::{
        Verifier, access,
        hierarchy::{Resolution, ResolvedField, ResolvedMethod},
    },
};

impl Verifier<'_> {
    pub(super) fn check_reference(
        &mut self,
        class: &Arc<ClassDefinition>,
        reference: &Reference,
        location: &ProblemLocation,
    ) {
        match reference {
            Reference::Type(reference) => self.check_type_reference(class, reference, location),
            Reference::Method(reference) => self.check_method_reference(class, reference, location),
            Reference::Field(reference) => self.check_field_reference(class, reference, location),
        }
    }

    fn check_type_reference(
        &mut self,
        class: &Arc<ClassDefinition>,
        reference: &TypeReference,
        location: &ProblemLocation,
    ) {
        let Some(element) = reference.class_name.element_class() else {
            return;
        };
        let Some(target) = self.require_type(&element, location) else {
            return;
        };
        if reference.usage.resolves_class_constant() {
            self.check_class_access(class, &target, location);
        }
        if reference.usage == TypeUsage::New {
            if target.is_interface() {
                self.report(
                    Problem::InterfaceInstantiation {
                        class: target.name().clone(),
                    },
                    location,
                );
            } else if target.is_abstract() {
                self.report(
                    Problem::AbstractClassInstantiation {
                        class: target.name().clone(),
                    },
                    location,
                );
            }
        }
    }

    /// Loads the owner of a member reference. Array owners only need their
    /// element class; their members are those of `java/lang/Object`.
    fn member_owner(
        &mut self,
        class: &Arc<ClassDefinition>,
        owner: &ClassName,
        location: &ProblemLocation,
    ) -> Option<Arc<ClassDefinition>> {
        if owner.is_array() {
            if let Some(element) = owner.element_class() {
                self.require_type(&element, location);
            }
            return None;
        }
        let owner = self.require_type(owner, location)?;
        self.check_class_access(class, &owner, location);
        Some(owner)
    }

    fn check_method_reference(
        &mut self,
        class: &Arc<ClassDefinition>,
        reference: &MethodReference,
        location: &ProblemLocation,
    ) {
        let Some(owner) = self.member_owner(class, &reference.owner, location) else {
            return;
        };

        if reference.interface_ref != owner.is_interface() {
            let change = if owner.is_interface() {
                ClassChange::ClassToInterface
            } else {
                ClassChange::InterfaceToClass
            };
            self.report(
                Problem::IncompatibleClassChange {
                    class: owner.name().clone(),
                    change,
                },
                location,
            );
            return;
        }

        let resolution = if owner.is_interface() {
            self.hierarchy
                .resolve_interface_method(&owner, &reference.name, &reference.descriptor)
        } else {
            self.hierarchy
                .resolve_class_method(&owner, &reference.name, &reference.descriptor)
        };
        let resolved = match resolution {
            Resolution::Found(resolved) => resolved,
            Resolution::NotFound => {
                self.report(
                    Problem::MethodNotFound {
                        method: MemberRef::new(reference.owner.clone(), &reference.name, &reference.descriptor),
                        invocation: reference.invocation,
                    },
                    location,
                );
                return;
            }
            Resolution::Incomplete(unresolved) => {
                self.class_not_found(unresolved, location);
                return;
            }
        };
        self.check_resolved_method(class, reference.invocation, &resolved, location);
    }

    fn check_resolved_method(
        &mut self,
        class: &Arc<ClassDefinition>,
        invocation: Invocation,
        resolved: &ResolvedMethod,
        location: &ProblemLocation,
    ) {
        let method = resolved.method();
        let member = || MemberRef::new(resolved.class.name().clone(), method.name(), method.descriptor());

        match invocation {
            Invocation::Static if !method.is_static() => {
                self.report(Problem::InvokeStaticOnInstanceMethod { method: member() }, location);
            }
            Invocation::Virtual | Invocation::Special | Invocation::Interface if method.is_static() => {
                self.report(
                    Problem::InvokeInstanceOnStaticMethod {
                        method: member(),
                        invocation,
                    },
                    location,
                );
            }
            Invocation::Interface if method.is_private() => {
                self.report(Problem::InvokeInterfaceOnPrivateMethod { method: member() }, location);
            }
            Invocation::Special if method.is_abstract() => {
                self.report(Problem::AbstractMethodInvocation { method: member() }, location);
            }
            _ => {}
        }

        let visibility = method.access_flags().visibility();
        if !access::member_accessible(&self.hierarchy, class, &resolved.class, visibility) {
            self.report(
                Problem::IllegalMethodAccess {
                    method: member(),
                    visibility,
                },
                location,
            );
        }
    }

    fn check_field_reference(
        &mut self,
        class: &Arc<ClassDefinition>,
        reference: &FieldReference,
        location: &ProblemLocation,
    ) {
        let Some(owner) = self.member_owner(class, &reference.owner, location) else {
            return;
        };
        let resolved = match self
            .hierarchy
            .resolve_field(&owner, &reference.name, &reference.descriptor)
        {
            Resolution::Found(resolved) => resolved,
            Resolution::NotFound => {
                self.report(
                    Problem::FieldNotFound {
                        field: MemberRef::new(reference.owner.clone(), &reference.name, &reference.descriptor),
                        instruction: reference.instruction,
                    },
                    location,
                );
                return;
            }
            Resolution::Incomplete(unresolved) => {
                self.class_not_found(unresolved, location);
                return;
            }
        };
        self.check_resolved_field(class, reference, &resolved, location);
    }

    fn check_resolved_field(
        &mut self,
        class: &Arc<ClassDefinition>,
        reference: &FieldReference,
        resolved: &ResolvedField,
        location: &ProblemLocation,
    ) {
        let field = resolved.field();
        let member = || MemberRef::new(resolved.class.name().clone(), field.name(), field.descriptor());
        let instruction = reference.instruction;

        if instruction.is_static() && !field.is_static() {
            self.report(
                Problem::StaticAccessOfInstanceField {
                    field: member(),
                    instruction,
                },
                location,
            );
        } else if !instruction.is_static() && field.is_static() {
            self.report(
                Problem::InstanceAccessOfStaticField {
                    field: member(),
                    instruction,
                },
                location,
            );
        }

        // final fields may only be assigned by their declaring class
        if instruction.is_put() && field.is_final() && resolved.class.name() != class.name() {
            self.report(Problem::ChangeFinalField { field: member() }, location);
        }

        let visibility = field.access_flags().visibility();
        if !access::member_accessible(&self.hierarchy, class, &resolved.class, visibility) {
            self.report(
                Problem::IllegalFieldAccess {
                    field: member(),
                    visibility,
                },
                location,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        consts::Visibility,
        definition::{FieldInstruction, Invocation},
        name::ClassName,
        options::VerifierOptions,
        problem::{ClassChange, MemberRef, Problem, ProblemSet},
        resolver::UnionResolver,
        test_support::{
            ABSTRACT, ClassBuilder, FINAL, Handle, INTERFACE, Insn, NATIVE, PRIVATE, PROTECTED,
            PUBLIC, STATIC, SUPER, classes, runtime_library,
        },
        verifier::verify_plugin_classes,
    };

    const VARARGS: u16 = 0x0080;

    fn verify(plugin: Vec<ClassBuilder>, library: Vec<ClassBuilder>) -> ProblemSet {
        let plugin = classes("plugin", plugin);
        let classpath = UnionResolver::of([plugin.clone(), classes("lib", library), runtime_library()]);
        verify_plugin_classes(plugin.as_ref(), classpath.as_ref(), &VerifierOptions::default())
    }

    fn member(owner: &str, name: &str, descriptor: &str) -> MemberRef {
        MemberRef::new(ClassName::new(owner), name, descriptor)
    }

    fn call(insn: fn(String, String, String) -> Insn, owner: &str, name: &str, descriptor: &str) -> Insn {
        insn(owner.to_string(), name.to_string(), descriptor.to_string())
    }

    fn library() -> Vec<ClassBuilder> {
        vec![
            ClassBuilder::new("lib/Util")
                .method(PUBLIC | STATIC, "helper", "()V", vec![])
                .method(PUBLIC, "instance", "()V", vec![])
                .method(PRIVATE, "secret", "()V", vec![]),
            ClassBuilder::new("lib/Api")
                .access(PUBLIC | INTERFACE | ABSTRACT)
                .method(PUBLIC | ABSTRACT, "run", "()V", vec![])
                .method(PRIVATE, "hidden", "()V", vec![]),
            ClassBuilder::new("lib/Shape")
                .access(PUBLIC | SUPER | ABSTRACT)
                .method(PUBLIC, "<init>", "()V", vec![])
                .method(PUBLIC | ABSTRACT, "area", "()D", vec![]),
            ClassBuilder::new("lib/Config")
                .field(PUBLIC | STATIC | FINAL, "LIMIT", "I")
                .field(PUBLIC, "name", "Ljava/lang/String;")
                .field(PRIVATE, "token", "Ljava/lang/String;")
                .field(PROTECTED, "shared", "I")
                .field(PUBLIC | FINAL, "id", "J"),
            ClassBuilder::new("lib/Child").super_class("lib/Parent"),
            ClassBuilder::new("java/lang/invoke/MethodHandle").method(
                PUBLIC | FINAL | NATIVE | VARARGS,
                "invokeExact",
                "([Ljava/lang/Object;)Ljava/lang/Object;",
                vec![],
            ),
            ClassBuilder::new("java/lang/invoke/LambdaMetafactory").method(
                PUBLIC | STATIC,
                "metafactory",
                "()Ljava/lang/invoke/CallSite;",
                vec![],
            ),
        ]
    }

    #[test]
    fn test_invocation_kind_mismatches() {
        let problems = verify(
            vec![ClassBuilder::new("p/Main").method(
                PUBLIC,
                "run",
                "()V",
                vec![
                    call(Insn::InvokeStatic, "lib/Util", "instance", "()V"),
                    call(Insn::InvokeVirtual, "lib/Util", "helper", "()V"),
                    call(Insn::InvokeVirtual, "lib/Util", "secret", "()V"),
                    call(Insn::InvokeInterface, "lib/Api", "hidden", "()V"),
                ],
            )],
            library(),
        );
        assert!(problems.contains(&Problem::InvokeStaticOnInstanceMethod {
            method: member("lib/Util", "instance", "()V"),
        }));
        assert!(problems.contains(&Problem::InvokeInstanceOnStaticMethod {
            method: member("lib/Util", "helper", "()V"),
            invocation: Invocation::Virtual,
        }));
        assert!(problems.contains(&Problem::IllegalMethodAccess {
            method: member("lib/Util", "secret", "()V"),
            visibility: Visibility::Private,
        }));
        assert!(problems.contains(&Problem::InvokeInterfaceOnPrivateMethod {
            method: member("lib/Api", "hidden", "()V"),
        }));
        assert!(problems.contains(&Problem::IllegalMethodAccess {
            method: member("lib/Api", "hidden", "()V"),
            visibility: Visibility::Private,
        }));
        assert_eq!(problems.len(), 5);
    }

    #[test]
    fn test_owner_kind_must_match_constant_kind() {
        let problems = verify(
            vec![ClassBuilder::new("p/Main").method(
                PUBLIC,
                "run",
                "()V",
                vec![
                    Insn::Invoke {
                        opcode: 0xb6,
                        owner: "lib/Api".into(),
                        name: "run".into(),
                        descriptor: "()V".into(),
                        interface_ref: false,
                    },
                    call(Insn::InvokeInterface, "lib/Util", "instance", "()V"),
                ],
            )],
            library(),
        );
        assert!(problems.contains(&Problem::IncompatibleClassChange {
            class: ClassName::new("lib/Api"),
            change: ClassChange::ClassToInterface,
        }));
        assert!(problems.contains(&Problem::IncompatibleClassChange {
            class: ClassName::new("lib/Util"),
            change: ClassChange::InterfaceToClass,
        }));
        assert_eq!(problems.len(), 2);
    }

    #[test]
    fn test_abstract_invocation_and_instantiation() {
        let problems = verify(
            vec![
                ClassBuilder::new("p/Square").super_class("lib/Shape").method(
                    PUBLIC,
                    "area",
                    "()D",
                    vec![call(Insn::InvokeSpecial, "lib/Shape", "area", "()D")],
                ),
                ClassBuilder::new("p/Main").method(
                    PUBLIC | STATIC,
                    "main",
                    "()V",
                    vec![Insn::New("lib/Shape".into()), Insn::New("lib/Api".into())],
                ),
            ],
            library(),
        );
        assert!(problems.contains(&Problem::AbstractMethodInvocation {
            method: member("lib/Shape", "area", "()D"),
        }));
        assert!(problems.contains(&Problem::AbstractClassInstantiation {
            class: ClassName::new("lib/Shape"),
        }));
        assert!(problems.contains(&Problem::InterfaceInstantiation {
            class: ClassName::new("lib/Api"),
        }));
        assert_eq!(problems.len(), 3);
    }

    #[test]
    fn test_field_checks() {
        let problems = verify(
            vec![ClassBuilder::new("p/Main").method(
                PUBLIC,
                "run",
                "()V",
                vec![
                    call(Insn::GetField, "lib/Config", "LIMIT", "I"),
                    call(Insn::GetStatic, "lib/Config", "name", "Ljava/lang/String;"),
                    call(Insn::PutStatic, "lib/Config", "LIMIT", "I"),
                    call(Insn::GetField, "lib/Config", "token", "Ljava/lang/String;"),
                    call(Insn::GetField, "lib/Config", "missing", "J"),
                    call(Insn::GetField, "lib/Config", "shared", "I"),
                ],
            )],
            library(),
        );
        assert!(problems.contains(&Problem::InstanceAccessOfStaticField {
            field: member("lib/Config", "LIMIT", "I"),
            instruction: FieldInstruction::GetField,
        }));
        assert!(problems.contains(&Problem::StaticAccessOfInstanceField {
            field: member("lib/Config", "name", "Ljava/lang/String;"),
            instruction: FieldInstruction::GetStatic,
        }));
        assert!(problems.contains(&Problem::ChangeFinalField {
            field: member("lib/Config", "LIMIT", "I"),
        }));
        assert!(problems.contains(&Problem::IllegalFieldAccess {
            field: member("lib/Config", "token", "Ljava/lang/String;"),
            visibility: Visibility::Private,
        }));
        assert!(problems.contains(&Problem::FieldNotFound {
            field: member("lib/Config", "missing", "J"),
            instruction: FieldInstruction::GetField,
        }));
        assert!(problems.contains(&Problem::IllegalFieldAccess {
            field: member("lib/Config", "shared", "I"),
            visibility: Visibility::Protected,
        }));
        assert_eq!(problems.len(), 6);
    }

    #[test]
    fn test_instance_field_writes() {
        let problems = verify(
            vec![ClassBuilder::new("p/Main").method(
                PUBLIC,
                "run",
                "()V",
                vec![
                    call(Insn::PutField, "lib/Config", "id", "J"),
                    call(Insn::PutField, "lib/Config", "name", "Ljava/lang/String;"),
                    call(Insn::PutField, "lib/Config", "LIMIT", "I"),
                ],
            )],
            library(),
        );
        assert!(problems.contains(&Problem::ChangeFinalField {
            field: member("lib/Config", "id", "J"),
        }));
        assert!(problems.contains(&Problem::InstanceAccessOfStaticField {
            field: member("lib/Config", "LIMIT", "I"),
            instruction: FieldInstruction::PutField,
        }));
        assert!(problems.contains(&Problem::ChangeFinalField {
            field: member("lib/Config", "LIMIT", "I"),
        }));
        assert_eq!(problems.len(), 3);
    }

    #[test]
    fn test_final_field_written_by_declaring_class() {
        let problems = verify(
            vec![ClassBuilder::new("p/Point")
                .field(PRIVATE | FINAL, "x", "I")
                .method(
                    PUBLIC,
                    "<init>",
                    "()V",
                    vec![call(Insn::PutField, "p/Point", "x", "I")],
                )],
            vec![],
        );
        assert!(problems.is_empty());
    }

    #[test]
    fn test_missing_classes_in_type_instructions() {
        let problems = verify(
            vec![ClassBuilder::new("p/Main").method(
                PUBLIC,
                "run",
                "()V",
                vec![
                    Insn::InstanceOf("q/Kind".into()),
                    Insn::MultiNewArray("[[Lq/Grid;".into(), 2),
                    Insn::LdcClass("q/Literal".into()),
                    Insn::MultiNewArray("[[I".into(), 2),
                    Insn::InstanceOf("lib/Util".into()),
                ],
            )],
            library(),
        );
        for missing in ["q/Kind", "q/Grid", "q/Literal"] {
            assert!(
                problems.contains(&Problem::ClassNotFound {
                    class: ClassName::new(missing)
                }),
                "{missing} not reported"
            );
        }
        assert_eq!(problems.len(), 3);
    }

    #[test]
    fn test_missing_classes_in_references() {
        let problems = verify(
            vec![ClassBuilder::new("p/Main").method(
                PUBLIC,
                "run",
                "()V",
                vec![
                    Insn::CheckCast("q/Gone".into()),
                    call(Insn::InvokeStatic, "q/Other", "make", "()V"),
                    call(Insn::InvokeVirtual, "[Lq/Element;", "clone", "()Ljava/lang/Object;"),
                    call(Insn::InvokeVirtual, "[I", "clone", "()Ljava/lang/Object;"),
                    call(Insn::InvokeVirtual, "lib/Child", "inherited", "()V"),
                ],
            )],
            library(),
        );
        for missing in ["q/Gone", "q/Other", "q/Element", "lib/Parent"] {
            assert!(
                problems.contains(&Problem::ClassNotFound {
                    class: ClassName::new(missing)
                }),
                "{missing} not reported"
            );
        }
        assert_eq!(problems.len(), 4);
    }

    #[test]
    fn test_invokedynamic_handles() {
        let handle = |kind, owner: &str, name: &str, descriptor: &str| Handle {
            kind,
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            interface: false,
        };
        let problems = verify(
            vec![ClassBuilder::new("p/Main").method(
                PUBLIC,
                "run",
                "()V",
                vec![
                    Insn::InvokeDynamic(
                        handle(
                            6,
                            "java/lang/invoke/LambdaMetafactory",
                            "metafactory",
                            "()Ljava/lang/invoke/CallSite;",
                        ),
                        vec![handle(5, "lib/Util", "gone", "()V")],
                    ),
                    call(
                        Insn::InvokeVirtual,
                        "java/lang/invoke/MethodHandle",
                        "invokeExact",
                        "(Ljava/lang/String;)V",
                    ),
                ],
            )],
            library(),
        );
        assert_eq!(problems.len(), 1);
        assert!(problems.contains(&Problem::MethodNotFound {
            method: member("lib/Util", "gone", "()V"),
            invocation: Invocation::Virtual,
        }));
    }

    #[test]
    fn test_results_do_not_depend_on_class_order() {
        let plugin = || {
            vec![
                ClassBuilder::new("p/A").super_class("q/Missing"),
                ClassBuilder::new("p/B").method(
                    PUBLIC,
                    "run",
                    "()V",
                    vec![call(Insn::InvokeStatic, "q/Missing", "go", "()V")],
                ),
                ClassBuilder::new("p/C").method(
                    PUBLIC,
                    "run",
                    "()V",
                    vec![Insn::New("q/Missing".into())],
                ),
            ]
        };
        let forward = verify(plugin(), library());
        let mut reversed_classes = plugin();
        reversed_classes.reverse();
        let reversed = verify(reversed_classes, library());

        assert_eq!(forward, reversed);
        assert_eq!(
            forward.iter().collect::<Vec<_>>(),
            reversed.iter().collect::<Vec<_>>()
        );
        let missing = Problem::ClassNotFound {
            class: ClassName::new("q/Missing"),
        };
        assert_eq!(forward.locations(&missing).map(|l| l.len()), Some(2));
    }
}
