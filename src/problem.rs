//! Compatibility problems found while verifying a plugin.
//!
//! A [`Problem`] is identified by its kind and structured fields; the
//! human-readable description is derived and never takes part in equality.
//! Where a problem was seen is tracked separately, see [`ProblemSet`].

use std::fmt::{self, Display};

use serde::Serialize;

use crate::{
    consts::Visibility,
    definition::{FieldInstruction, Invocation},
    name::ClassName,
};

mod location;
mod set;

pub use location::ProblemLocation;
pub use set::ProblemSet;

/// Symbolic reference to a field or method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MemberRef {
    pub owner: ClassName,
    pub name: String,
    pub descriptor: String,
}

impl MemberRef {
    pub fn new(owner: ClassName, name: &str, descriptor: &str) -> Self {
        MemberRef {
            owner,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }
}

impl Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner, self.name)?;
        if self.descriptor.starts_with('(') {
            f.write_str(&self.descriptor)
        } else {
            write!(f, " : {}", self.descriptor)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClassChange {
    /// Expected a class, found an interface.
    ClassToInterface,
    /// Expected an interface, found a class.
    InterfaceToClass,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind")]
pub enum Problem {
    ClassNotFound {
        class: ClassName,
    },
    MethodNotFound {
        method: MemberRef,
        invocation: Invocation,
    },
    FieldNotFound {
        field: MemberRef,
        instruction: FieldInstruction,
    },
    SuperClassNotFound {
        class: ClassName,
        missing: ClassName,
    },
    InterfaceNotFound {
        class: ClassName,
        missing: ClassName,
    },
    UnknownTypeField {
        field: MemberRef,
        missing: ClassName,
    },
    IncompatibleClassChange {
        class: ClassName,
        change: ClassChange,
    },
    InheritFromFinalClass {
        class: ClassName,
        superclass: ClassName,
    },
    IllegalClassAccess {
        class: ClassName,
        visibility: Visibility,
    },
    AbstractClassInstantiation {
        class: ClassName,
    },
    InterfaceInstantiation {
        class: ClassName,
    },
    OverridingFinalMethod {
        method: MemberRef,
        class: ClassName,
    },
    InvokeStaticOnInstanceMethod {
        method: MemberRef,
    },
    InvokeInstanceOnStaticMethod {
        method: MemberRef,
        invocation: Invocation,
    },
    InvokeInterfaceOnPrivateMethod {
        method: MemberRef,
    },
    AbstractMethodInvocation {
        method: MemberRef,
    },
    IllegalFieldAccess {
        field: MemberRef,
        visibility: Visibility,
    },
    IllegalMethodAccess {
        method: MemberRef,
        visibility: Visibility,
    },
    StaticAccessOfInstanceField {
        field: MemberRef,
        instruction: FieldInstruction,
    },
    InstanceAccessOfStaticField {
        field: MemberRef,
        instruction: FieldInstruction,
    },
    ChangeFinalField {
        field: MemberRef,
    },
    MethodNotImplemented {
        method: MemberRef,
        class: ClassName,
    },
    FailedToReadClass {
        class: ClassName,
        reason: String,
    },
    MissingDependency {
        dependency: String,
    },
    CyclicDependency {
        cycle: Vec<String>,
    },
    UnreadablePluginClasses {
        reason: String,
    },
}

impl Problem {
    /// Stable tag, identical to the serialized `kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            Problem::ClassNotFound { .. } => "ClassNotFound",
            Problem::MethodNotFound { .. } => "MethodNotFound",
            Problem::FieldNotFound { .. } => "FieldNotFound",
            Problem::SuperClassNotFound { .. } => "SuperClassNotFound",
            Problem::InterfaceNotFound { .. } => "InterfaceNotFound",
            Problem::UnknownTypeField { .. } => "UnknownTypeField",
            Problem::IncompatibleClassChange { .. } => "IncompatibleClassChange",
            Problem::InheritFromFinalClass { .. } => "InheritFromFinalClass",
            Problem::IllegalClassAccess { .. } => "IllegalClassAccess",
            Problem::AbstractClassInstantiation { .. } => "AbstractClassInstantiation",
            Problem::InterfaceInstantiation { .. } => "InterfaceInstantiation",
            Problem::OverridingFinalMethod { .. } => "OverridingFinalMethod",
            Problem::InvokeStaticOnInstanceMethod { .. } => "InvokeStaticOnInstanceMethod",
            Problem::InvokeInstanceOnStaticMethod { .. } => "InvokeInstanceOnStaticMethod",
            Problem::InvokeInterfaceOnPrivateMethod { .. } => "InvokeInterfaceOnPrivateMethod",
            Problem::AbstractMethodInvocation { .. } => "AbstractMethodInvocation",
            Problem::IllegalFieldAccess { .. } => "IllegalFieldAccess",
            Problem::IllegalMethodAccess { .. } => "IllegalMethodAccess",
            Problem::StaticAccessOfInstanceField { .. } => "StaticAccessOfInstanceField",
            Problem::InstanceAccessOfStaticField { .. } => "InstanceAccessOfStaticField",
            Problem::ChangeFinalField { .. } => "ChangeFinalField",
            Problem::MethodNotImplemented { .. } => "MethodNotImplemented",
            Problem::FailedToReadClass { .. } => "FailedToReadClass",
            Problem::MissingDependency { .. } => "MissingDependency",
            Problem::CyclicDependency { .. } => "CyclicDependency",
            Problem::UnreadablePluginClasses { .. } => "UnreadablePluginClasses",
        }
    }

    pub fn description(&self) -> String {
        self.to_string()
    }

    /// Problems that concern the plugin as a whole rather than one of its classes.
    pub fn is_plugin_level(&self) -> bool {
        matches!(
            self,
            Problem::MissingDependency { .. }
                | Problem::CyclicDependency { .. }
                | Problem::UnreadablePluginClasses { .. }
        )
    }
}

impl Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Problem::ClassNotFound { class } => write!(f, "class {class} is not found"),
            Problem::MethodNotFound { method, invocation } => write!(
                f,
                "method {method} is not found ({})",
                invocation.instruction()
            ),
            Problem::FieldNotFound { field, instruction } => write!(
                f,
                "field {field} is not found ({})",
                instruction.instruction()
            ),
            Problem::SuperClassNotFound { class, missing } => {
                write!(f, "superclass {missing} of {class} is not found")
            }
            Problem::InterfaceNotFound { class, missing } => {
                write!(f, "interface {missing} implemented by {class} is not found")
            }
            Problem::UnknownTypeField { field, missing } => {
                write!(f, "type {missing} of field {field} is not found")
            }
            Problem::IncompatibleClassChange { class, change } => match change {
                ClassChange::ClassToInterface => {
                    write!(f, "{class} is expected to be a class but is an interface")
                }
                ClassChange::InterfaceToClass => {
                    write!(f, "{class} is expected to be an interface but is a class")
                }
            },
            Problem::InheritFromFinalClass { class, superclass } => {
                write!(f, "{class} inherits from final class {superclass}")
            }
            Problem::IllegalClassAccess { class, visibility } => {
                write!(f, "{visibility} class {class} is not accessible")
            }
            Problem::AbstractClassInstantiation { class } => {
                write!(f, "abstract class {class} is instantiated")
            }
            Problem::InterfaceInstantiation { class } => {
                write!(f, "interface {class} is instantiated")
            }
            Problem::OverridingFinalMethod { method, class } => {
                write!(f, "{class} overrides final method {method}")
            }
            Problem::InvokeStaticOnInstanceMethod { method } => {
                write!(f, "invokestatic on instance method {method}")
            }
            Problem::InvokeInstanceOnStaticMethod { method, invocation } => {
                write!(f, "{} on static method {method}", invocation.instruction())
            }
            Problem::InvokeInterfaceOnPrivateMethod { method } => {
                write!(f, "invokeinterface on private method {method}")
            }
            Problem::AbstractMethodInvocation { method } => {
                write!(f, "invokespecial on abstract method {method}")
            }
            Problem::IllegalFieldAccess { field, visibility } => {
                write!(f, "{visibility} field {field} is not accessible")
            }
            Problem::IllegalMethodAccess { method, visibility } => {
                write!(f, "{visibility} method {method} is not accessible")
            }
            Problem::StaticAccessOfInstanceField { field, instruction } => write!(
                f,
                "{} on instance field {field}",
                instruction.instruction()
            ),
            Problem::InstanceAccessOfStaticField { field, instruction } => write!(
                f,
                "{} on static field {field}",
                instruction.instruction()
            ),
            Problem::ChangeFinalField { field } => {
                write!(f, "final field {field} is modified")
            }
            Problem::MethodNotImplemented { method, class } => {
                write!(f, "concrete class {class} does not implement {method}")
            }
            Problem::FailedToReadClass { class, reason } => {
                write!(f, "class {class} cannot be read: {reason}")
            }
            Problem::MissingDependency { dependency } => {
                write!(f, "dependency {dependency} is not resolved")
            }
            Problem::CyclicDependency { cycle } => {
                write!(f, "cyclic plugin dependency: {}", cycle.join(" -> "))
            }
            Problem::UnreadablePluginClasses { reason } => {
                write!(f, "plugin classes cannot be read: {reason}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_ignores_description() {
        let a = Problem::ClassNotFound {
            class: ClassName::new("com/example/Gone"),
        };
        let b = Problem::ClassNotFound {
            class: ClassName::new("com.example.Gone"),
        };
        let c = Problem::ClassNotFound {
            class: ClassName::new("com/example/Other"),
        };
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.kind(), "ClassNotFound");
        assert_eq!(a.description(), "class com.example.Gone is not found");
    }

    #[test]
    fn test_serialized_kind_matches_tag() {
        let problem = Problem::MethodNotFound {
            method: MemberRef::new(ClassName::new("com/example/R"), "foo", "()V"),
            invocation: Invocation::Virtual,
        };
        let json = serde_json::to_value(&problem).unwrap();
        assert_eq!(json["kind"], problem.kind());
        assert_eq!(json["method"]["owner"], "com/example/R");
        assert_eq!(json["invocation"], "virtual");
        assert_eq!(
            problem.description(),
            "method com.example.R.foo()V is not found (invokevirtual)"
        );
    }

    #[test]
    fn test_incompatible_change_tag() {
        let problem = Problem::IncompatibleClassChange {
            class: ClassName::new("a/B"),
            change: ClassChange::ClassToInterface,
        };
        let json = serde_json::to_value(&problem).unwrap();
        assert_eq!(json["change"], "CLASS_TO_INTERFACE");
    }
}
