//! Access control (JVMS 5.4.4).

use std::sync::Arc;

use crate::{
    consts::{ClassAccessFlag, Visibility},
    definition::ClassDefinition,
    verifier::hierarchy::Hierarchy,
};

/// Whether `accessor` may refer to class `target`.
pub(crate) fn class_accessible(accessor: &ClassDefinition, target: &ClassDefinition) -> bool {
    target.access_flags().contains(ClassAccessFlag::PUBLIC)
        || accessor.name().same_package(target.name())
}

/// Whether `accessor` may use a member with `visibility` declared in `declaring`.
///
/// A protected check that needs an unloadable superclass is given the benefit
/// of the doubt.
pub(crate) fn member_accessible(
    hierarchy: &Hierarchy<'_>,
    accessor: &Arc<ClassDefinition>,
    declaring: &ClassDefinition,
    visibility: Visibility,
) -> bool {
    match visibility {
        Visibility::Public => true,
        Visibility::Protected => {
            accessor.name().same_package(declaring.name())
                || hierarchy
                    .is_subclass_of(accessor, declaring.name())
                    .unwrap_or(true)
        }
        Visibility::PackagePrivate => accessor.name().same_package(declaring.name()),
        Visibility::Private => {
            accessor.name() == declaring.name() || accessor.nest_host() == declaring.nest_host()
        }
    }
}
