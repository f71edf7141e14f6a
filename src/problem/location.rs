use std::fmt::{self, Display};

use serde::Serialize;

use crate::name::ClassName;

/// Where a problem was observed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ProblemLocation {
    Plugin {
        id: String,
    },
    Class {
        name: ClassName,
    },
    Method {
        owner: ClassName,
        name: String,
        descriptor: String,
    },
    Field {
        owner: ClassName,
        name: String,
        descriptor: String,
    },
}

impl ProblemLocation {
    pub fn plugin(id: &str) -> Self {
        ProblemLocation::Plugin { id: id.to_string() }
    }

    pub fn class(name: &ClassName) -> Self {
        ProblemLocation::Class { name: name.clone() }
    }

    pub fn method(owner: &ClassName, name: &str, descriptor: &str) -> Self {
        ProblemLocation::Method {
            owner: owner.clone(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }

    pub fn field(owner: &ClassName, name: &str, descriptor: &str) -> Self {
        ProblemLocation::Field {
            owner: owner.clone(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }

    /// Class the location belongs to; `None` for plugin-level locations.
    pub fn class_name(&self) -> Option<&ClassName> {
        match self {
            ProblemLocation::Plugin { .. } => None,
            ProblemLocation::Class { name } => Some(name),
            ProblemLocation::Method { owner, .. } | ProblemLocation::Field { owner, .. } => Some(owner),
        }
    }
}

impl Display for ProblemLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProblemLocation::Plugin { id } => write!(f, "plugin {id}"),
            ProblemLocation::Class { name } => write!(f, "class {name}"),
            ProblemLocation::Method {
                owner,
                name,
                descriptor,
            } => write!(f, "method {owner}.{name}{descriptor}"),
            ProblemLocation::Field { owner, name, .. } => write!(f, "field {owner}.{name}"),
        }
    }
}
