use std::{io, path::PathBuf};

use crate::name::ClassName;

/// A classfile that exists but cannot be turned into a definition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassReadError {
    #[error("malformed class file: {kind} at offset {offset}")]
    Malformed { kind: String, offset: usize },

    #[error("class file is truncated")]
    Truncated,

    #[error("invalid constant pool reference #{index}: expected {expected}")]
    ConstantPool { index: u16, expected: &'static str },

    #[error("invalid descriptor `{0}`")]
    Descriptor(String),

    #[error("malformed bytecode in {method}: {reason}")]
    Bytecode { method: String, reason: String },

    #[error("class file declares {found} but was looked up as {expected}")]
    NameMismatch { expected: ClassName, found: ClassName },

    #[error("cannot read class bytes: {0}")]
    Io(String),
}

impl ClassReadError {
    pub(crate) fn from_nom(total: usize, err: nom::Err<nom::error::Error<&[u8]>>) -> Self {
        match err {
            nom::Err::Incomplete(_) => ClassReadError::Truncated,
            nom::Err::Error(e) | nom::Err::Failure(e) => {
                if e.code == nom::error::ErrorKind::Eof && e.input.is_empty() {
                    return ClassReadError::Truncated;
                }
                ClassReadError::Malformed {
                    kind: format!("{:?}", e.code),
                    offset: total - e.input.len(),
                }
            }
        }
    }
}

/// Failure to build a class source from a container.
#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot open archive {moniker}: {source}")]
    Zip {
        moniker: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("{0} is neither a class archive nor a plugin directory")]
    UnsupportedLayout(PathBuf),
}

/// Fatal failure while computing a dependency closure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClosureError {
    #[error("cyclic plugin dependency: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },
}

/// Conditions that make the effective classpath of a pair unbuildable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error(transparent)]
    Closure(#[from] ClosureError),

    #[error("plugin {plugin} has no readable classes: {reason}")]
    UnreadablePlugin { plugin: String, reason: String },

    #[error("verification cancelled")]
    Cancelled,
}
