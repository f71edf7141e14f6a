use std::{
    borrow::Borrow,
    fmt::{self, Debug, Display},
    sync::Arc,
};

use crate::descriptor::{FieldDescriptor, FieldType, parse_field_descriptor};

/// Fully qualified class name in binary form (`java/lang/Object`).
///
/// Dotted names are normalized on construction, so `java.lang.Object` and
/// `java/lang/Object` produce equal keys.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassName(Arc<str>);

impl ClassName {
    pub const OBJECT: &'static str = "java/lang/Object";

    pub fn new(name: &str) -> Self {
        if name.contains('.') && !name.starts_with('[') {
            ClassName(Arc::from(name.replace('.', "/")))
        } else {
            ClassName(Arc::from(name))
        }
    }

    /// Name of the `.class` entry holding this class inside an archive or directory.
    pub fn from_entry_path(path: &str) -> Option<Self> {
        let stem = path.strip_suffix(".class")?;
        let stem = stem.strip_prefix('/').unwrap_or(stem);
        let simple = stem.rsplit(['/', '\\']).next().unwrap_or(stem);
        if stem.is_empty() || simple == "module-info" || simple == "package-info" {
            return None;
        }
        // multi-release jars keep overrides under META-INF/versions/<n>/
        if stem.starts_with("META-INF/") {
            return None;
        }
        Some(ClassName::new(&stem.replace('\\', "/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn entry_path(&self) -> String {
        format!("{}.class", self.0)
    }

    pub fn package(&self) -> &str {
        match self.0.rsplit_once('/') {
            Some((package, _)) => package,
            None => "",
        }
    }

    pub fn simple_name(&self) -> &str {
        match self.0.rsplit_once('/') {
            Some((_, simple)) => simple,
            None => &self.0,
        }
    }

    pub fn same_package(&self, other: &ClassName) -> bool {
        self.package() == other.package()
    }

    pub fn to_dotted(&self) -> String {
        self.0.replace('/', ".")
    }

    pub fn is_array(&self) -> bool {
        self.0.starts_with('[')
    }

    pub fn is_object(&self) -> bool {
        &*self.0 == Self::OBJECT
    }

    /// Element class of an array name, the name itself for plain classes, and
    /// `None` for arrays of primitives or malformed array descriptors.
    pub fn element_class(&self) -> Option<ClassName> {
        if !self.is_array() {
            return Some(self.clone());
        }
        let Ok((_, FieldDescriptor(field_type))) = parse_field_descriptor(&self.0) else {
            return None;
        };
        field_type.element_class()
    }
}

impl FieldType {
    /// Class named by this type after stripping array dimensions.
    pub fn element_class(&self) -> Option<ClassName> {
        match self {
            FieldType::Object(name) => Some(ClassName::new(name)),
            FieldType::Array(inner) => inner.element_class(),
            _ => None,
        }
    }
}

impl Borrow<str> for ClassName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClassName {
    fn from(name: &str) -> Self {
        ClassName::new(name)
    }
}

impl From<Arc<str>> for ClassName {
    fn from(name: Arc<str>) -> Self {
        if name.contains('.') && !name.starts_with('[') {
            ClassName::new(&name)
        } else {
            ClassName(name)
        }
    }
}

impl Display for ClassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_dotted())
    }
}

impl Debug for ClassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassName({})", self.0)
    }
}

impl serde::Serialize for ClassName {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}
