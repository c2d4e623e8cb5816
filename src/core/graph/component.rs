// src/core/graph/component.rs
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use serde::{Serialize, Deserialize};

/// Kind of code component produced by the structural analyzer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    Function,
    Method,
    Class,
    Interface,
    Struct,
    Enum,
    Record,
    #[serde(alias = "abstract class")]
    AbstractClass,
    Annotation,
    Delegate,
}

impl ComponentType {
    /// Map an analyzer type label onto a component type.
    ///
    /// Unknown labels fall back to `Function`, which is what the analyzers
    /// emit for anything callable they cannot classify further.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().replace(' ', "_").as_str() {
            "method" => Self::Method,
            "class" => Self::Class,
            "interface" => Self::Interface,
            "struct" => Self::Struct,
            "enum" => Self::Enum,
            "record" => Self::Record,
            "abstract_class" => Self::AbstractClass,
            "annotation" => Self::Annotation,
            "delegate" => Self::Delegate,
            _ => Self::Function,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Struct => "struct",
            Self::Enum => "enum",
            Self::Record => "record",
            Self::AbstractClass => "abstract_class",
            Self::Annotation => "annotation",
            Self::Delegate => "delegate",
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single code component in the dependency graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Dotted identifier, e.g. `pkg.sub.ClassName.method`
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub component_type: ComponentType,
    /// Absolute path of the defining file
    pub file_path: PathBuf,
    /// Path relative to the repository root
    pub relative_path: String,
    /// 1-based, inclusive
    pub start_line: usize,
    pub end_line: usize,
    pub source_code: String,
    pub has_docstring: bool,
    pub docstring: String,
    pub parameters: Vec<String>,
    pub base_classes: Option<Vec<String>>,
    pub class_name: Option<String>,
    /// Ids of the components this one references. Never contains `id` itself.
    #[serde(default)]
    pub depends_on: BTreeSet<String>,
}

impl Node {
    /// Module path of the component: its id without the final segment
    pub fn module_path(&self) -> Option<&str> {
        self.id.rsplit_once('.').map(|(module, _)| module).filter(|m| !m.is_empty())
    }

    /// The `<file_path>:<name>` key older analyzer versions used as an id
    pub fn legacy_id(&self) -> String {
        format!("{}:{}", self.file_path.display(), self.name)
    }

    pub fn is_leaf(&self) -> bool {
        self.depends_on.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_type_labels() {
        assert_eq!(ComponentType::from_label("class"), ComponentType::Class);
        assert_eq!(ComponentType::from_label("abstract class"), ComponentType::AbstractClass);
        assert_eq!(ComponentType::from_label("Interface"), ComponentType::Interface);
        assert_eq!(ComponentType::from_label("lambda"), ComponentType::Function);

        let parsed: ComponentType = serde_json::from_str("\"abstract class\"").unwrap();
        assert_eq!(parsed, ComponentType::AbstractClass);
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"abstract_class\"");
    }

    #[test]
    fn test_module_path() {
        let node = Node {
            id: "pkg.sub.Widget.render".to_string(),
            name: "render".to_string(),
            display_name: "Widget.render".to_string(),
            component_type: ComponentType::Method,
            file_path: PathBuf::from("/repo/pkg/sub.py"),
            relative_path: "pkg/sub.py".to_string(),
            start_line: 10,
            end_line: 12,
            source_code: String::new(),
            has_docstring: false,
            docstring: String::new(),
            parameters: vec!["self".to_string()],
            base_classes: None,
            class_name: Some("Widget".to_string()),
            depends_on: BTreeSet::new(),
        };

        assert_eq!(node.module_path(), Some("pkg.sub.Widget"));
        assert_eq!(node.legacy_id(), "/repo/pkg/sub.py:render");
        assert!(node.is_leaf());
    }
}
