// src/core/clustering/prompt.rs
use tera::{Context, Tera};

use crate::error::Result;

const TEMPLATE_NAME: &str = "cluster_prompt.txt";

const CLUSTER_PROMPT_TEMPLATE: &str = r#"You are an expert software architect. Group the following code components into cohesive modules that reflect how the {% if module_name %}module `{{ module_name }}`{% else %}repository{% endif %} is organised.
{% if tree_json %}
The module tree built so far is shown below. Only subdivide the module `{{ module_name }}`; do not repeat or rename other modules.

<MODULE_TREE>
{{ tree_json }}
</MODULE_TREE>
{% endif %}
Components, grouped by file:

<POTENTIAL_CORE_COMPONENTS>
{{ listing }}</POTENTIAL_CORE_COMPONENTS>

Rules:
- Propose at least two modules; a single module is not a useful split.
- Every component id must be copied exactly as listed above.
- A component may appear in more than one module only if it truly belongs to both.
- Module names should be short and lowercase, using underscores instead of spaces.

Reply with a mapping literal between the markers, in exactly this shape:
{% raw %}
<GROUPED_COMPONENTS>
{
    "module_name": {
        "description": "what this module is responsible for",
        "path": ["parent_module", "module_name"],
        "components": ["component.id.One", "component.id.Two"]
    }
}
</GROUPED_COMPONENTS>
{% endraw %}"#;

/// Renders grouping requests for the oracle
pub struct ClusterPrompt {
    tera: Tera,
}

impl ClusterPrompt {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, CLUSTER_PROMPT_TEMPLATE)?;
        tera.autoescape_on(vec![]);
        Ok(Self { tera })
    }

    /// Build the prompt for one candidate set. `tree_json` and `module_name`
    /// are given when subdividing an existing module.
    pub fn render(&self, listing: &str, tree_json: Option<&str>, module_name: Option<&str>) -> Result<String> {
        let mut context = Context::new();
        context.insert("listing", listing);
        context.insert("tree_json", &tree_json);
        context.insert("module_name", &module_name);
        Ok(self.tera.render(TEMPLATE_NAME, &context)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_prompt() {
        let prompt = ClusterPrompt::new().unwrap();
        let text = prompt.render("# a.py\n\ta.A\n", None, None).unwrap();

        assert!(text.contains("organised"));
        assert!(text.contains("repository"));
        assert!(text.contains("\ta.A\n"));
        assert!(!text.contains("<MODULE_TREE>"));
        assert!(text.contains("<GROUPED_COMPONENTS>"));
        assert!(text.contains("\"components\": [\"component.id.One\""));
    }

    #[test]
    fn test_module_prompt_includes_tree() {
        let prompt = ClusterPrompt::new().unwrap();
        let text = prompt
            .render("# a.py\n\ta.A\n", Some("{\"core\": {}}"), Some("core"))
            .unwrap();

        assert!(text.contains("module `core`"));
        assert!(text.contains("<MODULE_TREE>\n{\"core\": {}}\n</MODULE_TREE>"));
    }
}
