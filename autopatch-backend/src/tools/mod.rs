pub mod builtin;
pub mod registry;
pub mod types;

pub use registry::{Tool, ToolRegistry};
pub use types::{
    PropertySchema, ToolContext, ToolDefinition, ToolGroup, ToolInputSchema, ToolResult,
};

use std::sync::Arc;

/// Register all built-in tools to a registry
fn register_all_tools(registry: &mut ToolRegistry) {
    // Recon
    registry.register(Arc::new(builtin::CrawlSiteTool::new()));
    registry.register(Arc::new(builtin::FindFormsTool::new()));
    registry.register(Arc::new(builtin::GetFormFieldsTool::new()));

    // Active probes
    registry.register(Arc::new(builtin::SubmitFormTool::new()));
    registry.register(Arc::new(builtin::XssProbeTool::new()));
    registry.register(Arc::new(builtin::IdorProbeTool::new()));

    // Passive audit
    registry.register(Arc::new(builtin::HeaderCheckTool::new()));
}

/// Create a new ToolRegistry with all built-in tools registered
pub fn create_default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    register_all_tools(&mut registry);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_has_all_browser_tools() {
        let registry = create_default_registry();
        assert_eq!(
            registry.names(),
            vec![
                "crawl_site",
                "find_forms",
                "get_form_fields",
                "header_check",
                "idor_probe",
                "submit_form",
                "xss_probe",
            ]
        );
        for definition in registry.definitions() {
            assert!(definition.input_schema.required.contains(&"url".to_string()));
            assert!(definition.input_schema.properties.contains_key("url"));
        }
    }
}
