//! Default tool registration: loads the embedded manifest and binds each
//! entry to its built-in implementation, falling back to a stub for any manifest name with none.

use okcvm_deploy::Store as DeployStore;

use crate::builtin::{
    browser_scroll_down_tool, browser_scroll_up_tool, BrowserClickTool, BrowserFindTool,
    BrowserInputTool, BrowserStateTool, BrowserVisitTool, DeployWebsiteTool, EditFileTool,
    GenerateImageTool, GenerateSoundEffectsTool, GenerateSpeechTool, GetAvailableVoicesTool,
    GetDataSourceDescTool, GetDataSourceTool, ImageSearchTool, IpythonTool, ReadFileTool,
    ShellTool, SlidesGeneratorTool, TodoReadTool, TodoWriteTool, WebSearchTool, WriteFileTool,
};
use crate::error::RegistryError;
use crate::registry::{load_manifest, ToolRegistryLocked};
use crate::trait_def::Tool;

/// The manifest this build ships, matching the `mshtools-*` namespace.
pub const DEFAULT_MANIFEST: &str = include_str!("../../spec/tools.json");

fn builtin_for(name: &str, deploy_store: &DeployStore) -> Option<Box<dyn Tool>> {
    match name {
        "mshtools-todo_read" => Some(Box::new(TodoReadTool)),
        "mshtools-todo_write" => Some(Box::new(TodoWriteTool)),
        "mshtools-ipython" => Some(Box::new(IpythonTool)),
        "mshtools-files_read" => Some(Box::new(ReadFileTool)),
        "mshtools-files_write" => Some(Box::new(WriteFileTool)),
        "mshtools-files_edit" => Some(Box::new(EditFileTool)),
        "mshtools-shell" => Some(Box::new(ShellTool)),
        "mshtools-browser_visit" => Some(Box::new(BrowserVisitTool)),
        "mshtools-browser_state" => Some(Box::new(BrowserStateTool)),
        "mshtools-browser_find" => Some(Box::new(BrowserFindTool)),
        "mshtools-browser_click" => Some(Box::new(BrowserClickTool)),
        "mshtools-browser_input" => Some(Box::new(BrowserInputTool)),
        "mshtools-browser_scroll_up" => Some(Box::new(browser_scroll_up_tool())),
        "mshtools-browser_scroll_down" => Some(Box::new(browser_scroll_down_tool())),
        "mshtools-web_search" => Some(Box::new(WebSearchTool)),
        "mshtools-image_search" => Some(Box::new(ImageSearchTool)),
        "mshtools-generate_image" => Some(Box::new(GenerateImageTool)),
        "mshtools-get_available_voices" => Some(Box::new(GetAvailableVoicesTool)),
        "mshtools-generate_speech" => Some(Box::new(GenerateSpeechTool)),
        "mshtools-generate_sound_effects" => Some(Box::new(GenerateSoundEffectsTool)),
        "mshtools-get_data_source_desc" => Some(Box::new(GetDataSourceDescTool)),
        "mshtools-get_data_source" => Some(Box::new(GetDataSourceTool)),
        "mshtools-slides_generator" => Some(Box::new(SlidesGeneratorTool)),
        "mshtools-deploy_website" => Some(Box::new(DeployWebsiteTool::new(deploy_store.clone()))),
        _ => None,
    }
}

/// Registers every manifest entry against [`DEFAULT_MANIFEST`]: a bound implementation where one
/// exists, a failing stub otherwise. A fresh `ToolRegistryLocked` becomes fully usable by an
/// Agent Runtime after one call to this.
pub async fn register_default_tools(
    registry: &ToolRegistryLocked,
    deploy_store: &DeployStore,
) -> Result<(), RegistryError> {
    let specs = load_manifest(DEFAULT_MANIFEST)?;
    for spec in specs {
        match builtin_for(&spec.name, deploy_store) {
            Some(tool) => registry.register(tool).await,
            None => registry.register_stub(spec).await,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn registers_every_manifest_entry() {
        let dir = tempdir().unwrap();
        let store = DeployStore::new(dir.path().join("deployments"));
        let registry = ToolRegistryLocked::new();
        register_default_tools(&registry, &store).await.unwrap();

        let specs = load_manifest(DEFAULT_MANIFEST).unwrap();
        let registered = registry.list().await;
        assert_eq!(registered.len(), specs.len());
    }

    #[tokio::test]
    async fn every_manifest_entry_has_a_bound_implementation() {
        let dir = tempdir().unwrap();
        let store = DeployStore::new(dir.path().join("deployments"));
        let specs = load_manifest(DEFAULT_MANIFEST).unwrap();
        for spec in specs {
            assert!(
                builtin_for(&spec.name, &store).is_some(),
                "manifest entry '{}' has no bound implementation",
                spec.name
            );
        }
    }
}
