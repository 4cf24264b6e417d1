//! Built-in `mshtools-*` tool implementations.

pub mod browser;
pub mod data_sources;
pub mod deploy_website;
pub mod files;
pub mod ipython;
pub mod media;
pub mod search;
pub mod shell;
pub mod slides;
pub mod todo;

pub use browser::{
    browser_scroll_down_tool, browser_scroll_up_tool, BrowserClickTool, BrowserFindTool,
    BrowserInputTool, BrowserStateTool, BrowserVisitTool,
};
pub use data_sources::{GetDataSourceDescTool, GetDataSourceTool};
pub use deploy_website::DeployWebsiteTool;
pub use files::{EditFileTool, ReadFileTool, WriteFileTool};
pub use ipython::IpythonTool;
pub use media::{
    GenerateImageTool, GenerateSoundEffectsTool, GenerateSpeechTool, GetAvailableVoicesTool,
};
pub use search::{ImageSearchTool, WebSearchTool};
pub use shell::ShellTool;
pub use slides::SlidesGeneratorTool;
pub use todo::{TodoReadTool, TodoWriteTool};
