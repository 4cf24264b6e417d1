//! Tool Registry and Tool Set: spec validation, name-keyed dispatch, and the
//! built-in `mshtools-*` tool implementations.

pub mod bootstrap;
pub mod builtin;
pub mod context;
pub mod error;
pub mod registry;
pub mod spec;
pub mod trait_def;

pub use bootstrap::{register_default_tools, DEFAULT_MANIFEST};
pub use context::{
    BrowserState, FindMatch, InputElement, IpythonState, PageElement, SessionToolState,
    TodoItem, ToolContext,
};
pub use error::{RegistryError, ToolError};
pub use registry::{load_manifest, AgentToolWrapper, ToolRegistry, ToolRegistryLocked};
pub use spec::{validate_schema, ToolSpec};
pub use trait_def::{StubTool, Tool};
