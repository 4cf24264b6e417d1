//! CLI bootstrap for the OKCVM HTTP Surface: argument parsing, environment-driven
//! configuration, the workspace-path confirmation prompt, and server launch —
//! `--host`/`--port`/`--config`/`--reload`, `confirm_on_start` → prompt-and-exit(1)-on-decline,
//! then start the HTTP server.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use okcvm_agent::{ChatEndpoint, ChatOpenAI, StubChatEndpoint};
use okcvm_config::Configuration;
use okcvm_conversation::Store as ConversationStore;
use okcvm_core::SessionStore;
use okcvm_deploy::Store as DeployStore;
use okcvm_server::{ensure_frontend_dir, run_serve, AppState};
use okcvm_workspace::{WorkspaceManager, WorkspaceManagerConfig};

/// Fallback reply used when no chat endpoint is configured via `OKCVM_CHAT_MODEL`/`_BASE_URL`,
/// so the server still starts in a demoable state rather than refusing to boot.
const NO_MODEL_CONFIGURED_REPLY: &str =
    "No chat model is configured; set OKCVM_CHAT_MODEL and OKCVM_CHAT_BASE_URL.";

#[derive(Parser, Debug)]
#[command(name = "okcvm-server")]
#[command(about = "Starts the OK Computer Virtual Machine server")]
struct Args {
    /// Host to bind the server to.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to run the server on.
    #[arg(short, long, default_value_t = 8000)]
    port: u16,

    /// Directory containing the static frontend assets served under `/ui/`.
    #[arg(long, value_name = "DIR", default_value = "ui")]
    frontend_dir: PathBuf,

    /// Override the `.env` search directory (otherwise the current directory).
    #[arg(short, long, value_name = "DIR")]
    config: Option<PathBuf>,

    /// Accepted for compatibility with the source CLI's `--reload`; this server has no
    /// file-watch/auto-reload of its own and this flag is a no-op here.
    #[arg(long)]
    reload: bool,
}

fn build_chat_endpoint(config: &Configuration) -> Arc<dyn ChatEndpoint> {
    let chat = config.chat_config();
    match (chat.model, chat.base_url) {
        (Some(model), base_url) => Arc::new(ChatOpenAI::new(model, base_url, chat.resolved_api_key())),
        (None, _) => Arc::new(StubChatEndpoint::fixed_reply(NO_MODEL_CONFIGURED_REPLY)),
    }
}

/// Prompts on stdin exactly like `typer.confirm(..., default=False)`: only an explicit "y"/"yes"
/// counts as acceptance, everything else (including EOF) is a decline.
fn confirm(prompt: &str) -> bool {
    use std::io::Write;
    print!("{prompt} [y/N] ");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[tokio::main]
async fn main() {
    okcvm_config::load_and_apply("okcvm", None::<&std::path::Path>).ok();
    okcvm_config::logging::init();

    let args = Args::parse();
    if let Some(dir) = &args.config {
        let _ = okcvm_config::load_and_apply("okcvm", Some(dir.as_path()));
    }

    let config = Configuration::new();
    config.load_from_env();

    if let Err(e) = ensure_frontend_dir(&args.frontend_dir) {
        eprintln!("okcvm-server: {e}");
        std::process::exit(1);
    }

    let workspace_cfg = config.workspace_config();
    let mut workspace_manager_config = WorkspaceManagerConfig::default();
    if let Some(path) = &workspace_cfg.path {
        workspace_manager_config.base_dir = PathBuf::from(path);
    }

    println!(
        "Workspace directory resolved to: {}",
        workspace_manager_config.base_dir.display()
    );
    println!("Update OKCVM_WORKSPACE_PATH if this path is incorrect.");

    if workspace_cfg.confirm_on_start && !confirm("Proceed with using this workspace directory?") {
        println!("Server start aborted. Set OKCVM_WORKSPACE_PATH before retrying.");
        std::process::exit(1);
    }

    if let Err(e) = std::fs::create_dir_all(&workspace_manager_config.base_dir) {
        eprintln!("okcvm-server: failed to prepare workspace directory: {e}");
        std::process::exit(1);
    }

    let base_dir = workspace_manager_config.base_dir.clone();
    let conversations_path = base_dir.join("conversations.sqlite");
    let deployments_root = base_dir.join("deployments");
    let conversations = match ConversationStore::new(&conversations_path, base_dir.clone()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("okcvm-server: failed to open conversation store: {e}");
            std::process::exit(1);
        }
    };

    let workspace_manager = Arc::new(WorkspaceManager::new(workspace_manager_config));
    let deploy_store = DeployStore::new(deployments_root);
    let chat_endpoint = build_chat_endpoint(&config);
    let sessions = Arc::new(SessionStore::new(
        config.clone(),
        workspace_manager,
        deploy_store.clone(),
        chat_endpoint,
    ));

    let state = AppState {
        config,
        sessions,
        deployments: deploy_store,
        conversations,
        ui_dir: args.frontend_dir,
    };

    println!("Starting server on http://{}:{}", args.host, args.port);
    if args.reload {
        println!("Note: --reload has no effect; this server has no auto-reload.");
    }

    let addr = match format!("{}:{}", args.host, args.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("okcvm-server: invalid host/port: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run_serve(addr, state).await {
        eprintln!("okcvm-server: {e}");
        std::process::exit(1);
    }
}
