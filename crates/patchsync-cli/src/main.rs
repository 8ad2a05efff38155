use clap::{ArgAction, Parser, Subcommand};
use patchsync_connection::{
    BackendKind, Connection, ConnectionConfig, ConnectionSelector, Patch, PatchStatus, Project,
    ValidateOptions, short_id,
};
use patchsync_diff::{DiffProjector, DiffWorkspace};
use patchsync_store::{PatchHandle, PatchStore};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::process::Command;

#[derive(Parser, Debug)]
#[command(name = "patchsync")]
#[command(about = "Inspect Radicle projects and patches through a local node")]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,
    #[command(subcommand)]
    command: Commands,
}

/// Overrides for values otherwise read from the environment (and `.env`).
#[derive(clap::Args, Debug)]
struct ConnectionArgs {
    /// Base URL of the node's HTTP API.
    #[arg(long, global = true)]
    httpd_url: Option<String>,
    #[arg(long, global = true)]
    rad_path: Option<PathBuf>,
    #[arg(long, global = true)]
    rad_home: Option<PathBuf>,
    /// Working copy of the project to operate on.
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    native_binding: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check that the node is reachable.
    Validate(ValidateArgs),
    /// List every project the node knows.
    Projects(ProjectsArgs),
    /// Show one project, the workspace's by default.
    Project(ProjectArgs),
    /// List the workspace project's patches, newest first.
    Patches(PatchesArgs),
    /// Show one patch by full or partial id.
    Patch(PatchArgs),
    /// List the files changed by a patch's latest revision.
    Diff(DiffArgs),
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Validate(_) => "validate",
            Commands::Projects(_) => "projects",
            Commands::Project(_) => "project",
            Commands::Patches(_) => "patches",
            Commands::Patch(_) => "patch",
            Commands::Diff(_) => "diff",
        }
    }
}

#[derive(clap::Args, Debug)]
struct ValidateArgs {
    #[arg(long, action = ArgAction::SetTrue)]
    quiet: bool,
}

#[derive(clap::Args, Debug)]
struct ProjectsArgs {
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(clap::Args, Debug)]
struct ProjectArgs {
    rid: Option<String>,
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(clap::Args, Debug)]
struct PatchesArgs {
    #[arg(long)]
    status: Option<PatchStatus>,
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(clap::Args, Debug)]
struct PatchArgs {
    id: String,
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(clap::Args, Debug)]
struct DiffArgs {
    id: String,
    /// Write diff sides here and keep them instead of using a temporary
    /// directory.
    #[arg(long)]
    keep: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let config = cli.connection.apply(ConnectionConfig::from_env());
    let result = run(cli.command, config).await;

    match result {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

impl ConnectionArgs {
    fn apply(self, mut config: ConnectionConfig) -> ConnectionConfig {
        if let Some(url) = self.httpd_url {
            config.httpd_base_url = url;
        }
        if let Some(program) = self.rad_path {
            config.rad_program = program;
        }
        if self.rad_home.is_some() {
            config.rad_home = self.rad_home;
        }
        if let Some(workspace) = self.workspace {
            config.workspace_dir = workspace;
        }
        if self.native_binding {
            config.backend = BackendKind::NativeBinding;
        }
        config
    }
}

async fn run(command: Commands, config: ConnectionConfig) -> Result<ExitCode, String> {
    let workspace_dir = config.workspace_dir.clone();
    tracing::debug!(
        backend = %config.backend,
        httpd_url = %config.httpd_base_url,
        workspace = %workspace_dir.display(),
        "resolved connection config"
    );
    let selector = ConnectionSelector::new(config);
    let connection = selector.active().map_err(|error| error.to_string())?;

    tracing::debug!(command = command.name(), "dispatching command");
    match command {
        Commands::Validate(args) => validate_command(connection, args).await,
        Commands::Projects(args) => projects_command(connection, args).await,
        Commands::Project(args) => project_command(connection, args).await,
        Commands::Patches(args) => patches_command(connection, &workspace_dir, args).await,
        Commands::Patch(args) => patch_command(connection, args).await,
        Commands::Diff(args) => diff_command(connection, args).await,
    }
}

async fn validate_command(
    connection: Arc<dyn Connection>,
    args: ValidateArgs,
) -> Result<ExitCode, String> {
    let reachable = connection
        .validate(ValidateOptions {
            minimize_user_notifications: args.quiet,
        })
        .await;
    if reachable {
        println!("node reachable ({})", connection.kind());
        Ok(ExitCode::SUCCESS)
    } else {
        println!("node unreachable ({})", connection.kind());
        Ok(ExitCode::from(1))
    }
}

async fn projects_command(
    connection: Arc<dyn Connection>,
    args: ProjectsArgs,
) -> Result<ExitCode, String> {
    let projects = connection
        .projects()
        .await
        .map_err(|error| error.to_string())?;
    if args.json {
        print_json(&projects)?;
    } else {
        for project in &projects {
            println!("{}  {}", project.id, project.name);
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn project_command(
    connection: Arc<dyn Connection>,
    args: ProjectArgs,
) -> Result<ExitCode, String> {
    let rid = match args.rid {
        Some(rid) => rid,
        None => connection
            .current_project_id()
            .await
            .map_err(|error| error.to_string())?,
    };
    let project = connection
        .project(&rid)
        .await
        .map_err(|error| error.to_string())?;
    if args.json {
        print_json(&project)?;
    } else {
        print_project(&project);
    }
    Ok(ExitCode::SUCCESS)
}

async fn patches_command(
    connection: Arc<dyn Connection>,
    workspace_dir: &Path,
    args: PatchesArgs,
) -> Result<ExitCode, String> {
    let store = PatchStore::new(connection);
    store.set_current_branch(current_branch(workspace_dir).await);
    if !store.fetch_all_patches().await {
        return Err("failed to fetch patches; see log output for details".to_string());
    }

    let checked_out = store.checked_out_patch();
    let patches = store
        .sorted_patches()
        .unwrap_or_default()
        .into_iter()
        .filter(|handle| {
            args.status
                .is_none_or(|status| handle.read(|augmented| augmented.patch.status() == status))
        })
        .collect::<Vec<_>>();

    if args.json {
        let snapshots = patches
            .iter()
            .map(PatchHandle::snapshot)
            .collect::<Vec<_>>();
        print_json(&snapshots)?;
        return Ok(ExitCode::SUCCESS);
    }

    for handle in &patches {
        let marker = if checked_out
            .as_ref()
            .is_some_and(|current| current.same_as(handle))
        {
            "*"
        } else {
            " "
        };
        handle.read(|augmented| print_patch_line(marker, &augmented.patch));
    }
    Ok(ExitCode::SUCCESS)
}

async fn patch_command(
    connection: Arc<dyn Connection>,
    args: PatchArgs,
) -> Result<ExitCode, String> {
    let handle = find_patch(&PatchStore::new(connection), &args.id).await?;
    let snapshot = handle.snapshot();
    if args.json {
        print_json(&snapshot)?;
    } else {
        print_patch_detail(&snapshot.patch);
    }
    Ok(ExitCode::SUCCESS)
}

async fn diff_command(
    connection: Arc<dyn Connection>,
    args: DiffArgs,
) -> Result<ExitCode, String> {
    let handle = find_patch(&PatchStore::new(Arc::clone(&connection)), &args.id).await?;
    let workspace = match args.keep {
        Some(path) => DiffWorkspace::persistent(path),
        None => DiffWorkspace::session()
            .map_err(|error| format!("failed to create diff workspace: {error}"))?,
    };
    let projector = DiffProjector::new(connection, workspace);
    let nodes = projector
        .project(&handle.snapshot().patch)
        .await
        .map_err(|error| error.to_string())?;
    tracing::debug!(
        patch_id = %handle.id(),
        files = nodes.len(),
        root = %projector.workspace().root().display(),
        "diff projected"
    );

    for node in &nodes {
        let item = node.item();
        println!("{:<8} {}", node.kind(), node.path());
        println!("         {}", item.tooltip);
        if let Some(command) = item.command.as_ref() {
            println!("         left:  {}", command.left.display());
            println!("         right: {}", command.right.display());
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Loads the patch list and resolves `id` as a full or partial id.
async fn find_patch(store: &PatchStore, id: &str) -> Result<PatchHandle, String> {
    if !store.init_if_needed().await {
        return Err("failed to fetch patches; see log output for details".to_string());
    }
    store
        .find_patch_by_id(id)
        .ok_or_else(|| format!("no patch matches '{id}'"))
}

/// Branch checked out in `workspace_dir`, if it is a git working copy.
async fn current_branch(workspace_dir: &Path) -> Option<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(workspace_dir)
        .args(["rev-parse", "--abbrev-ref", "HEAD"])
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let branch = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!branch.is_empty()).then_some(branch)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value).map_err(|error| error.to_string())?;
    println!("{json}");
    Ok(())
}

fn print_project(project: &Project) {
    println!("id: {}", project.id);
    println!("name: {}", project.name);
    if !project.description.is_empty() {
        println!("description: {}", project.description);
    }
    println!("default_branch: {}", project.default_branch);
    println!("head: {}", short_id(&project.head));
    println!(
        "delegates: {}",
        project
            .delegates
            .iter()
            .map(|delegate| delegate.display_name())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!(
        "patches: {} open, {} draft, {} archived, {} merged",
        project.patches.open,
        project.patches.draft,
        project.patches.archived,
        project.patches.merged
    );
}

fn print_patch_line(marker: &str, patch: &Patch) {
    let updated = patch
        .latest_revision()
        .map(|revision| revision.timestamp)
        .unwrap_or_default();
    println!(
        "{marker} {} {:<8} {}  ({}, {updated})",
        patch.short_id(),
        patch.status(),
        patch.title,
        patch.author.display_name()
    );
}

fn print_patch_detail(patch: &Patch) {
    println!("id: {}", patch.id);
    println!("title: {}", patch.title);
    println!("status: {}", patch.status());
    println!("author: {}", patch.author.display_name());
    if !patch.labels.is_empty() {
        println!("labels: {}", patch.labels.join(", "));
    }
    println!("revisions:");
    for revision in patch.revisions_by_time() {
        println!(
            "  {} {}..{} {}",
            short_id(&revision.id),
            short_id(&revision.base),
            short_id(&revision.oid),
            revision.timestamp
        );
    }
}
