//! Subject Tree Developer Binary
//!
//! Small command-line front end over `TreeService` for inspecting and
//! editing a subject tree database by hand.
//!
//! # Usage
//!
//! ```bash
//! # Print the whole forest as a client snapshot
//! SUBJECT_TREE_DB=./subjects.db subject-tree render
//!
//! # Print the sub-forest below an anchor subject
//! subject-tree render <anchor-id>
//!
//! # Reconcile a snapshot file (JSON) and print the report
//! subject-tree apply snapshot.json [anchor-id]
//!
//! # Append a subject
//! subject-tree add "Physics" [parent-id]
//!
//! # Recompute nested-set bounds
//! subject-tree repair
//! ```
//!
//! # Environment Variables
//!
//! - `SUBJECT_TREE_DB`: Database file (in-memory when unset)
//! - `SUBJECT_TREE_LABEL_KEY`: Label attribute name (default: "name")
//! - `SUBJECT_TREE_MAX_DEPTH`: Deepest accepted snapshot nesting
//! - `RUST_LOG`: Logging level (e.g., "info", "debug", "trace")

use std::env;
use std::sync::Arc;

use anyhow::{bail, Context};
use serde_json::{Map, Value};
use subject_tree_core::db::LibsqlStore;
use subject_tree_core::models::ClientSnapshot;
use subject_tree_core::{TreeConfig, TreeScope, TreeService};

fn scope_from(arg: Option<&String>) -> TreeScope {
    match arg {
        Some(anchor_id) => TreeScope::anchored(anchor_id.clone()),
        None => TreeScope::Whole,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        bail!("usage: subject-tree <render|apply|add|repair> [args]");
    };

    let config = TreeConfig::from_env()?;
    match &config.database_path {
        Some(path) => tracing::info!("Database: {}", path.display()),
        None => tracing::info!("Database: in-memory"),
    }
    let store = Arc::new(LibsqlStore::from_config(&config).await?);

    match command.as_str() {
        "render" => {
            let service = TreeService::new(store, scope_from(args.get(1)), config)?;
            let snapshot = service.render().await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        "apply" => {
            let Some(file) = args.get(1) else {
                bail!("usage: subject-tree apply <snapshot.json> [anchor-id]");
            };
            let raw = tokio::fs::read_to_string(file)
                .await
                .with_context(|| format!("Failed to read snapshot file {}", file))?;
            let snapshot: ClientSnapshot =
                serde_json::from_str(&raw).context("Snapshot file is not a valid snapshot")?;

            let service = TreeService::new(store, scope_from(args.get(2)), config)?;
            let outcome = service.reconcile(&snapshot).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        "add" => {
            let Some(name) = args.get(1) else {
                bail!("usage: subject-tree add <name> [parent-id]");
            };
            let mut attributes = Map::new();
            attributes.insert(config.label_key.clone(), Value::String(name.clone()));

            let service = TreeService::new(store, TreeScope::Whole, config)?;
            let subject = match args.get(2) {
                Some(parent_id) => service.add_child(parent_id, &attributes).await?,
                None => service.add_root(&attributes).await?,
            };
            println!("{}", serde_json::to_string_pretty(&subject)?);
        }
        "repair" => {
            let service = TreeService::new(store, TreeScope::Whole, config)?;
            let stats = service.repair(None).await?;
            tracing::info!(
                "Repaired {} subjects ({} rewritten)",
                stats.visited,
                stats.rewritten
            );
        }
        other => bail!("unknown command '{}'", other),
    }

    Ok(())
}
