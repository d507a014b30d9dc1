use anyhow::Context;
use clap::{Parser, Subcommand};
use notefs_core::constants::DEFAULT_DATA_DIR;
use notefs_core::{
    compression_from_env_values, CoreConfig, ErrorKind, ExternalId, NotesContext, NotesError,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "notefs")]
#[command(about = "Clusters, directories and files with soft-delete and zip archival")]
struct Cli {
    /// Directory holding live content, the archive and the store file
    #[arg(long, env = "NOTEFS_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// Archive root (defaults to <data-dir>/archive)
    #[arg(long, env = "NOTEFS_ARCHIVE_DIR")]
    archive_dir: Option<PathBuf>,

    /// Snapshot compression method: deflated or stored
    #[arg(long, env = "NOTEFS_COMPRESSION")]
    compression: Option<String>,

    /// Deflate level, 0-9
    #[arg(long, env = "NOTEFS_COMPRESSION_LEVEL")]
    compression_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a cluster
    CreateCluster {
        title: String,
    },
    /// List clusters
    List {
        /// List soft-deleted clusters instead of active ones
        #[arg(long)]
        deleted: bool,
    },
    /// Show an active cluster with its directories and files
    ReadCluster {
        cluster_id: String,
    },
    /// Soft-delete a cluster and archive its files
    DeleteCluster {
        cluster_id: String,
    },
    /// Permanently remove a soft-deleted cluster and its snapshots
    EraseCluster {
        cluster_id: String,
    },
    /// Erase every soft-deleted cluster
    EraseDeleted,
    /// Show the deletion history of a cluster
    History {
        cluster_id: String,
    },
    /// Create a directory inside a cluster
    CreateDirectory {
        cluster_id: String,
        name: String,
    },
    /// Show a directory with its files
    ReadDirectory {
        directory_id: String,
    },
    /// Soft-delete a directory and archive its files
    DeleteDirectory {
        directory_id: String,
    },
    /// Add a file, reading its content from a local path
    AddFile {
        directory_id: String,
        name: String,
        source: PathBuf,
    },
    /// Print the content of a file
    ReadFile {
        file_id: String,
        /// Write the content here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Replace the content of a file, archiving the previous version
    UpdateFile {
        file_id: String,
        source: PathBuf,
    },
    /// Soft-delete a file and archive its content
    DeleteFile {
        file_id: String,
    },
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("notefs=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            let kind = e.downcast_ref::<NotesError>().map(NotesError::kind);
            ExitCode::from(match kind {
                Some(ErrorKind::NotFound) => 2,
                Some(ErrorKind::ValidationFailure) => 3,
                Some(ErrorKind::StorageFault) => 4,
                None => 1,
            })
        }
    }
}

fn open(cli: &Cli) -> anyhow::Result<NotesContext> {
    let compression =
        compression_from_env_values(cli.compression.clone(), cli.compression_level.clone())?;
    let mut cfg = CoreConfig::under(&cli.data_dir, compression)?;
    if let Some(archive_dir) = &cli.archive_dir {
        cfg = cfg.with_archive_dir(archive_dir.clone())?;
    }
    Ok(NotesContext::open(Arc::new(cfg))?)
}

fn id(raw: &str) -> anyhow::Result<ExternalId> {
    Ok(ExternalId::parse(raw.trim()).map_err(NotesError::from)?)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let ctx = open(&cli)?;

    match cli.command {
        Commands::CreateCluster { title } => {
            let cluster = ctx.clusters().create_cluster(&title)?;
            println!("Created cluster {} ({})", cluster.title(), cluster.external_id());
        }
        Commands::List { deleted } => {
            let clusters = if deleted {
                ctx.clusters().find_all_deleted()
            } else {
                ctx.clusters().find_all_not_deleted()
            };
            if clusters.is_empty() {
                println!("No clusters found.");
            }
            for cluster in clusters {
                println!(
                    "ID: {}, Title: {}, Created: {}, Last request: {}",
                    cluster.external_id(),
                    cluster.title(),
                    cluster.created_at(),
                    cluster.last_request_at()
                );
            }
        }
        Commands::ReadCluster { cluster_id } => {
            print_json(&ctx.clusters().read_cluster(id(&cluster_id)?)?)?;
        }
        Commands::DeleteCluster { cluster_id } => {
            print_json(&ctx.clusters().delete_cluster(id(&cluster_id)?)?)?;
        }
        Commands::EraseCluster { cluster_id } => {
            print_json(&ctx.clusters().erase_cluster(id(&cluster_id)?)?)?;
        }
        Commands::EraseDeleted => {
            let erased = ctx.clusters().erase_deleted_clusters();
            println!("Erased {erased} cluster(s)");
        }
        Commands::History { cluster_id } => {
            print_json(&ctx.clusters().get_cluster_delete_history(id(&cluster_id)?)?)?;
        }
        Commands::CreateDirectory { cluster_id, name } => {
            let directory = ctx
                .directories()
                .create_directory(id(&cluster_id)?, &name)?;
            println!(
                "Created directory {} ({})",
                directory.name(),
                directory.external_id()
            );
        }
        Commands::ReadDirectory { directory_id } => {
            print_json(&ctx.directories().read_directory(id(&directory_id)?)?)?;
        }
        Commands::DeleteDirectory { directory_id } => {
            print_json(&ctx.directories().delete_directory(id(&directory_id)?)?)?;
        }
        Commands::AddFile {
            directory_id,
            name,
            source,
        } => {
            let bytes = std::fs::read(&source)
                .with_context(|| format!("reading {}", source.display()))?;
            let file = ctx.files().add_file(id(&directory_id)?, &name, &bytes)?;
            println!(
                "Added file {} ({}, version {})",
                file.name(),
                file.external_id(),
                file.version()
            );
        }
        Commands::ReadFile { file_id, output } => {
            let file = ctx.files().read_file(id(&file_id)?)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &file.content)
                        .with_context(|| format!("writing {}", path.display()))?;
                    tracing::info!("wrote {} (version {}) to {}", file.name, file.version, path.display());
                }
                None => {
                    use std::io::Write;
                    std::io::stdout().write_all(&file.content)?;
                }
            }
        }
        Commands::UpdateFile { file_id, source } => {
            let bytes = std::fs::read(&source)
                .with_context(|| format!("reading {}", source.display()))?;
            let file = ctx.files().update_file(id(&file_id)?, &bytes)?;
            println!("Updated file {} to version {}", file.name(), file.version());
        }
        Commands::DeleteFile { file_id } => {
            print_json(&ctx.files().delete_file(id(&file_id)?)?)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "notefs",
            "--data-dir",
            "/tmp/notes",
            "--compression-level",
            "9",
            "add-file",
            "550e8400e29b41d4a716446655440000",
            "a.txt",
            "./a.txt",
        ])
        .unwrap();

        assert_eq!(cli.data_dir, PathBuf::from("/tmp/notes"));
        assert_eq!(cli.compression_level.as_deref(), Some("9"));
        assert!(matches!(cli.command, Commands::AddFile { ref name, .. } if name == "a.txt"));
    }

    #[test]
    fn malformed_id_is_a_validation_failure() {
        let err = id("not-an-id").unwrap_err();
        let kind = err.downcast_ref::<NotesError>().map(NotesError::kind);

        assert_eq!(kind, Some(ErrorKind::ValidationFailure));
    }
}
