//! Implementation of the `convoy init` command.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::adapters::sqlite::{initialize_database, PoolConfig};
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::config::loader::PROJECT_DIR;
use crate::infrastructure::config::ConfigLoader;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config.yaml
    #[arg(long, short)]
    pub force: bool,

    /// Target directory (defaults to current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub message: String,
    pub initialized_path: PathBuf,
    pub config_written: bool,
    pub database_path: PathBuf,
}

impl CommandOutput for InitOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![self.message.clone()];
        if self.config_written {
            lines.push(format!("\nWrote {PROJECT_DIR}/config.yaml"));
        }
        if self.success {
            lines.push(format!("Database ready at {}", self.database_path.display()));
        }
        lines.join("\n")
    }
}

pub async fn execute(args: InitArgs, config: &Config, json_mode: bool) -> Result<()> {
    let target_path = if args.path.is_absolute() {
        args.path.clone()
    } else {
        std::env::current_dir()
            .context("Failed to get current directory")?
            .join(&args.path)
    };

    let project_dir = target_path.join(PROJECT_DIR);
    fs::create_dir_all(&project_dir)
        .await
        .with_context(|| format!("Failed to create {}", project_dir.display()))?;

    let config_path = project_dir.join("config.yaml");
    let config_written = if config_path.exists() && !args.force {
        false
    } else {
        let yaml = ConfigLoader::default_yaml()?;
        fs::write(&config_path, yaml)
            .await
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        true
    };

    let database_path = resolve_database_path(&target_path, &config.database.path);
    let db_url = format!("sqlite:{}", database_path.display());
    initialize_database(&db_url, Some(PoolConfig::from(&config.database)))
        .await
        .context("Failed to initialize database")?;

    let message = if config_written {
        "Project initialized successfully."
    } else {
        "Project already initialized; config left unchanged (use --force to overwrite)."
    };

    output(
        &InitOutput {
            success: true,
            message: message.to_string(),
            initialized_path: target_path,
            config_written,
            database_path,
        },
        json_mode,
    );
    Ok(())
}

/// Relative database paths are anchored at the project root.
fn resolve_database_path(root: &Path, configured: &str) -> PathBuf {
    let configured = configured.strip_prefix("sqlite:").unwrap_or(configured);
    let path = Path::new(configured);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_database_path() {
        let root = Path::new("/work/project");
        assert_eq!(
            resolve_database_path(root, ".convoy/convoy.db"),
            PathBuf::from("/work/project/.convoy/convoy.db")
        );
        assert_eq!(
            resolve_database_path(root, "sqlite:/var/lib/convoy.db"),
            PathBuf::from("/var/lib/convoy.db")
        );
    }

    #[tokio::test]
    async fn test_init_creates_config_and_database() {
        let dir = tempfile::tempdir().unwrap();
        let args = InitArgs {
            force: false,
            path: dir.path().to_path_buf(),
        };

        execute(args, &Config::default(), true).await.unwrap();

        assert!(dir.path().join(".convoy/config.yaml").exists());
        assert!(dir.path().join(".convoy/convoy.db").exists());

        let written = ConfigLoader::load_from_file(dir.path().join(".convoy/config.yaml")).unwrap();
        assert_eq!(written.database.path, ".convoy/convoy.db");
    }
}
