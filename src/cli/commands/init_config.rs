//! Init-config CLI command

use std::path::PathBuf;

use crate::cli::error::CliError;
use crate::config::{CONFIG_FILENAME, sample_config};

/// Init-config command arguments
#[derive(Debug, Clone)]
pub struct InitConfigArgs {
    /// Project directory to write `.sales-warehouse.toml` into
    pub dir: PathBuf,
    /// Overwrite an existing file
    pub force: bool,
}

/// Write the sample configuration file
pub fn handle_init_config(args: &InitConfigArgs) -> Result<PathBuf, CliError> {
    let path = args.dir.join(CONFIG_FILENAME);
    if path.exists() && !args.force {
        return Err(CliError::InvalidArgument(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }

    std::fs::create_dir_all(&args.dir)
        .map_err(|e| CliError::FileWriteError(args.dir.clone(), e.to_string()))?;
    std::fs::write(&path, sample_config())
        .map_err(|e| CliError::FileWriteError(path.clone(), e.to_string()))?;

    println!("Wrote {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use tempfile::TempDir;

    #[test]
    fn test_writes_loadable_config_once() {
        let dir = TempDir::new().unwrap();
        let args = InitConfigArgs {
            dir: dir.path().to_path_buf(),
            force: false,
        };

        let path = handle_init_config(&args).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(PipelineConfig::parse(&content).is_ok());

        assert!(matches!(
            handle_init_config(&args),
            Err(CliError::InvalidArgument(_))
        ));
        assert!(
            handle_init_config(&InitConfigArgs {
                force: true,
                ..args
            })
            .is_ok()
        );
    }
}
