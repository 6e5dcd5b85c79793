//! CLI error types.

use thiserror::Error;

/// Errors that end the program.
#[derive(Debug, Error)]
pub enum CliError {
    /// The async runtime could not start.
    #[error("failed to create async runtime: {0}")]
    Runtime(std::io::Error),

    /// The device inventory could not be set up.
    #[error(transparent)]
    Inventory(#[from] tcli_core::InventoryError),

    /// The run commands file could not be read.
    #[error("cannot read {path}: {source}")]
    ConfigFile {
        /// File that failed.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_file_error_names_path() {
        let err = CliError::ConfigFile {
            path: "/tmp/tclirc".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "cannot read /tmp/tclirc: denied");
    }

    #[test]
    fn inventory_error_is_transparent() {
        let err = CliError::from(tcli_core::InventoryError::NoDevices);
        assert_eq!(
            err.to_string(),
            "device inventory data failed to load or no devices found"
        );
    }

    #[test]
    fn runtime_error_is_described() {
        let err = CliError::Runtime(std::io::Error::other("no threads"));
        assert_eq!(err.to_string(), "failed to create async runtime: no threads");
    }
}
