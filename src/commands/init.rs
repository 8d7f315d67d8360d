use crate::commands::Out;
use crate::{Config, Result};
use anyhow::Context;
use std::path::Path;

/// Creates the data directory with an initial `config.json` for `username`, the state directory
/// and an empty database.
///
/// # Errors
/// - Returns an error if any file operations fail or the directory is already initialized.
pub async fn init(statsync_home: &Path, username: &str) -> Result<Out<()>> {
    let config = Config::create(statsync_home, username)
        .await
        .context("Unable to create the data directory and configs")?;
    Ok(format!(
        "Successfully created the statsync directory at {} for '{}'",
        config.root().display(),
        config.username()
    )
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_twice() {
        let dir = TempDir::new().unwrap();
        let out = init(dir.path(), "someauthor").await.unwrap();
        assert!(out.message().contains("someauthor"));
        assert!(Config::load(dir.path()).await.is_ok());
        assert!(init(dir.path(), "someauthor").await.is_err());
    }
}
