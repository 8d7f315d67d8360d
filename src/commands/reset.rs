use crate::commands::Out;
use crate::library::Library;
use crate::Result;

/// Forgets stored settings, cached documents and rates, and the sync position. The statements
/// themselves are kept; the next sync downloads from the oldest archived month again.
pub async fn reset(library: &Library) -> Result<Out<()>> {
    library.reset()?;
    Ok("Settings and caches were reset".into())
}
