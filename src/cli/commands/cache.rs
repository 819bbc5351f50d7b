//! Cache command implementation.

use crate::cache::{self, Cache};
use crate::cli::preflight::{self, Operation};
use crate::cli::{CacheAction, Output};
use crate::config::Settings;
use anyhow::Result;

/// Run the cache command.
pub async fn run_cache(action: &CacheAction, settings: Settings) -> Result<()> {
    preflight::check(Operation::Cache, &settings)?;

    match action {
        CacheAction::Purge => {
            let cache = Cache::new(cache::open_store(&settings.cache)?);
            let removed = cache.purge_expired().await?;
            Output::success(&format!(
                "Removed {} expired entr{} from the {} cache",
                removed,
                if removed == 1 { "y" } else { "ies" },
                settings.cache.provider
            ));
        }
    }

    Ok(())
}
