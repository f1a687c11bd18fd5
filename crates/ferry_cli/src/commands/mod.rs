pub mod import;
pub mod map;
pub mod transcode;

use ferry_core::{FerryConfig, ForumDb, SqliteIdentityMap};
use miette::Result;

/// Open the configured database and the identity map for its namespace.
pub async fn open_identity(config: &FerryConfig) -> Result<(ForumDb, SqliteIdentityMap)> {
    let db = ForumDb::open(&config.database.path).await?;
    let identity = SqliteIdentityMap::new(db.clone(), config.import.namespace.clone());
    Ok((db, identity))
}
