pub mod bid_read_storage;

use async_trait::async_trait;

use crate::application::list_bids::BidItem;
use crate::cursor::Cursor;
use crate::errors::StorageError;

/// Keyset reader over the bid history read model. Fetches `limit` items past
/// the exclusive `after` bound and reports whether more exist.
#[async_trait]
pub trait BidReadStore: Send + Sync {
    async fn list_by_auction(
        &self,
        auction_id: &str,
        after: Option<&Cursor>,
        limit: i64,
        asc: bool,
    ) -> Result<(Vec<BidItem>, bool), StorageError>;
}
