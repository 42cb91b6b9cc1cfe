//! Incremental event cache over paginated log queries.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    client::{query_events_checked, BaseChainClient},
    errors::ClientError,
    types::{ChainEvent, EventFilter},
};

/// Scan parameters for base chain log queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSettings {
    /// First block scanned for any filter.
    pub start_block: u64,
    /// Blocks behind head a batch event must be before it is read.
    pub finality_depth: u64,
    /// Maximum blocks per `eth_getLogs` request.
    pub page_size: u64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            start_block: 0,
            finality_depth: 0,
            page_size: 2000,
        }
    }
}

#[derive(Debug, Default)]
struct CacheEntry {
    /// Next block not yet scanned.
    next_block: u64,
    events: Vec<ChainEvent>,
}

/// Events seen so far per filter.
///
/// The first lookup of a filter scans from `start_block`; later lookups only fetch blocks
/// produced since. A page that fails leaves earlier pages cached.
#[derive(Debug)]
pub struct EventCache {
    settings: ScanSettings,
    entries: Mutex<HashMap<EventFilter, CacheEntry>>,
}

impl EventCache {
    pub fn new(settings: ScanSettings) -> Self {
        Self {
            settings,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    /// Brings `filter` up to date and returns every event seen for it.
    pub async fn find_all_events(
        &self,
        client: &impl BaseChainClient,
        filter: EventFilter,
    ) -> Result<Vec<ChainEvent>, ClientError> {
        let head = client.block_number().await?;
        let target = if filter.kind.requires_finality() {
            head.saturating_sub(self.settings.finality_depth)
        } else {
            head
        };

        let page = self.settings.page_size.max(1);
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(filter).or_insert_with(|| CacheEntry {
            next_block: self.settings.start_block,
            events: Vec::new(),
        });

        while entry.next_block <= target {
            let from = entry.next_block;
            let to = from.saturating_add(page - 1).min(target);
            let events = query_events_checked(client, filter, from, to).await?;
            debug!(kind = ?filter.kind, address = %filter.address, %from, %to, found = events.len(), "scanned logs");
            entry.events.extend(events);
            entry.next_block = to + 1;
        }

        Ok(entry.events.clone())
    }
}
