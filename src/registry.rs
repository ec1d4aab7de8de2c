//! Monitor registry boundary
//!
//! The registry owns monitor definitions; the pipeline only lists them.
//! Backends expose a paginated listing and the provided
//! [`MonitorRegistry::list_active`] drains every page.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::MonitorDefinition;

/// One page of monitor definitions
#[derive(Debug, Clone, Default)]
pub struct MonitorPage {
    pub monitors: Vec<MonitorDefinition>,

    /// Cursor for the next page, `None` when this was the last one
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait MonitorRegistry: Send + Sync {
    /// Fetch one page of definitions (active and inactive)
    async fn list_page(&self, cursor: Option<String>, limit: usize) -> anyhow::Result<MonitorPage>;

    /// Page size used by [`MonitorRegistry::list_active`]
    fn page_size(&self) -> usize {
        100
    }

    /// Complete set of active monitors as of the call
    async fn list_active(&self) -> anyhow::Result<Vec<MonitorDefinition>> {
        let mut active = Vec::new();
        let mut cursor = None;
        let mut pages = 0usize;

        loop {
            let page = self.list_page(cursor, self.page_size()).await?;
            pages += 1;
            trace!("registry page {pages}: {} monitors", page.monitors.len());

            active.extend(page.monitors.into_iter().filter(|m| m.active));

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        debug!("listed {} active monitors over {pages} pages", active.len());
        Ok(active)
    }

    /// Look up a single definition regardless of its active flag
    async fn get(&self, id: &str) -> anyhow::Result<Option<MonitorDefinition>> {
        let mut cursor = None;
        loop {
            let page = self.list_page(cursor, self.page_size()).await?;
            if let Some(found) = page.monitors.into_iter().find(|m| m.id == id) {
                return Ok(Some(found));
            }
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(None),
            }
        }
    }
}

/// Registry held in memory, seeded from configuration
///
/// Cursors are plain offsets into the definition list.
#[derive(Debug, Default)]
pub struct StaticRegistry {
    monitors: RwLock<Vec<MonitorDefinition>>,
    page_size: usize,
}

impl StaticRegistry {
    pub fn new(monitors: Vec<MonitorDefinition>) -> Self {
        Self::with_page_size(monitors, 100)
    }

    pub fn with_page_size(monitors: Vec<MonitorDefinition>, page_size: usize) -> Self {
        Self {
            monitors: RwLock::new(monitors),
            page_size: page_size.max(1),
        }
    }

    /// Insert or replace a definition by id
    pub async fn upsert(&self, monitor: MonitorDefinition) {
        let mut monitors = self.monitors.write().await;
        match monitors.iter_mut().find(|m| m.id == monitor.id) {
            Some(existing) => *existing = monitor,
            None => monitors.push(monitor),
        }
    }

    pub async fn remove(&self, id: &str) -> bool {
        let mut monitors = self.monitors.write().await;
        let before = monitors.len();
        monitors.retain(|m| m.id != id);
        monitors.len() != before
    }

    pub async fn len(&self) -> usize {
        self.monitors.read().await.len()
    }
}

#[async_trait]
impl MonitorRegistry for StaticRegistry {
    async fn list_page(&self, cursor: Option<String>, limit: usize) -> anyhow::Result<MonitorPage> {
        let offset = match cursor {
            Some(c) => c
                .parse::<usize>()
                .map_err(|_| anyhow::anyhow!("invalid registry cursor `{c}`"))?,
            None => 0,
        };

        let monitors = self.monitors.read().await;
        let end = (offset + limit.max(1)).min(monitors.len());
        let page = monitors.get(offset..end).unwrap_or_default().to_vec();
        let next_cursor = (end < monitors.len()).then(|| end.to_string());

        Ok(MonitorPage {
            monitors: page,
            next_cursor,
        })
    }

    fn page_size(&self) -> usize {
        self.page_size
    }
}
