use crate::ai::{Enricher, EnrichmentRequest};
use crate::db::Database;
use crate::gmail::{self, MailProvider};
use crate::models::{Folder, Message, build_query};
use crate::store::InboxStore;
use futures::future::join_all;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const DEFAULT_ENRICHMENT_INTERVAL: Duration = Duration::from_millis(1500);
pub const MISSING_KEY_NOTICE: &str = "Set an LLM API key (--set-api-key) to enable AI triage";

pub type SharedStore = Arc<Mutex<InboxStore>>;

pub fn lock_store(store: &SharedStore) -> MutexGuard<'_, InboxStore> {
    store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Spaces out LLM calls to stay under the provider's rate limit.
#[derive(Debug, Clone, Copy)]
pub struct EnrichmentPacer {
    interval: Duration,
}

impl EnrichmentPacer {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub async fn pause(&self) {
        if !self.interval.is_zero() {
            tokio::time::sleep(self.interval).await;
        }
    }
}

impl Default for EnrichmentPacer {
    fn default() -> Self {
        Self::new(DEFAULT_ENRICHMENT_INTERVAL)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncRequest {
    pub folder: Folder,
    pub search: Option<String>,
    pub token: Option<String>,
    pub api_key: Option<String>,
}

impl SyncRequest {
    pub fn is_search(&self) -> bool {
        self.search.as_deref().is_some_and(|s| !s.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub generation: u64,
    pub listed: usize,
    pub dropped: Vec<String>,
    pub enriched: Vec<String>,
    pub failed: Vec<String>,
    pub cancelled: bool,
}

#[derive(Clone)]
pub struct Synchronizer {
    provider: Arc<dyn MailProvider>,
    enricher: Arc<dyn Enricher>,
    store: SharedStore,
    pacer: EnrichmentPacer,
    page_size: u32,
    cache: Option<Arc<Database>>,
    refresh_tx: Option<mpsc::Sender<()>>,
}

impl Synchronizer {
    pub fn new(
        provider: Arc<dyn MailProvider>,
        enricher: Arc<dyn Enricher>,
        store: SharedStore,
    ) -> Self {
        Self {
            provider,
            enricher,
            store,
            pacer: EnrichmentPacer::default(),
            page_size: DEFAULT_PAGE_SIZE,
            cache: None,
            refresh_tx: None,
        }
    }

    pub fn with_pacer(mut self, pacer: EnrichmentPacer) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_cache(mut self, cache: Arc<Database>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_refresh(mut self, refresh_tx: mpsc::Sender<()>) -> Self {
        self.refresh_tx = Some(refresh_tx);
        self
    }

    fn notify(&self) {
        if let Some(tx) = &self.refresh_tx {
            // A full channel already means "redraw pending".
            let _ = tx.try_send(());
        }
    }

    /// Fetch, publish and enrich one page of `request.folder`.
    ///
    /// Returns `None` without touching the store when no token is present.
    pub async fn run(&self, request: SyncRequest) -> Option<SyncReport> {
        let token = request.token.as_deref().filter(|t| !t.is_empty())?;
        let generation =
            lock_store(&self.store).begin_sync(request.folder.clone(), request.search.clone());
        let mut report = SyncReport {
            generation,
            ..Default::default()
        };
        self.notify();

        // Search results never touch the per-folder cache.
        let cache = self.cache.as_ref().filter(|_| !request.is_search());
        if let Some(cache) = cache {
            match cache.load_folder(&request.folder.cache_key()).await {
                Ok(cached) => {
                    let painted = lock_store(&self.store).paint_cached(generation, cached);
                    if painted {
                        self.notify();
                    }
                }
                Err(e) => warn!("failed to read cache: {:#}", e),
            }
        }

        let query = build_query(&request.folder, request.search.as_deref());
        let ids = match self
            .provider
            .list_message_ids(token, &query, self.page_size)
            .await
        {
            Ok(ids) => ids,
            Err(e) => {
                warn!(%query, "list failed: {}", e);
                lock_store(&self.store).fail_sync(generation, e.to_string());
                self.notify();
                return Some(report);
            }
        };
        report.listed = ids.len();
        info!(%query, count = ids.len(), generation, "listed messages");

        let messages = self.fetch_details(token, &ids, &mut report).await;
        let published = lock_store(&self.store).publish(generation, messages.clone());
        if !published {
            report.cancelled = true;
            return Some(report);
        }
        self.notify();

        match request.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            Some(api_key) => self.enrich_all(generation, api_key, &messages, &mut report).await,
            None => {
                debug!("no LLM key, skipping enrichment");
                lock_store(&self.store).fail_sync(generation, MISSING_KEY_NOTICE.to_string());
                self.notify();
            }
        }

        if !request.is_search() {
            self.write_cache(generation, &request.folder).await;
        }
        Some(report)
    }

    async fn fetch_details(
        &self,
        token: &str,
        ids: &[String],
        report: &mut SyncReport,
    ) -> Vec<Message> {
        let results = join_all(ids.iter().map(|id| self.provider.get_message(token, id))).await;

        let mut messages = Vec::with_capacity(ids.len());
        for (id, result) in ids.iter().zip(results) {
            match result {
                Ok(raw) => messages.push(gmail::normalize_message(raw)),
                Err(e) => {
                    warn!(id = %id, "dropping message, detail fetch failed: {}", e);
                    report.dropped.push(id.clone());
                }
            }
        }
        messages
    }

    async fn enrich_all(
        &self,
        generation: u64,
        api_key: &str,
        messages: &[Message],
        report: &mut SyncReport,
    ) {
        lock_store(&self.store).set_enriching(generation, true);

        for (i, message) in messages.iter().enumerate() {
            let labels = {
                let store = lock_store(&self.store);
                if !store.is_current(generation) {
                    debug!(generation, "sync superseded, stopping enrichment");
                    report.cancelled = true;
                    return;
                }
                store.custom_labels.clone()
            };

            let request = EnrichmentRequest {
                snippet: message.snippet.clone(),
                subject: message.subject.clone(),
                sender: message.from.clone(),
                body: Some(message.body.clone()),
                labels,
            };
            let enrichment = self.enricher.enrich(api_key, &request).await;

            if enrichment.is_failed() {
                warn!(id = %message.id, "enrichment failed, leaving message unenriched");
                report.failed.push(message.id.clone());
            } else {
                let merged =
                    lock_store(&self.store).merge_enrichment(generation, &message.id, enrichment);
                if merged {
                    report.enriched.push(message.id.clone());
                    self.notify();
                }
            }

            if i + 1 < messages.len() {
                self.pacer.pause().await;
            }
        }

        lock_store(&self.store).set_enriching(generation, false);
        self.notify();
    }

    async fn write_cache(&self, generation: u64, folder: &Folder) {
        let Some(cache) = &self.cache else {
            return;
        };
        let snapshot = {
            let store = lock_store(&self.store);
            if !store.is_current(generation) {
                return;
            }
            store.messages.clone()
        };
        if let Err(e) = cache.save_folder(&folder.cache_key(), &snapshot).await {
            warn!("failed to write cache: {:#}", e);
        }
    }
}
