//! Engine composition root.
//!
//! All module-level state from the original design lives here instead:
//! the storage handles, settings registry, event bus, and every service,
//! wired once at unlock and passed to transports explicitly.

use std::sync::Arc;

use crate::chat::ChatService;
use crate::document::{DocumentProcessor, PageRenderer};
use crate::enrichment::Enricher;
use crate::events::EventBus;
use crate::graph::insights::LinkInsightsService;
use crate::graph::GraphService;
use crate::jobs::JobService;
use crate::llm::LlmGateway;
use crate::media::IngestService;
use crate::settings::SettingsRegistry;
use crate::storage::{BlobStore, MemoryStore};
use crate::transcription::{SpeechModelLoader, TranscriptionEngine};
use crate::Result;

/// Everything a transport needs to serve the engine.
pub struct AppContext {
    pub store: Arc<dyn MemoryStore>,
    pub vault: Arc<dyn BlobStore>,
    pub settings: Arc<SettingsRegistry>,
    pub events: EventBus,
    pub gateway: LlmGateway,
    pub enricher: Enricher,
    pub ingest: IngestService,
    pub chat: ChatService,
    pub graphs: GraphService,
    pub insights: LinkInsightsService,
    pub jobs: JobService,
    pub transcriber: Arc<TranscriptionEngine>,
}

impl AppContext {
    /// Wire the engine over an unlocked store and vault. Reloads settings
    /// from the store so persisted values take effect immediately.
    pub async fn new(
        store: Arc<dyn MemoryStore>,
        vault: Arc<dyn BlobStore>,
        speech_loader: Arc<dyn SpeechModelLoader>,
        page_renderer: Arc<dyn PageRenderer>,
    ) -> Result<Self> {
        let settings = Arc::new(SettingsRegistry::new());
        settings.reload(store.as_ref()).await?;

        let events = EventBus::new();
        let gateway = LlmGateway::new(settings.clone(), store.clone());
        let transcriber = Arc::new(TranscriptionEngine::new(
            speech_loader,
            vault.clone(),
            store.clone(),
        ));
        let enricher = Enricher::new(
            store.clone(),
            gateway.clone(),
            events.clone(),
            transcriber.clone(),
        );
        let documents = DocumentProcessor::new(page_renderer);
        let ingest = IngestService::new(
            store.clone(),
            vault.clone(),
            events.clone(),
            enricher.clone(),
            gateway.clone(),
            documents,
        );
        let chat = ChatService::new(
            store.clone(),
            gateway.clone(),
            events.clone(),
            enricher.clone(),
        );
        let graphs = GraphService::new(store.clone(), events.clone());
        let insights = LinkInsightsService::new(store.clone(), graphs.clone());
        let jobs = JobService::new(store.clone(), gateway.clone());

        Ok(AppContext {
            store,
            vault,
            settings,
            events,
            gateway,
            enricher,
            ingest,
            chat,
            graphs,
            insights,
            jobs,
            transcriber,
        })
    }

    /// Reload settings from the store, bumping the version counter.
    pub async fn reload_settings(&self) -> Result<u64> {
        self.settings.reload(self.store.as_ref()).await
    }
}
