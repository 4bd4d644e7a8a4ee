#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_docs_in_private_items)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::float_cmp)]

//! # Think Core
//!
//! Backend engine of the Think local-first personal knowledge hub. A single
//! user captures heterogeneous memories (web clips, notes, voice recordings,
//! videos, PDF documents) into an encrypted on-device store and retrieves,
//! chats with, and interlinks them through an LLM-assisted pipeline.
//!
//! ## Module Organization
//!
//! ### Primary APIs
//! - [`context`]: engine composition root ([`context::AppContext`])
//! - [`media`]: ingest services for every memory type
//! - [`chat`]: conversational RAG orchestration
//! - [`graph`]: knowledge graph analytics and link insights
//! - [`jobs`]: durable background jobs and the reembed worker
//!
//! ### Pipeline pieces
//! - [`enrichment`]: per-type AI enrichment workers
//! - [`llm`]: provider-agnostic chat/embedding gateway
//! - [`query`] and [`retrieval`]: query shaping and result filtering
//! - [`transcription`] and [`document`]: media-specific processing
//!
//! ### Substrate
//! - [`storage`]: the [`storage::MemoryStore`] / [`storage::BlobStore`]
//!   seams implemented by the encrypted libSQL backend
//! - [`crypto`]: password-derived keys for the database and blob vault
//! - [`settings`], [`events`], [`types`], [`error`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use think_core::context::AppContext;
//! use think_core::types::NewMemory;
//! # use std::sync::Arc;
//! # async fn example(
//! #     store: Arc<dyn think_core::storage::MemoryStore>,
//! #     vault: Arc<dyn think_core::storage::BlobStore>,
//! #     speech: Arc<dyn think_core::transcription::SpeechModelLoader>,
//! #     renderer: Arc<dyn think_core::document::PageRenderer>,
//! # ) -> think_core::Result<()> {
//! let ctx = AppContext::new(store, vault, speech, renderer).await?;
//!
//! // Capture a web clip; enrichment runs in the background
//! let outcome = ctx
//!     .ingest
//!     .create_memory(NewMemory::web("https://example.com/post", "A post", "body text"))
//!     .await?;
//! println!("created memory {}", outcome.memory().id);
//!
//! // Chat over the stored memories
//! let reply = ctx.chat.chat("What did I save about Rust?", None).await?;
//! println!("{:?}", reply.response);
//! # Ok(())
//! # }
//! ```

pub mod chat;
pub mod context;
pub mod crypto;
pub mod document;
pub mod enrichment;
pub mod error;
pub mod events;
pub mod graph;
pub mod jobs;
pub mod llm;
pub mod media;
pub mod query;
pub mod retrieval;
pub mod settings;
pub mod storage;
pub mod transcription;
pub mod types;

pub use error::{Error, Result};
