//! `mnemos-runtime` – language-model plumbing around the memory core.
//!
//! # Modules
//!
//! - [`llm_driver`] – [`LlmDriver`][llm_driver::LlmDriver]: a blocking
//!   OpenAI-compatible chat client for local model servers such as
//!   [Ollama](https://ollama.com), plus the [`Completion`] capability the
//!   classifier depends on.
//! - [`intent`] – [`IntentClassifier`][intent::IntentClassifier]: tags an
//!   utterance as `SAVE_SPEC`, `SEARCH_MEMORY` or `GENERAL_TALK`. Failures
//!   are returned to the caller, which decides whether to degrade.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   global `tracing` subscriber with an optional OTLP span exporter.
//!
//! Nothing here touches memory storage; the CLI wires the two together.

pub mod intent;
pub mod llm_driver;
pub mod telemetry;

pub use intent::{ClassificationError, Intent, IntentClassifier};
pub use llm_driver::{ChatMessage, Completion, LlmDriver, LlmError, Role};
pub use telemetry::{TracerProviderGuard, init_tracing};
