//! # wallo
//!
//! Writing assistance by large language models: prompt assembly,
//! retrieval-augmented context, and routing across LLM backends.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌───────────────┐
//! │ Exchanges │──▶│ PromptBuilder│──▶│ ServiceRouter │──▶ OpenAI / Gemini
//! └─────▲─────┘   └──────▲───────┘   └───────▲───────┘
//!       │                │                   │ embeddings
//!       │          ┌─────┴─────┐             │
//!       │          │ RagIndex  │─────────────┘
//!       │          └───────────┘
//!  TaskRunner (one tokio task per submission)
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`extract`] | Text extraction from PDF, DOCX and text documents |
//! | [`backend`] | OpenAI-compatible and Gemini clients |
//! | [`router`] | Service resolution and error normalization |
//! | [`index`] | Persisted retrieval index |
//! | [`exchange`] | Ordered conversation turns |
//! | [`runner`] | Off-thread task execution |
//! | [`assistant`] | Operations exposed to a front end |
//! | [`commands`] | CLI subcommand handlers |

pub mod assistant;
pub mod backend;
pub mod commands;
pub mod config;
pub mod exchange;
pub mod extract;
pub mod index;
pub mod router;
pub mod runner;

pub use wallo_core::{Error, Result};
