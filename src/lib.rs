//! deep-research: drive hosted deep-research agent runs and turn their
//! output into cited reports.
//!
//! A [`research::ResearchService`] resolves or creates a deep-research
//! agent, posts the query on a new thread, polls the run until it reaches a
//! terminal state and post-processes the final assistant message into a
//! [`types::ResearchResult`] with numbered citations.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use deep_research::prelude::*;
//!
//! # async fn example() -> deep_research::error::Result<()> {
//! let config = ResearchConfig::load(None)?;
//! let service = ResearchService::from_config(config)?;
//! let request = ResearchRequest::from_query("State of solid-state batteries in 2025")?;
//! let result = service.research(request, Arc::new(NoopProgress)).await;
//! println!("{}", result.content);
//! # Ok(())
//! # }
//! ```

pub mod citations;
pub mod config;
pub mod error;
pub mod persist;
pub mod prelude;
pub mod progress;
pub mod research;
pub mod security;
pub mod service;
pub mod telemetry;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
