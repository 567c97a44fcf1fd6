// Copyright 2026 Gleaner Contributors
// SPDX-License-Identifier: Apache-2.0

//! Gleaner: schema-driven extraction of structured records from web pages.
//!
//! An [`ExtractorConfig`] names the repeated items on a page and the fields
//! of each. The [`Extractor`] runs it against either a statically fetched
//! document or a page rendered in headless Chromium, and returns the items
//! together with every field that failed to resolve.

pub mod batch;
pub mod cache;
pub mod document;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod item;
pub mod normalize;
pub mod resolve;
pub mod rewrite;
pub mod schema;
pub mod selector;
pub mod session;

pub use batch::{load_urls, run_batch, BatchRecord, BatchSummary};
pub use document::{DocumentAdapter, LiveDocument, LiveOptions, StaticDocument};
pub use engine::{Backend, Extractor};
pub use error::{ConfigError, ErrorCollector, ExtractError, ExtractionError, FieldError};
pub use fetch::{FetchOptions, FetchedPage, HttpFetcher, PageFetcher};
pub use item::{ExtractedItem, ExtractionResult, FieldValue, RawItem, Record, SchemaResult};
pub use normalize::{Clock, FixedClock, Normalizer, SystemClock};
pub use schema::{ExtractorConfig, Field, FieldKind, MissingIdPolicy, Mode, Schema, SchemaInfo};
pub use session::{BrowserPool, BrowserSession};
