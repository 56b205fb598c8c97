//! Write path for the tilelog transparency log engine
//!
//! Four cooperating pieces sit behind the [`Appender`] façade:
//!
//! - the **queue** batches concurrent submissions and collapses in-flight
//!   duplicates, handing each batch to a single worker;
//! - the **sequencer** runs one batch transaction at a time: assign
//!   contiguous indices, write entry bundles, integrate, CAS-publish;
//! - the **integrator** folds new leaf hashes into the Merkle tile grid and
//!   derives the tree root;
//! - the **migration copier** rebuilds a log locally from a source's entry
//!   bundles and refuses to finish unless the recomputed root matches.
//!
//! Reads go through [`LogReader`], which never touches the write path.
//! Storage is abstracted behind `tilelog_storage::LogStorage`; signing
//! behind `tilelog_core::CheckpointSigner`.

mod appender;
mod bundles;
mod error;
mod integrate;
mod migrate;
mod queue;
mod reader;
mod sequencer;

pub use appender::{AppendOptions, Appender, IndexFuture, QueueOptions};
pub use error::{EngineError, Result};
pub use migrate::{migrate, BundleFetcher, MigrateOptions};
pub use reader::LogReader;
pub use sequencer::Sequencer;
