//! Chunked upload reassembly and archive ingest.
//!
//! Large bundles are uploaded in fixed-size chunks, reassembled server-side
//! and turned into a published asset space:
//! - `plan_chunks()` - client-side split of a file into chunks
//! - `ChunkReassembler` - stores chunks in any order and merges them
//! - `ZipUnpacker` - extracts a merged archive
//! - `prepare_bundle()` - title, layout fix-up and cover image of a bundle
//! - `IngestPipeline` - unpack, pack and publish in one step

pub mod bundle;
pub mod chunks;
pub mod error;
pub mod ingest;
pub mod reassembler;
pub mod session;
pub mod unpack;

// Re-export main types
pub use bundle::{prepare_bundle, BundleInfo};
pub use chunks::{expected_chunk_count, plan_chunks, ChunkPlan};
pub use error::UploadError;
pub use ingest::{IngestPipeline, IngestReport};
pub use reassembler::{
    ChunkReassembler, MergedUpload, ReapReport, ReassemblerOptions, DEFAULT_REAPER_INTERVAL,
};
pub use session::{SessionState, SessionStatus};
pub use unpack::{UnpackReport, Unpacker, ZipUnpacker};
