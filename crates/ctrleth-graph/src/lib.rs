//! Basic-block graph assembly for analyzed contracts.
//!
//! [`assemble`] turns one engine output into an immutable
//! [`AnalysisResult`](ctrleth_types::AnalysisResult): pc index, merged
//! annotations, jump edges, function entrypoints and coverage. Block tags are
//! derived later, on the read side, by [`tagger`].

pub mod builder;
pub mod merge;
pub mod tagger;

pub use builder::{
    assemble, build_pc_index, coverage, derive_edges, entrypoint_by_function, generate_jumps,
};
pub use merge::AnnotationMerger;
pub use tagger::{add_block_type, add_symbolics, add_type_to_block, tag_blocks, TagStats};
