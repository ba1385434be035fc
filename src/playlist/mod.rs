pub mod generator;
pub mod naming;
pub mod normalize;
pub mod scoring;
pub mod seeds;
pub mod stats;
pub mod trackset;

pub use generator::{GenerateRequest, GenerationOutcome, PlaylistGenerator};
pub use stats::PlaylistStatistics;
