//! Chunked recording and the artifacts it produces

mod artifact;
pub mod mime;
mod object_url;
mod pipeline;
pub mod wav;

pub use artifact::RecordingArtifact;
pub use mime::{file_extension, select_mime_type, DEFAULT_MIME_PREFERENCES};
pub use object_url::{ObjectUrl, ObjectUrls, OBJECT_URL_PREFIX};
pub use pipeline::{RecordingOptions, RecordingPipeline};
pub use wav::{patch_wav_sizes, WavChunkEncoder, WAV_MIME_TYPE};
