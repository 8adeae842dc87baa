//! Media compilation actions: chunk concatenation, container remuxing and
//! transcoding into the stored container.

mod concat;
mod remux;
mod transcode;

pub use concat::{append_chunks, concat_with_ffmpeg};
pub use remux::remux;
pub use transcode::transcode_to_webm;
