//! Local mirror of product images.
//!
//! Files are named after a hash of their source URL, so mirroring the same
//! URL twice is a no-op. An `index.json` next to the files records the source
//! URL, MIME type, size and download time of every mirrored image.

mod mirror;
mod naming;

pub use mirror::{
    CleanupReport, ImageError, ImageFile, ImageMirror, ImageMirrorConfig, ImageRecord,
};
pub use naming::{filename_for, is_valid_filename};

pub(crate) use mirror::{METRIC_IMAGE_DOWNLOAD, METRIC_IMAGE_HIT};
