//! # Rally Storage
//!
//! File collaborator and load/save session for rally annotation files.
//!
//! ## Layout
//!
//! ```text
//! <root>/
//!   rally001/
//!     000001.jpg ...          frame images
//!     rally001.txt            frame annotations (CSV)
//!     rally001_tracklets.txt  tracklet detail side file
//! ```
//!
//! All file access goes through [`RallyFs`]; [`LocalFs`] writes through a temp file and a
//! rename so readers never observe a partial write. Transient I/O failures are retried with
//! [`RetryPolicy`].

mod error;
mod fs;
mod rally;
mod retry;
mod session;

pub use error::{Result, StorageError};
pub use fs::{image_mime_type, DirEntryInfo, LocalFs, RallyFs};
pub use rally::{discover_rallies, frame_image_path, open_rally_folder, RallyFolder};
pub use retry::{with_retry, RetryPolicy};
pub use session::{AnnotationSession, SaveStatus};
