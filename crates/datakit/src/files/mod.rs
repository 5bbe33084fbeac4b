pub mod model;
pub mod registry;

pub use model::{
    FileFilter, FileInfo, FileKind, FileMetadata, FileStatus, ParseStatus, UnifiedFile,
};
pub use registry::FileRegistry;
