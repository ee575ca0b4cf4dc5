mod archive;
mod outcome;
mod product;
mod release;
mod version;

pub use archive::ArchiveType;
pub use outcome::{ExitResult, UpdateOutcome};
pub use product::{host_arch, ProductProfile};
pub use release::{ReleaseAsset, ReleaseInfo};
pub use version::{VersionRelation, VersionToken};
