pub mod directory;
pub mod resolver;
pub mod session;
pub mod snapshot;

pub use directory::{ProfileDirectory, SupabaseProfileDirectory};
pub use resolver::IdentityResolver;
pub use session::{IdentitySession, SessionRegistry};
pub use snapshot::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
