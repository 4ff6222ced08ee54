pub(crate) mod databases; // Database connections, probed on registration
pub(crate) mod paths;     // Files and directories to archive

pub use databases::{ConnectionParams, DatabaseRegistry, DriverType};
pub use paths::{PathEntry, PathRegistry};
