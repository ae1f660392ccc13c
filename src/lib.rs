pub mod aggregate;
pub mod engine;
pub mod error;
pub mod export;
pub mod io;
pub mod namespace;
pub mod passwd;
pub mod record;
pub mod report;
pub mod split;
pub mod track;

pub mod prelude {
    pub use crate::aggregate::MountSummary;
    pub use crate::engine::{Engine, Pass};
    pub use crate::error::PassError;
    pub use crate::namespace::NamespaceFilter;
    pub use crate::passwd::PathFilter;
    pub use crate::track::Tracker;
}
