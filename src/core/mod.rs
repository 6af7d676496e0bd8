pub mod builder;
pub mod mapper;
pub mod modifier;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::{BuildSummary, ImageBuilder};
pub use mapper::{IsoPath, MappedNames};
pub use modifier::{IsoModifier, Outcome};
