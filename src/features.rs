//! Feature vectorizer: reduces trajectories to fixed-length descriptors.

mod spec;
mod vectorize;

pub use spec::{FeatureSpec, ReferencePoint};
pub use vectorize::{FeatureTable, vectorize};
