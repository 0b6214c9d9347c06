mod dataset;

pub use dataset::{Cell, Dataset};
