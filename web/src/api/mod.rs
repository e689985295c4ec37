pub mod dataset;
pub mod headers;
