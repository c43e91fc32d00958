#[allow(clippy::module_inception)]
mod dataframe;
mod series;

/// Eager, realized table.
pub use dataframe::DataFrame;
/// A named, chunked Arrow array.
pub use series::Series;
