pub mod builder;
pub mod exclusion;
pub mod period;

pub use builder::{filter_sort, OrderQuery, SortDirection, SortField, SortState};
pub use exclusion::ExclusionSet;
pub use period::{DateRange, Period};
