mod expander;
mod filter;

pub use expander::GroupRegistry;
pub use filter::GroupFilters;
