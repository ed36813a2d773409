pub mod interview;
pub mod results;
