pub mod baseline;
pub mod results;
pub mod status;
