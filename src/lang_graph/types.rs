pub mod records;
pub mod response;
pub mod state;
