pub mod extract;
pub mod notify;
pub mod surface;
pub mod task;
