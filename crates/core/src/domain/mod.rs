pub mod parameters;
pub mod results;
pub mod session;
pub mod stage;
