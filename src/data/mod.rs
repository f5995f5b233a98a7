pub mod class;
pub mod memory;
pub mod project;
pub mod user;
