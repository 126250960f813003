pub mod health;
pub mod process;
pub mod validation;
