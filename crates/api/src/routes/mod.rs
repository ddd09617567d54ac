pub mod health;
pub mod workscript;
