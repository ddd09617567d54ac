pub mod workscript;
