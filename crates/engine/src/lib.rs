pub mod catalog;
pub mod editor;
pub mod formula;
pub mod indicator;
pub mod session;
