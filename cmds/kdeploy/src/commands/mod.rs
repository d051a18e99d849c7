pub mod apply;
pub mod args;
pub mod check;
