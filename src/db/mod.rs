pub mod editor;
pub mod migration;
