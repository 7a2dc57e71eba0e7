pub mod compression;
pub mod frame;
pub mod tile;
pub mod view;
