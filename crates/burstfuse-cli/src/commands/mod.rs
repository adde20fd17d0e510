pub mod config;
pub mod fuse;
pub mod info;
