pub mod file_info;
pub mod rendition;
pub mod response;
pub mod settings;
