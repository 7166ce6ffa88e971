pub mod api_key;
pub mod file;
pub mod file_usage;
