pub mod cache;
pub mod files;
pub mod policy;
pub mod signer;
pub mod storage;
pub mod thumbnails;
pub mod upload;
