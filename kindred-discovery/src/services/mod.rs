pub mod discovery;
pub mod feed;
pub mod messaging;
pub mod profile_service;
