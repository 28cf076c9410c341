pub mod default_route;
pub mod download_route;
pub mod upload_route;
