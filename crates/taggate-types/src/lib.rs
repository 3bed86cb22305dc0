pub mod api;
pub mod models;
pub mod time;
pub mod window;
