pub mod app;
pub mod assets;
pub mod auth;
pub mod shutdown;
pub mod url;
pub mod websocket;

pub use app::App;
