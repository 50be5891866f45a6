pub mod config;
pub mod handler;
pub mod i18n;
pub mod link;
pub mod qr;
pub mod render;
pub mod server;
pub mod template;
pub mod utils;

pub use config::{AppConfig, DynamicConfig};
pub use handler::AppState;
pub use link::generate_vless_url;
pub use server::Server;
pub use template::TemplateStore;
