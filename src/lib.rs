pub mod app;
pub mod assets;
pub mod bridge;
pub mod config;
pub mod input;
pub mod logging;
pub mod motion;
pub mod overlay;
pub mod render;
pub mod scene;
pub mod stage;
