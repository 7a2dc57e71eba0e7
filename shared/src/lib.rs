pub mod compositing;
pub mod controller;
pub mod delivery;
pub mod env;
pub mod errors;
pub mod graphics;
pub mod logger;
pub mod models;
pub mod networking;
