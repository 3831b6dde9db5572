pub mod logging;
pub mod rest;
pub mod state;
