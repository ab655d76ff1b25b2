pub mod channel;
pub mod component;
pub mod config;
pub mod deploy;
pub mod error;
pub mod handler;
pub mod inspector;
pub mod io;
pub mod local;
pub mod paths;
pub mod pipe;
pub mod promotion;
pub mod registrar;
pub mod scaffold;
pub mod session;
pub mod snowflake;
pub mod stage;
pub mod streamlit;
pub mod task;

pub use error::{Result, SnowdevError};
