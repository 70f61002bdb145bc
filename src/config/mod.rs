//! # Configuration Module
//!
//! Settings are layered, last source wins:
//! - built-in defaults
//! - `config/default.toml`, then `config/{RUN_ENV}.toml`
//! - `APP__SECTION__KEY` environment variables (a `.env` file is read first)
//! - plain overrides such as `DATABASE_URL` and `SNOWFLAKE_WORKER_ID`
//!
//! ```rust,ignore
//! use chat_gateway::config::Settings;
//!
//! let settings = Settings::load()?;
//! println!("Gateway heartbeat: {:?}", settings.websocket.heartbeat_interval());
//! ```

mod settings;

pub use settings::*;
