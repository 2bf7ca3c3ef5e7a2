//! 照片社交后端的派生状态子系统：计数一致性、级联删除、通知扇出以及游标分页。

pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;

pub use config::Config;
pub use error::{AppError, Result};
pub use state::AppState;
