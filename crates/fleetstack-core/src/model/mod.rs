//! モデル定義
//!
//! FleetStackで使用されるデータモデルを定義します。

mod app;
mod service;
mod unit;

// Re-exports
pub use app::*;
pub use service::*;
pub use unit::*;
