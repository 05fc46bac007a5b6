//! # POST /signature, POST /signature/{token}
//!
//! 2フェーズ署名のHTTPインターフェース。

mod handler;

pub use handler::{handle_complete, handle_start};

#[cfg(test)]
mod tests;
