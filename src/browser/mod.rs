//! ブラウザ操作（chromiumoxide）

mod client;
mod script;

pub use client::ChromiumClient;
