#![forbid(unsafe_code)]

pub mod adaptive;
pub mod attempts;
pub mod model;
pub mod source;
pub mod time;
pub mod timer;

pub use time::Clock;
