#![doc = include_str!("../README.md")]

mod error;

pub mod framing;
pub mod image;
pub mod instruments;
pub mod module;
pub mod spacepacket;

pub use error::{Error, Result};
