#![cfg_attr(target_os = "none", no_std)]

pub mod config;
pub mod drivers;
pub mod hal;
pub mod npu;
