#![allow(dead_code)]

pub mod fixtures;
pub mod port;
pub mod wait;
