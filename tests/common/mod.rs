#![allow(dead_code)]

pub mod raw_http;
pub mod server;
