#![forbid(unsafe_code)]

pub mod alias;
pub mod assets;
pub mod check;
pub mod cli;
pub mod cms;
pub mod config;
pub mod dedup;
pub mod export;
pub mod formats;
pub mod logging;
pub mod menu;
pub mod normalize;
pub mod path;
pub mod resolve;
pub mod site;
pub mod text;
