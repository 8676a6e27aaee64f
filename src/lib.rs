//! Translates LaTeX sources, LaTeX project archives and Word documents while keeping math,
//! markup and references byte for byte.

pub mod archive;
pub mod chunker;
pub mod config;
pub mod docx;
pub mod error;
pub mod freezer;
pub mod latex;
pub mod logging;
pub mod models;
pub mod package;
pub mod pipeline;
pub mod progress;
pub mod quality;
pub mod sentinels;
pub mod textutil;
pub mod translator;
