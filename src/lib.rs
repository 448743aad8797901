//! phx - Packet hex editor with live length and checksum fields
//!
//! This library provides the field/line/buffer engine shared by phx (TUI editor)
//! and px (CLI tool).

pub mod app;
pub mod buffer;
pub mod convert;
pub mod editor;
pub mod layout;
pub mod ui;
