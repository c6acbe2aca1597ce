//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the engine:
//! - Math types and the pure transform/projection builders
//! - Triangle geometry and polygon triangulation
//! - Frame timing
//! - Logging setup

pub mod geometry;
pub mod logging;
pub mod math;
pub mod time;
