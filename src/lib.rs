//! Real-time score following: estimates where a live performance is within
//! a reference performance, from audio alone.
//!
//! Audio hops go through [`analyzer::FrameAnalyzer`], which turns full
//! windows into chroma [`feature::FeatureVector`]s. A
//! [`matcher::PositionMatcher`] aligns each vector against the reference
//! sequence and reports a reference index; [`pager::PositionPager`] maps
//! that index onto the nearest display marker.

pub mod analyzer;
pub mod audio;
pub mod config;
pub mod error;
pub mod feature;
pub mod gate;
pub mod logger;
pub mod matcher;
pub mod pager;
pub mod ring;
pub mod score;
pub mod stats;
pub mod window;

pub use config::Parameters;
pub use error::{ Error, Result };
