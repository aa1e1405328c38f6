//! The `warpgrid` crate builds sparse resampling and warp operators for distributed image registration.
pub mod backend;
pub mod config;
pub mod error;
pub mod indexing;
pub mod interpolation;
pub mod io;
pub mod num;
pub mod operator;
pub mod partition;
pub mod sparse;
