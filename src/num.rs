//! Utilities related to numbers.

use ieee754;
use num;
use std::fmt;

/// Floating point marker trait for easier control over trait bounds.
pub trait Floating:
    Sync + Send + 'static + num::Float + num::cast::FromPrimitive + ieee754::Ieee754 + fmt::Debug
{
}

impl Floating for f32 {}
impl Floating for f64 {}
