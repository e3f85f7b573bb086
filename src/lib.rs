#[cfg(test)]
#[macro_use]
extern crate assert_float_eq;

pub mod alpaca;
pub mod astro_math;
pub mod config;
pub mod mount_control;
pub mod util;
