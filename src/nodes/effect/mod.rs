mod delay;
mod gain;

pub use delay::*;
pub use gain::*;
