mod constant;
mod lfo;
mod tone;

pub use constant::*;
pub use lfo::*;
pub use tone::*;
