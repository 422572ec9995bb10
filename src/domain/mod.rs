pub mod readings;
pub mod sensor;

pub use readings::*;
pub use sensor::*;
