mod error;
mod flags;
mod net;
mod opt;
mod problem;
mod sparse;
mod walk;

pub mod cases;
pub mod constr;
pub mod debug;
pub mod func;
pub mod heur;

#[cfg(test)]
mod tests;

pub use constr::*;
pub use error::*;
pub use flags::*;
pub use func::*;
pub use heur::*;
pub use net::*;
pub use opt::*;
pub use problem::*;
pub use sparse::*;
