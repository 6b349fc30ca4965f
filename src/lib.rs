#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// #![warn(clippy::cargo)]

pub mod batch;
pub mod config;
pub mod correction;
pub mod cutoff;
pub mod efficiency;
pub mod error;
pub mod growth;
pub mod lognormal;
pub mod math;
pub(crate) mod minimisation;
pub mod pipeline;
pub mod sensitivity;
pub mod spectrum;
pub mod synthesis;
pub mod table;

pub use error::{Error, FitFailure};

pub type Result<T> = ::std::result::Result<T, Error>;
