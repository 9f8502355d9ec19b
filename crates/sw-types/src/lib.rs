pub mod data;
pub mod errors;
pub mod experiment;
pub mod search;
pub mod trial;

pub use data::*;
pub use errors::*;
pub use experiment::*;
pub use search::*;
pub use trial::*;
