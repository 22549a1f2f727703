//! CSV dataset reading and result reporting for tessera-rf forests.

mod domain;
mod error;
mod reader;
mod writer;

pub use domain::ExperimentName;
pub use error::IoError;
pub use reader::FrameReader;
pub use writer::{ResultWriter, load_model};
