pub mod frames;
pub mod hub;

pub use frames::{ClientFrame, ServerFrame};
pub use hub::Hub;
