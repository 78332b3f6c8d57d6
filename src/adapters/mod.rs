// Adapters layer: concrete model capabilities behind the PredictionProvider port.

pub mod model;

pub use model::{FnModel, LinearModel};
