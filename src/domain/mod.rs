// Domain layer: value objects and ports (interfaces). No runtime dependencies beyond serde.

pub mod distribution;
pub mod feature;
pub mod feature_domain;
pub mod model;
pub mod ports;
pub mod value;

pub use distribution::FeatureDistribution;
pub use feature::{Feature, Type};
pub use feature_domain::{CategorySet, FeatureDomain};
pub use model::{Output, Prediction, PredictionInput, PredictionOutput};
pub use ports::PredictionProvider;
pub use value::{Currency, TimeUnit, Uri, Value};
