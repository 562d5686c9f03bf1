pub mod optimizer;

pub use optimizer::{OptimizerClient, PlanStop, RouteGeometry};
