//! Route scoring engine.

mod scoring;

pub use scoring::{
    Priority, Route, RoutePlan, RouteScorer, ScoringWeights, Segment, Shortfall, Waypoint,
    SUFFICIENCY_FLOOR,
};
