pub mod redistribution;

pub use redistribution::{
    Destination, PlanSummary, RedistributionPlan, RedistributionPlanner, hash_target,
};
