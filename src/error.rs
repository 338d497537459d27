//! Error taxonomy of the routing pipeline.
//!
//! Three kinds of problems can happen during a run:
//! - [`InputValidationError`]: the instance is rejected before any model is built;
//! - [`SolverFailure`]: the engine did not prove optimality, decoding is skipped;
//! - [`PostSolveInconsistency`]: an "optimal" assignment breaks a constraint family
//!   when re-checked, which points at a modeling defect rather than a runtime fault.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Constraint families emitted by the formulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConstraintFamily {
    VisitOnce,
    DepotFlow,
    FlowConservation,
    Capacity,
    LoadLink,
    VehicleUse,
    TimeWindow,
    ArcTimePropagation,
}

impl fmt::Display for ConstraintFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConstraintFamily::VisitOnce => "visit_once",
            ConstraintFamily::DepotFlow => "depot_flow",
            ConstraintFamily::FlowConservation => "flow_conservation",
            ConstraintFamily::Capacity => "capacity",
            ConstraintFamily::LoadLink => "load_link",
            ConstraintFamily::VehicleUse => "vehicle_use",
            ConstraintFamily::TimeWindow => "time_window",
            ConstraintFamily::ArcTimePropagation => "arc_time_propagation",
        };
        f.write_str(name)
    }
}

/// Rejection of a problem instance before formulation.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValidationError {
    /// A count that must be strictly positive was zero.
    NonPositiveCount { what: &'static str, value: usize },
    /// `start > end`, or a bound outside `[0, 1440)` minutes.
    MalformedTimeWindow { customer: usize, start: u32, end: u32 },
    /// Clock time with hour >= 24 or minute >= 60.
    InvalidClockTime { customer: usize, hour: u32, minute: u32 },
    /// A time window was given for an id outside `1..=num_customers`.
    UnknownCustomer { customer: usize, num_customers: usize },
    /// Time windows are enabled but one customer has none.
    MissingTimeWindow { customer: usize },
    /// An externally supplied vector does not have one entry per customer.
    LengthMismatch { what: &'static str, expected: usize, found: usize },
    /// A supplied demand outside the goods pool `0..num_goods`.
    DemandOutOfPool { customer: usize, demand: u32, num_goods: usize },
    /// Negative or non-finite capacity.
    InvalidCapacity(f64),
    /// Non-finite coordinate.
    InvalidLocation { customer: usize },
}

impl fmt::Display for InputValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputValidationError::NonPositiveCount { what, value } => {
                write!(f, "{} must be positive (got {})", what, value)
            }
            InputValidationError::MalformedTimeWindow { customer, start, end } => write!(
                f,
                "customer {}: malformed time window [{}, {}] (need start <= end < 1440)",
                customer, start, end
            ),
            InputValidationError::InvalidClockTime { customer, hour, minute } => {
                write!(f, "customer {}: invalid clock time {:02}:{:02}", customer, hour, minute)
            }
            InputValidationError::UnknownCustomer { customer, num_customers } => write!(
                f,
                "time window given for customer {} but ids run from 1 to {}",
                customer, num_customers
            ),
            InputValidationError::MissingTimeWindow { customer } => {
                write!(f, "customer {} has no time window", customer)
            }
            InputValidationError::LengthMismatch { what, expected, found } => {
                write!(f, "expected {} {} but {} were supplied", expected, what, found)
            }
            InputValidationError::DemandOutOfPool { customer, demand, num_goods } => write!(
                f,
                "customer {}: demand {} is outside the goods pool 0..{}",
                customer, demand, num_goods
            ),
            InputValidationError::InvalidCapacity(c) => write!(f, "invalid vehicle capacity {}", c),
            InputValidationError::InvalidLocation { customer } => {
                write!(f, "customer {} has a non-finite coordinate", customer)
            }
        }
    }
}

impl std::error::Error for InputValidationError {}

/// Why the solver did not return an optimal assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SolverFailure {
    Infeasible,
    Unbounded,
    TimedOut,
    Engine(String),
}

impl fmt::Display for SolverFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverFailure::Infeasible => f.write_str("model is infeasible"),
            SolverFailure::Unbounded => f.write_str("model is unbounded"),
            SolverFailure::TimedOut => f.write_str("time limit reached before optimality"),
            SolverFailure::Engine(msg) => write!(f, "engine error: {}", msg),
        }
    }
}

impl std::error::Error for SolverFailure {}

/// A decoded route that breaks a constraint family despite an optimal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostSolveInconsistency {
    pub family: ConstraintFamily,
    /// Vehicle concerned, if the violation is per vehicle.
    pub vehicle: Option<usize>,
    /// Customer concerned, if the violation is per customer.
    pub customer: Option<usize>,
    pub detail: String,
}

impl fmt::Display for PostSolveInconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.family)?;
        if let Some(k) = self.vehicle {
            write!(f, " vehicle {}", k)?;
        }
        if let Some(i) = self.customer {
            write!(f, " customer {}", i)?;
        }
        write!(f, ": {}", self.detail)
    }
}

/// Crate-level error for operations that touch the outside world.
#[derive(Debug)]
pub enum Error {
    Validation(InputValidationError),
    Io(std::io::Error),
    Json(serde_json::Error),
    Csv(csv::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Validation(e) => write!(f, "invalid input: {}", e),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Json(e) => write!(f, "JSON error: {}", e),
            Error::Csv(e) => write!(f, "CSV error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Validation(e) => Some(e),
            Error::Io(e) => Some(e),
            Error::Json(e) => Some(e),
            Error::Csv(e) => Some(e),
        }
    }
}

impl From<InputValidationError> for Error {
    fn from(e: InputValidationError) -> Self {
        Error::Validation(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        Error::Csv(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_offender() {
        let e = InputValidationError::MalformedTimeWindow { customer: 3, start: 600, end: 500 };
        let msg = e.to_string();
        assert!(msg.contains("customer 3"));
        assert!(msg.contains("[600, 500]"));

        let p = PostSolveInconsistency {
            family: ConstraintFamily::Capacity,
            vehicle: Some(1),
            customer: None,
            detail: "load 12 > capacity 10".to_string(),
        };
        assert_eq!(p.to_string(), "[capacity] vehicle 1: load 12 > capacity 10");
    }
}
