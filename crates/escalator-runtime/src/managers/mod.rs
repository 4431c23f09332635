//! Stateful managers owned by the escalator runtime

pub mod operation;

pub use operation::{
    Operation, OperationHandle, OperationListener, OperationManager, StartOptions, Subscription,
};
