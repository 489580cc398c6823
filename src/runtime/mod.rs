//! The assembled service and the API surface it presents.

pub mod api;
pub mod service;

pub use api::{
    health, history, schedule, star, stats, ErrorResponse, Health, HistoryQuery, ScheduleResponse,
    StarRequest,
};
pub use service::DispatchService;
