pub mod event;

pub use event::{
    CancelResponse, CompletionResponse, CreateEventRequest, EventResponse, EventStatus,
    ExtendEventRequest, ListEventsQuery, RerollRequest,
};
