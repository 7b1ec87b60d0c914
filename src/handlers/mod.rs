pub mod device;
pub mod hangup_reason;
pub mod incoming_call;
pub mod response;
