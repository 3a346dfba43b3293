pub mod dispatch;
pub mod event_logger;
pub mod ip_rate_limit;
pub mod leader_election;
pub mod rate_limiter;
pub mod template;
pub mod webhook_signature;
