pub mod fal;
pub mod gemini;
pub mod poller;
pub mod queue;
