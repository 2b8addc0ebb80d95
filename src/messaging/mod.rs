pub mod broker;
pub mod correlation;
pub mod dispatcher;
pub mod listener;
pub mod reply;
