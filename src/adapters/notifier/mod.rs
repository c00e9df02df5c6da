//! `Notifier` implementations. The only shipped implementation logs events
//! structurally; real channels (email, Slack, webhook) are external
//! collaborators per spec §1 and are wired in by an operator as a further
//! adapter behind the same port.

mod logging_notifier;

pub use logging_notifier::LoggingNotifier;
