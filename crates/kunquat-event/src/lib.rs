mod bind;
mod event;
mod names;
mod queue;
mod runtime;

pub use bind::{BindRule, BindTable, Substitution};
pub use event::{Event, EventWireError};
pub use names::{categorize, is_known, EventCategory, ANSWER_PREFIX};
pub use queue::{PendingQueue, ScheduledEvent, ScheduledQueue};
pub use runtime::{EventHandler, EventRuntime};
