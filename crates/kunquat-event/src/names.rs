//! Two-character event namespace. Each name is classified into a coarse
//! category so the scheduler and bind runtime can treat whole families
//! uniformly (e.g. "does this event touch the cursor?") without a match
//! arm per concrete name.

/// Note on, e.g. `n+`.
pub const NOTE_ON: &str = "n+";
/// Note off, e.g. `n-`.
pub const NOTE_OFF: &str = "n-";
/// Set force, e.g. `.f`.
pub const SET_FORCE: &str = ".f";
/// Pattern jump.
pub const PATTERN_JUMP: &str = "mj";
/// Set tempo.
pub const SET_TEMPO: &str = "m.t";
/// Tempo slide target.
pub const TEMPO_SLIDE_TARGET: &str = "m/t";
/// Tempo slide length.
pub const TEMPO_SLIDE_LENGTH: &str = "m/=t";
/// Pattern delay.
pub const PATTERN_DELAY: &str = "mpd";
/// Query prefix; the handler enqueues an `A*` reply.
pub const QUERY_PREFIX: &str = "q";
/// Query-answer prefix.
pub const ANSWER_PREFIX: &str = "A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    Note,
    Control,
    Master,
    Query,
    Answer,
    Unknown,
}

/// Classify an event name by its namespace prefix. Unrecognized names are
/// `Unknown`, not an error: the runtime ignores them with a warning rather
/// than rejecting the whole event stream.
pub fn categorize(name: &str) -> EventCategory {
    if name.starts_with(ANSWER_PREFIX) && name.len() > 1 {
        return EventCategory::Answer;
    }
    if name.starts_with(QUERY_PREFIX) && name.starts_with("q*") {
        return EventCategory::Query;
    }
    match name {
        NOTE_ON | NOTE_OFF => EventCategory::Note,
        SET_FORCE => EventCategory::Control,
        PATTERN_JUMP | SET_TEMPO | TEMPO_SLIDE_TARGET | TEMPO_SLIDE_LENGTH | PATTERN_DELAY => {
            EventCategory::Master
        }
        _ if name.starts_with('.') => EventCategory::Control,
        _ if name.starts_with('m') => EventCategory::Master,
        _ => EventCategory::Unknown,
    }
}

pub fn is_known(name: &str) -> bool {
    !matches!(categorize(name), EventCategory::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_events_classify_as_note() {
        assert_eq!(categorize(NOTE_ON), EventCategory::Note);
        assert_eq!(categorize(NOTE_OFF), EventCategory::Note);
    }

    #[test]
    fn master_events_classify_as_master() {
        assert_eq!(categorize(PATTERN_JUMP), EventCategory::Master);
        assert_eq!(categorize(SET_TEMPO), EventCategory::Master);
        assert_eq!(categorize(TEMPO_SLIDE_LENGTH), EventCategory::Master);
    }

    #[test]
    fn query_and_answer_prefixes_are_recognized() {
        assert_eq!(categorize("q*"), EventCategory::Query);
        assert_eq!(categorize("A*"), EventCategory::Answer);
    }

    #[test]
    fn unrecognized_name_is_unknown() {
        assert_eq!(categorize("zz"), EventCategory::Unknown);
        assert!(!is_known("zz"));
    }
}
