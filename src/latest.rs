use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identifies one in-flight fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// Generation counter shared between whoever issues fetches and whoever
/// applies their results. Issuing a new ticket invalidates every older one,
/// so a slow response for an earlier selection can never overwrite a newer one.
#[derive(Debug, Clone, Default)]
pub struct LatestRequest {
    generation: Arc<AtomicU64>,
}

impl LatestRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> Ticket {
        Ticket(self.generation.fetch_add(1, Ordering::AcqRel) + 1)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.generation.load(Ordering::Acquire) == ticket.0
    }
}

/// Decides when a carousel may move on. While the current slide's fetch is
/// outstanding, ticks are held, up to `max_held` in a row; after that the
/// carousel advances anyway and the late result goes stale.
#[derive(Debug)]
pub struct SlidePacer {
    max_held: u32,
    held: u32,
    pending: Option<Ticket>,
}

impl SlidePacer {
    pub fn new(max_held: u32) -> Self {
        Self {
            max_held,
            held: 0,
            pending: None,
        }
    }

    /// Returns true when this tick should advance to the next slide.
    pub fn tick(&mut self) -> bool {
        if self.pending.is_some() && self.held < self.max_held {
            self.held += 1;
            return false;
        }
        self.held = 0;
        true
    }

    pub fn started(&mut self, ticket: Ticket) {
        self.pending = Some(ticket);
        self.held = 0;
    }

    pub fn finished(&mut self, ticket: Ticket) {
        if self.pending == Some(ticket) {
            self.pending = None;
            self.held = 0;
        }
    }

    pub fn held(&self) -> u32 {
        self.held
    }
}
