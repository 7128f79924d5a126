use crate::chain::EmittedEvent;
use crate::felt::{selector, Felt};

/// Domain events the synchronizer projects; everything else is ignored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MarketCreated,
    MarketResolved,
    WagerPlaced,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [
        EventKind::MarketCreated,
        EventKind::MarketResolved,
        EventKind::WagerPlaced,
    ];

    /// Event name as declared in the contract ABI
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::MarketCreated => "MarketCreated",
            EventKind::MarketResolved => "MarketResolved",
            EventKind::WagerPlaced => "WagerPlaced",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Maps an event's first key to an [`EventKind`] by exact selector match.
pub struct EventClassifier {
    selectors: Vec<(Felt, EventKind)>,
}

impl EventClassifier {
    pub fn new() -> Self {
        let selectors = EventKind::ALL
            .iter()
            .map(|kind| (selector(kind.name()), *kind))
            .collect();
        Self { selectors }
    }

    pub fn classify(&self, event: &EmittedEvent) -> Option<EventKind> {
        let key = event.keys.first()?;
        self.selectors
            .iter()
            .find(|(sel, _)| sel == key)
            .map(|(_, kind)| *kind)
    }
}

impl Default for EventClassifier {
    fn default() -> Self {
        Self::new()
    }
}
