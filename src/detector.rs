use crate::types::{ChangeEvent, ListingSnapshot};

/// Compare the previously observed snapshot of a listing against the freshly
/// fetched one, yielding every detected change.
///
/// A listing seen for the first time is a baseline and yields no events. The
/// three rules are evaluated independently, so a single cycle can emit
/// several events for one listing. Order per listing is fixed: status, then
/// price, then open house.
pub fn detect(previous: Option<&ListingSnapshot>, current: &ListingSnapshot) -> Vec<ChangeEvent> {
    let Some(prev) = previous else {
        return Vec::new();
    };

    let mut events = Vec::new();

    if prev.status != current.status {
        events.push(ChangeEvent::StatusChanged {
            old: prev.status.clone(),
            new: current.status.clone(),
        });
    }

    if prev.price != current.price {
        events.push(ChangeEvent::PriceChanged {
            old: prev.price,
            new: current.price,
        });
    }

    // Structural, null-safe compare. Only an added or replaced schedule is
    // announced; a removed one leaves nothing to notify about.
    if prev.open_house != current.open_house
        && let Some(details) = &current.open_house
    {
        events.push(ChangeEvent::OpenHouseAdded {
            details: details.clone(),
        });
    }

    events
}
