use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;

use super::SuperstructureId;

/// Lifecycle of a superstructure's derived contours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegenerationState {
    /// Contours reflect the current sources.
    #[default]
    Fresh,
    /// A source changed, or the last regeneration failed.
    Stale,
    Regenerating,
}

#[derive(Debug, Default)]
struct Flight {
    state: RegenerationState,
    rerun: bool,
}

/// Tracks at most one in-flight regeneration per superstructure.
///
/// A trigger that arrives while a regeneration is running does not start a
/// second one; it sets a flag so the running one goes around once more when
/// it finishes. Any number of such triggers coalesce into one rerun.
#[derive(Debug, Default)]
pub struct FlightTable {
    flights: Mutex<HashMap<SuperstructureId, Flight>>,
}

impl FlightTable {
    /// Creates an empty table; untracked ids read as fresh.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of `id`.
    #[must_use]
    pub fn state(&self, id: SuperstructureId) -> RegenerationState {
        self.flights
            .lock()
            .get(&id)
            .map_or(RegenerationState::Fresh, |f| f.state)
    }

    /// Records that a source of `id` changed.
    pub fn mark_stale(&self, id: SuperstructureId) {
        let mut flights = self.flights.lock();
        let flight = flights.entry(id).or_default();
        if flight.state == RegenerationState::Regenerating {
            flight.rerun = true;
        } else {
            flight.state = RegenerationState::Stale;
        }
    }

    /// Claims the regeneration of `id`. Returns `false` if one is already
    /// running; the running one is then asked to rerun.
    pub fn begin(&self, id: SuperstructureId) -> bool {
        let mut flights = self.flights.lock();
        let flight = flights.entry(id).or_default();
        if flight.state == RegenerationState::Regenerating {
            flight.rerun = true;
            false
        } else {
            flight.state = RegenerationState::Regenerating;
            flight.rerun = false;
            true
        }
    }

    /// Ends one pass of a claimed regeneration. Returns `true` if triggers
    /// arrived during the pass and the caller must run again.
    pub fn finish(&self, id: SuperstructureId) -> bool {
        let mut flights = self.flights.lock();
        let Some(flight) = flights.get_mut(&id) else {
            return false;
        };
        if std::mem::take(&mut flight.rerun) {
            true
        } else {
            flight.state = RegenerationState::Fresh;
            false
        }
    }

    /// Ends a claimed regeneration that failed; `id` stays stale.
    pub fn abort(&self, id: SuperstructureId) {
        if let Some(flight) = self.flights.lock().get_mut(&id) {
            flight.state = RegenerationState::Stale;
            flight.rerun = false;
        }
    }

    /// Drops all tracking of `id`.
    pub fn forget(&self, id: SuperstructureId) {
        self.flights.lock().remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triggers_during_flight_coalesce_into_one_rerun() {
        let table = FlightTable::new();
        let id = SuperstructureId::new_v4();
        assert!(table.begin(id));
        assert!(!table.begin(id));
        assert!(!table.begin(id));
        table.mark_stale(id);
        assert_eq!(table.state(id), RegenerationState::Regenerating);
        assert!(table.finish(id));
        assert!(!table.finish(id));
        assert_eq!(table.state(id), RegenerationState::Fresh);
    }

    #[test]
    fn stale_until_regenerated() {
        let table = FlightTable::new();
        let id = SuperstructureId::new_v4();
        assert_eq!(table.state(id), RegenerationState::Fresh);
        table.mark_stale(id);
        assert_eq!(table.state(id), RegenerationState::Stale);
        assert!(table.begin(id));
        table.abort(id);
        assert_eq!(table.state(id), RegenerationState::Stale);
    }

    #[test]
    fn forgotten_flight_finishes_quietly() {
        let table = FlightTable::new();
        let id = SuperstructureId::new_v4();
        assert!(table.begin(id));
        table.forget(id);
        assert!(!table.finish(id));
        assert_eq!(table.state(id), RegenerationState::Fresh);
    }
}
