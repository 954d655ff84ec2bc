//! Named periodic cadences driven from engine time.
//!
//! Every recurring callback of a session (playhead publication, target
//! resolution, UI refresh) is a lane here. Stopping a session is one
//! `cancel_all` call; tickets handed out before it fail `is_current`.

use serde::{Deserialize, Serialize};

use crate::config::CadenceConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cadence {
    /// Per rendered frame: playhead publication.
    Frame,
    /// Target resolution, paced to human reaction time.
    Tracker,
    /// Singing-line and display refresh.
    Ui,
}

impl Cadence {
    pub const ALL: [Cadence; 3] = [Cadence::Frame, Cadence::Tracker, Cadence::Ui];
}

/// One due run of a cadence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskTicket {
    pub cadence: Cadence,
    pub due_at: f64,
    generation: u64,
}

#[derive(Debug, Clone)]
struct Lane {
    cadence: Cadence,
    period: f64,
    next_due: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct CadenceScheduler {
    lanes: Vec<Lane>,
    generation: u64,
}

impl CadenceScheduler {
    pub fn new(config: &CadenceConfig) -> Self {
        let period = |ms: f64| (ms / 1000.0).max(1e-4);
        let lanes = Cadence::ALL
            .iter()
            .map(|&cadence| Lane {
                cadence,
                period: match cadence {
                    Cadence::Frame => period(config.frame_interval_ms),
                    Cadence::Tracker => period(config.tracker_interval_ms),
                    Cadence::Ui => period(config.ui_interval_ms),
                },
                next_due: None,
            })
            .collect();
        Self {
            lanes,
            generation: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.lanes.iter().any(|lane| lane.next_due.is_some())
    }

    pub fn period(&self, cadence: Cadence) -> Option<f64> {
        self.lanes
            .iter()
            .find(|lane| lane.cadence == cadence)
            .map(|lane| lane.period)
    }

    /// Arms every lane; each fires at the first poll at or after `now`.
    /// Tickets from an earlier run become stale.
    pub fn start(&mut self, now: f64) {
        self.generation += 1;
        for lane in &mut self.lanes {
            lane.next_due = Some(now);
        }
    }

    pub fn cancel_all(&mut self) {
        self.generation += 1;
        for lane in &mut self.lanes {
            lane.next_due = None;
        }
    }

    /// Fills `due` with the cadences due at `now`, in `Frame`, `Tracker`,
    /// `Ui` order. A lane that missed several periods fires once.
    pub fn poll(&mut self, now: f64, due: &mut Vec<TaskTicket>) {
        due.clear();
        let generation = self.generation;
        for lane in &mut self.lanes {
            let Some(next) = lane.next_due else {
                continue;
            };
            if now < next {
                continue;
            }
            let missed = ((now - next) / lane.period).floor() + 1.0;
            let mut following = next + missed * lane.period;
            if following <= now {
                following += lane.period;
            }
            lane.next_due = Some(following);
            due.push(TaskTicket {
                cadence: lane.cadence,
                due_at: next,
                generation,
            });
        }
    }

    pub fn is_current(&self, ticket: &TaskTicket) -> bool {
        ticket.generation == self.generation && self.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> CadenceScheduler {
        CadenceScheduler::new(&CadenceConfig {
            frame_interval_ms: 10.0,
            tracker_interval_ms: 120.0,
            ui_interval_ms: 75.0,
        })
    }

    fn poll(scheduler: &mut CadenceScheduler, now: f64) -> Vec<TaskTicket> {
        let mut due = Vec::new();
        scheduler.poll(now, &mut due);
        due
    }

    fn cadences(tickets: &[TaskTicket]) -> Vec<Cadence> {
        tickets.iter().map(|ticket| ticket.cadence).collect()
    }

    #[test]
    fn idle_until_started() {
        let mut scheduler = scheduler();
        assert!(poll(&mut scheduler, 1.0).is_empty());
        assert!(!scheduler.is_active());
    }

    #[test]
    fn fires_in_fixed_order_at_own_rates() {
        let mut scheduler = scheduler();
        scheduler.start(0.0);

        let first = poll(&mut scheduler, 0.0);
        assert_eq!(cadences(&first), Cadence::ALL.to_vec());

        assert_eq!(cadences(&poll(&mut scheduler, 0.05)), vec![Cadence::Frame]);
        assert_eq!(
            cadences(&poll(&mut scheduler, 0.08)),
            vec![Cadence::Frame, Cadence::Ui]
        );
        assert_eq!(
            cadences(&poll(&mut scheduler, 0.125)),
            vec![Cadence::Frame, Cadence::Tracker]
        );
    }

    #[test]
    fn coalesces_missed_periods() {
        let mut scheduler = scheduler();
        scheduler.start(0.0);
        poll(&mut scheduler, 0.0);

        let late = poll(&mut scheduler, 1.0);
        assert_eq!(late.len(), 3);
        assert!(poll(&mut scheduler, 1.001).is_empty());
        assert_eq!(cadences(&poll(&mut scheduler, 1.015)), vec![Cadence::Frame]);
    }

    #[test]
    fn cancel_invalidates_outstanding_tickets() {
        let mut scheduler = scheduler();
        scheduler.start(0.0);
        let tickets = poll(&mut scheduler, 0.0);
        assert!(tickets.iter().all(|ticket| scheduler.is_current(ticket)));

        scheduler.cancel_all();
        assert!(tickets.iter().all(|ticket| !scheduler.is_current(ticket)));
        assert!(poll(&mut scheduler, 5.0).is_empty());

        scheduler.start(5.0);
        assert!(tickets.iter().all(|ticket| !scheduler.is_current(ticket)));
        assert_eq!(poll(&mut scheduler, 5.0).len(), 3);
    }

    #[test]
    fn poll_reuses_the_callers_buffer() {
        let mut scheduler = scheduler();
        let mut due = Vec::with_capacity(Cadence::ALL.len());
        let buffer = due.as_ptr();
        scheduler.start(0.0);

        scheduler.poll(0.0, &mut due);
        assert_eq!(due.len(), 3);
        scheduler.poll(0.05, &mut due);
        assert_eq!(cadences(&due), vec![Cadence::Frame]);
        scheduler.poll(0.051, &mut due);
        assert!(due.is_empty());
        assert_eq!(due.as_ptr(), buffer);
    }
}
