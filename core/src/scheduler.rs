//! timer ticks and manual triggers, one cycle at a time.
//!
//! # single flight
//!
//! `try_begin` flips `running` under the state lock and hands back a
//! [`FlightGuard`]; dropping the guard clears it. a trigger that finds a
//! cycle in flight returns `Skipped` and bumps the skip counter.
//!
//! # schedule
//!
//! ticks sit on interval boundaries counted from local midnight in a fixed
//! utc offset. the boundary sequence restarts every midnight, so an interval
//! that does not divide a day leaves a short last slot.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Offset, Timelike, Utc};
use crank_content::StorageGateway;
use crank_record::RecordStore;
use crank_traits::{CycleTrigger, LedgerClient, TriggerOutcome};
use serde_json::json;
use tokio::sync::watch;

use crate::cycle::{CrankCycle, CycleReport};

const DAY_MS: i64 = 86_400_000;

/// something that runs one full cycle.
#[async_trait]
pub trait CycleRunner: Send + Sync {
    async fn run_cycle(&self) -> CycleReport;
}

#[async_trait]
impl<L, G, S> CycleRunner for CrankCycle<L, G, S>
where
    L: LedgerClient + Clone,
    G: StorageGateway,
    S: RecordStore,
{
    async fn run_cycle(&self) -> CycleReport {
        self.run().await
    }
}

/// parse `UTC`, `+HH:MM` or `-HH:MM`.
pub fn parse_utc_offset(value: &str) -> Option<FixedOffset> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("utc") || value == "Z" {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = match value.as_bytes().first()? {
        b'+' => (1, &value[1..]),
        b'-' => (-1, &value[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    if hours.len() != 2 || minutes.len() != 2 {
        return None;
    }
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// fixed interval aligned to local midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    interval: Duration,
    offset: FixedOffset,
}

impl Schedule {
    /// `None` for intervals under one second.
    pub fn new(interval: Duration, offset: FixedOffset) -> Option<Self> {
        if interval < Duration::from_secs(1) {
            return None;
        }
        Some(Self { interval, offset })
    }

    /// every hour on the hour, utc.
    pub fn hourly() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            offset: Utc.fix(),
        }
    }

    #[inline]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[inline]
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// first boundary strictly after `now`.
    pub fn next_tick_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = now.with_timezone(&self.offset);
        let into_day_ms = local.num_seconds_from_midnight() as i64 * 1000
            + (local.nanosecond() % 1_000_000_000) as i64 / 1_000_000;
        let midnight = now - chrono::Duration::milliseconds(into_day_ms);

        let interval_ms = (self.interval.as_millis() as i64).clamp(1, DAY_MS);
        let slot = into_day_ms / interval_ms + 1;
        let offset_ms = (slot * interval_ms).min(DAY_MS);
        midnight + chrono::Duration::milliseconds(offset_ms)
    }
}

/// last finished cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleSummary {
    pub finished_at: DateTime<Utc>,
    pub report: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedulerState {
    pub running: bool,
    pub last_result: Option<CycleSummary>,
    pub runs: u64,
    pub skipped: u64,
}

/// clears `running` when dropped.
pub struct FlightGuard<'s> {
    state: &'s Mutex<SchedulerState>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        lock(self.state).running = false;
    }
}

fn lock(state: &Mutex<SchedulerState>) -> MutexGuard<'_, SchedulerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// result of `Scheduler::trigger`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Ran(CycleReport),
    Skipped,
}

pub struct Scheduler<R> {
    runner: R,
    schedule: Schedule,
    state: Mutex<SchedulerState>,
}

impl<R: CycleRunner> Scheduler<R> {
    pub fn new(runner: R, schedule: Schedule) -> Self {
        Self {
            runner,
            schedule,
            state: Mutex::new(SchedulerState::default()),
        }
    }

    #[inline]
    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// snapshot of the scheduler state.
    pub fn state(&self) -> SchedulerState {
        lock(&self.state).clone()
    }

    /// claim the single flight slot, or count a skip.
    pub fn try_begin(&self) -> Option<FlightGuard<'_>> {
        let mut state = lock(&self.state);
        if state.running {
            state.skipped += 1;
            return None;
        }
        state.running = true;
        Some(FlightGuard { state: &self.state })
    }

    /// run one cycle unless one is already in flight.
    pub async fn trigger(&self) -> RunOutcome {
        let Some(guard) = self.try_begin() else {
            log_skip();
            return RunOutcome::Skipped;
        };

        let report = self.runner.run_cycle().await;
        {
            let mut state = lock(&self.state);
            state.runs += 1;
            state.last_result = Some(CycleSummary {
                finished_at: Utc::now(),
                report: report.to_json(),
            });
        }
        drop(guard);
        RunOutcome::Ran(report)
    }

    /// timer loop until `shutdown` turns true or its sender goes away.
    ///
    /// each cycle finishes before the next tick is armed.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            interval_secs = self.schedule.interval.as_secs(),
            offset = %self.schedule.offset,
            "scheduler started"
        );
        let mut last_tick: Option<DateTime<Utc>> = None;

        while !*shutdown.borrow() {
            let now = Utc::now();
            let from = last_tick.map_or(now, |t| t.max(now));
            let next = self.schedule.next_tick_after(from);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            tracing::debug!(next = %next, wait_ms = wait.as_millis() as u64, "next tick");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }
            last_tick = Some(next);

            match self.trigger().await {
                RunOutcome::Ran(report) => tracing::info!(
                    outcome = %report.to_json()["outcome"],
                    duration_ms = report.duration.as_millis() as u64,
                    "tick finished"
                ),
                RunOutcome::Skipped => {}
            }
        }
        tracing::info!("scheduler stopped");
    }

    pub fn status_json(&self) -> serde_json::Value {
        let state = self.state();
        let next_tick = self.schedule.next_tick_after(Utc::now());
        json!({
            "running": state.running,
            "runs": state.runs,
            "skipped": state.skipped,
            "intervalSecs": self.schedule.interval.as_secs(),
            "utcOffset": self.schedule.offset.to_string(),
            "nextTick": next_tick.to_rfc3339(),
            "lastResult": state.last_result.map(|s| json!({
                "finishedAt": s.finished_at.to_rfc3339(),
                "report": s.report,
            })),
        })
    }
}

fn log_skip() {
    tracing::info!("cycle already running, trigger skipped");
}

#[async_trait]
impl<R: CycleRunner> CycleTrigger for Scheduler<R> {
    async fn trigger(&self) -> TriggerOutcome {
        match Scheduler::trigger(self).await {
            RunOutcome::Ran(report) => TriggerOutcome::Ran(report.to_json()),
            RunOutcome::Skipped => TriggerOutcome::Skipped,
        }
    }

    fn status(&self) -> serde_json::Value {
        self.status_json()
    }
}
