//! Rate estimation over stored counter reports.
//!
//! Every function here is pure: callers load the rows and pass the wall
//! clock in, so the policies below are testable without a database.
//!
//! | Condition                                  | Result        |
//! |--------------------------------------------|---------------|
//! | fewer than two reports                     | `(0, 0)`      |
//! | newest report older than liveness interval | `(0, 0)`      |
//! | zero elapsed sender time                   | rate `0`      |
//! | counter went backwards                     | rate `0`      |

use crate::entity::bandwidth;
use chrono::{NaiveDateTime, TimeDelta};
use serde::Serialize;
use std::str::FromStr;

/// Receive and transmit rate of a link, in counter units per second.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Rate {
    pub rx: f64,
    pub tx: f64,
}

impl Rate {
    pub const ZERO: Rate = Rate { rx: 0.0, tx: 0.0 };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Rx,
    Tx,
}

impl Direction {
    pub fn counter(self, report: &bandwidth::Model) -> i64 {
        match self {
            Direction::Rx => report.rx,
            Direction::Tx => report.tx,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Rx => "rx",
            Direction::Tx => "tx",
        }
    }

    /// Column label used on the dashboard charts.
    pub fn label(self) -> &'static str {
        match self {
            Direction::Rx => "Received",
            Direction::Tx => "Sent",
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rx" => Ok(Direction::Rx),
            "tx" => Ok(Direction::Tx),
            other => Err(format!("unknown direction: {}", other)),
        }
    }
}

/// Counter delta over sender-time delta, never negative.
fn interval_rate(first: i64, last: i64, elapsed: f64) -> f64 {
    if elapsed == 0.0 {
        return 0.0;
    }
    let rate = (last as f64 - first as f64) / elapsed;
    if rate > 0.0 { rate } else { 0.0 }
}

/// Current rate from the newest reports of a link, newest first.
///
/// Only the first two entries are looked at.
pub fn current_rate(latest: &[bandwidth::Model], now: NaiveDateTime, alive: TimeDelta) -> Rate {
    let [newest, previous, ..] = latest else {
        return Rate::ZERO;
    };

    if now - newest.update_date > alive {
        return Rate::ZERO;
    }

    let elapsed = newest.time - previous.time;
    Rate {
        rx: interval_rate(previous.rx, newest.rx, elapsed),
        tx: interval_rate(previous.tx, newest.tx, elapsed),
    }
}

/// One rate per sliding window of `window_len` consecutive reports.
///
/// `history` must be oldest first. Each window's rate spans its first and
/// last report, so a window of 3 smooths over two intervals.
pub fn windowed_rates(history: &[bandwidth::Model], direction: Direction, window_len: usize) -> Vec<f64> {
    if window_len < 2 || history.len() < window_len {
        return Vec::new();
    }

    history
        .windows(window_len)
        .map(|window| {
            let first = &window[0];
            let last = &window[window_len - 1];
            interval_rate(
                direction.counter(first),
                direction.counter(last),
                last.time - first.time,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(secs: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + TimeDelta::seconds(secs)
    }

    fn report(id: i64, time: f64, rx: i64, tx: i64, inserted: i64) -> bandwidth::Model {
        bandwidth::Model {
            id,
            link: 1,
            time,
            rx,
            tx,
            update_date: at(inserted),
        }
    }

    fn alive() -> TimeDelta {
        TimeDelta::seconds(5)
    }

    #[test]
    fn no_reports_is_zero() {
        assert_eq!(current_rate(&[], at(0), alive()), Rate::ZERO);
    }

    #[test]
    fn single_report_is_zero() {
        let latest = [report(1, 1.0, 1, 1, 0)];
        assert_eq!(current_rate(&latest, at(0), alive()), Rate::ZERO);
    }

    #[test]
    fn unit_rates() {
        let latest = [report(2, 2.0, 2, 2, 1), report(1, 1.0, 1, 1, 0)];
        assert_eq!(current_rate(&latest, at(1), alive()), Rate { rx: 1.0, tx: 1.0 });
    }

    #[test]
    fn different_rx_and_tx_rates() {
        let latest = [report(2, 3.0, 4, 20, 1), report(1, 1.0, 2, 10, 0)];
        assert_eq!(current_rate(&latest, at(1), alive()), Rate { rx: 1.0, tx: 5.0 });
    }

    #[test]
    fn only_the_two_newest_reports_count() {
        let latest = [
            report(3, 4.0, 14, 14, 2),
            report(2, 2.0, 10, 10, 1),
            report(1, 1.0, 0, 1000, 0),
        ];
        assert_eq!(current_rate(&latest, at(2), alive()), Rate { rx: 2.0, tx: 2.0 });
    }

    #[test]
    fn stale_link_is_zero() {
        let latest = [report(2, 3.0, 4, 20, 0), report(1, 1.0, 2, 10, 0)];
        assert_eq!(current_rate(&latest, at(6), alive()), Rate::ZERO);
    }

    #[test]
    fn report_exactly_at_threshold_is_alive() {
        let latest = [report(2, 3.0, 4, 20, 0), report(1, 1.0, 2, 10, 0)];
        assert_eq!(current_rate(&latest, at(5), alive()), Rate { rx: 1.0, tx: 5.0 });
    }

    #[test]
    fn equal_sender_times_yield_zero() {
        let latest = [report(2, 1.0, 4, 20, 1), report(1, 1.0, 2, 10, 0)];
        assert_eq!(current_rate(&latest, at(1), alive()), Rate::ZERO);
    }

    #[test]
    fn counter_rollback_clamps_to_zero() {
        let latest = [report(2, 3.0, 2, 10, 1), report(1, 1.0, 4, 20, 0)];
        assert_eq!(current_rate(&latest, at(1), alive()), Rate::ZERO);
    }

    #[test]
    fn rollback_in_one_direction_keeps_the_other() {
        let latest = [report(2, 3.0, 2, 30, 1), report(1, 1.0, 4, 20, 0)];
        assert_eq!(current_rate(&latest, at(1), alive()), Rate { rx: 0.0, tx: 5.0 });
    }

    #[test]
    fn sliding_pairs() {
        let history = [
            report(1, 1.0, 1, 0, 0),
            report(2, 2.0, 10, 0, 1),
            report(3, 3.0, 100, 0, 2),
        ];
        assert_eq!(windowed_rates(&history, Direction::Rx, 2), vec![9.0, 90.0]);
    }

    #[test]
    fn window_spans_first_to_last() {
        let history = [
            report(1, 1.0, 0, 1, 0),
            report(2, 2.0, 0, 10, 1),
            report(3, 3.0, 0, 100, 2),
            report(4, 5.0, 0, 101, 3),
        ];
        assert_eq!(windowed_rates(&history, Direction::Tx, 3), vec![49.5, 30.333333333333332]);
    }

    #[test]
    fn short_history_yields_nothing() {
        let history = [report(1, 1.0, 1, 1, 0), report(2, 2.0, 2, 2, 1)];
        assert!(windowed_rates(&history, Direction::Rx, 3).is_empty());
        assert!(windowed_rates(&[], Direction::Rx, 2).is_empty());
    }

    #[test]
    fn degenerate_window_yields_nothing() {
        let history = [report(1, 1.0, 1, 1, 0), report(2, 2.0, 2, 2, 1)];
        assert!(windowed_rates(&history, Direction::Rx, 1).is_empty());
        assert!(windowed_rates(&history, Direction::Rx, 0).is_empty());
    }

    #[test]
    fn windowed_rates_apply_zero_and_clamp_rules() {
        let history = [
            report(1, 1.0, 10, 0, 0),
            report(2, 1.0, 20, 0, 1),
            report(3, 2.0, 5, 0, 2),
        ];
        assert_eq!(windowed_rates(&history, Direction::Rx, 2), vec![0.0, 0.0]);
    }

    #[test]
    fn direction_parsing() {
        assert_eq!("rx".parse::<Direction>(), Ok(Direction::Rx));
        assert_eq!("tx".parse::<Direction>(), Ok(Direction::Tx));
        assert!("both".parse::<Direction>().is_err());
        assert_eq!(Direction::Tx.label(), "Sent");
    }
}
