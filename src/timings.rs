//! Explicit timing context and the SCF wall-time deadline.
//!
//! A [`Timings`] value is created when a run starts and passed by reference to
//! every stage that records spans. Labels use `/` to express nesting, e.g.
//! `scf/diagonalization`.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingSection {
    pub label: String,
    pub ncalls: u64,
    pub total_seconds: f64,
}

impl TimingSection {
    pub fn average_seconds(&self) -> f64 {
        if self.ncalls == 0 {
            0.0
        } else {
            self.total_seconds / self.ncalls as f64
        }
    }
}

#[derive(Debug, Clone)]
pub struct Timings {
    started: Instant,
    sections: Vec<TimingSection>,
}

/// Serialized form written to `timings.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingReport {
    pub elapsed_seconds: f64,
    pub sections: Vec<TimingSection>,
}

impl Default for Timings {
    fn default() -> Self {
        Self::new()
    }
}

impl Timings {
    pub fn new() -> Self {
        Timings {
            started: Instant::now(),
            sections: Vec::new(),
        }
    }

    pub fn record(&mut self, label: &str, elapsed: Duration) {
        match self.sections.iter_mut().find(|s| s.label == label) {
            Some(section) => {
                section.ncalls += 1;
                section.total_seconds += elapsed.as_secs_f64();
            }
            None => self.sections.push(TimingSection {
                label: label.to_string(),
                ncalls: 1,
                total_seconds: elapsed.as_secs_f64(),
            }),
        }
    }

    pub fn time<T>(&mut self, label: &str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.record(label, start.elapsed());
        out
    }

    pub fn section(&self, label: &str) -> Option<&TimingSection> {
        self.sections.iter().find(|s| s.label == label)
    }

    pub fn sections(&self) -> &[TimingSection] {
        &self.sections
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn report(&self) -> TimingReport {
        TimingReport {
            elapsed_seconds: self.elapsed().as_secs_f64(),
            sections: self.sections.clone(),
        }
    }

    pub fn render_table(&self) -> String {
        let width = self
            .sections
            .iter()
            .map(|s| s.label.len())
            .max()
            .unwrap_or(0)
            .max("Section".len());

        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<width$}  {:>8}  {:>12}  {:>12}",
            "Section", "ncalls", "total (s)", "avg (s)"
        );
        for section in &self.sections {
            let _ = writeln!(
                out,
                "{:<width$}  {:>8}  {:>12.4}  {:>12.6}",
                section.label,
                section.ncalls,
                section.total_seconds,
                section.average_seconds()
            );
        }
        let _ = write!(out, "Elapsed: {:.4} s", self.elapsed().as_secs_f64());
        out
    }
}

/// Cooperative wall-time budget; `None` means no cutoff at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    pub fn none() -> Self {
        Deadline { at: None }
    }

    pub fn after(budget: Duration) -> Self {
        Deadline {
            at: Instant::now().checked_add(budget),
        }
    }

    pub fn from_seconds(seconds: Option<u64>) -> Self {
        match seconds {
            Some(s) => Self::after(Duration::from_secs(s)),
            None => Self::none(),
        }
    }

    pub fn expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_accumulates_per_label() {
        let mut timings = Timings::new();
        timings.record("scf", Duration::from_millis(500));
        timings.record("scf", Duration::from_millis(250));
        timings.record("postscf", Duration::from_millis(100));

        let scf = timings.section("scf").unwrap();
        assert_eq!(scf.ncalls, 2);
        assert!((scf.total_seconds - 0.75).abs() < 1e-12);
        assert!((scf.average_seconds() - 0.375).abs() < 1e-12);
        let labels: Vec<&str> = timings.sections().iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["scf", "postscf"]);
    }

    #[test]
    fn time_returns_the_closure_value() {
        let mut timings = Timings::new();
        let value = timings.time("work", || 41 + 1);
        assert_eq!(value, 42);
        assert_eq!(timings.section("work").unwrap().ncalls, 1);
    }

    #[test]
    fn report_serializes_sections() {
        let mut timings = Timings::new();
        timings.record("build", Duration::from_secs(1));
        let json = serde_json::to_value(timings.report()).unwrap();
        assert_eq!(json["sections"][0]["label"], "build");
        assert_eq!(json["sections"][0]["ncalls"], 1);
    }

    #[test]
    fn table_lists_every_section() {
        let mut timings = Timings::new();
        timings.record("scf/diagonalization", Duration::from_millis(20));
        let table = timings.render_table();
        assert!(table.contains("scf/diagonalization"));
        assert!(table.starts_with("Section"));
    }

    #[test]
    fn missing_budget_never_expires() {
        let deadline = Deadline::from_seconds(None);
        assert_eq!(deadline, Deadline::none());
        assert!(!deadline.expired());
    }

    #[test]
    fn zero_budget_expires_immediately() {
        assert!(Deadline::from_seconds(Some(0)).expired());
    }

    #[test]
    fn huge_budget_does_not_overflow() {
        let deadline = Deadline::from_seconds(Some(u64::MAX));
        assert!(!deadline.expired());
    }
}
