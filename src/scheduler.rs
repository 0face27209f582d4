//! Phased job scheduler.
//!
//! A build is a sequence of phases. Each phase is a bag of independent jobs
//! run on a fixed-size worker pool; [`Phase::wait`] is the barrier that
//! blocks until every job of the phase finished and reports either success
//! or every error that occurred:
//!
//! ```text
//! let mut phase = scheduler.phase("render");   // accepting jobs
//! phase.add_job("article: a.md", || ...);
//! phase.add_job("page: about.md", || ...);
//! let report = phase.wait()?;                  // running → barrier
//! ```
//!
//! Jobs run in no particular order and may run concurrently with each other.
//! A job returns `Ok(true)` when it did work, `Ok(false)` when it had
//! nothing to do. One failing job does not stop the others: the phase runs
//! to completion and the failure lists all of them. A panicking job is
//! reported as a failure of that job.
//!
//! Only `wait` can produce a [`PhaseReport`]. Readers that must see the
//! complete result of a phase take a `&PhaseReport` to prove the barrier
//! has been passed.

use crate::error::BuildError;
use crate::debug;
use parking_lot::Mutex;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

type Work<'a> = Box<dyn FnOnce() -> Result<bool, BuildError> + Send + 'a>;

/// Why a single job failed.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("{job}: {source}")]
    Failed {
        job: String,
        #[source]
        source: BuildError,
    },
    #[error("{job}: panicked: {message}")]
    Panicked { job: String, message: String },
}

impl JobError {
    /// Name of the job that failed.
    pub fn job(&self) -> &str {
        match self {
            Self::Failed { job, .. } | Self::Panicked { job, .. } => job,
        }
    }
}

/// Every error of a phase that did not complete cleanly.
#[derive(Error, Debug)]
#[error("phase `{phase}` failed: {} job error(s)", .errors.len())]
pub struct PhaseFailure {
    pub phase: String,
    pub errors: Vec<JobError>,
}

/// How many jobs of a phase did work and how many found nothing to do.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct JobStats {
    pub ran: u32,
    pub skipped: u32,
}

impl JobStats {
    pub fn total(&self) -> u32 {
        self.ran + self.skipped
    }
}

impl std::ops::Add for JobStats {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            ran: self.ran + other.ran,
            skipped: self.skipped + other.skipped,
        }
    }
}

impl fmt::Display for JobStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.skipped > 0 {
            write!(
                f,
                "{} rebuilt, {} unchanged ({} total)",
                self.ran,
                self.skipped,
                self.total()
            )
        } else {
            write!(f, "{} rebuilt", self.ran)
        }
    }
}

/// Proof that a phase ran to completion without errors.
#[derive(Debug)]
pub struct PhaseReport {
    phase: String,
    stats: JobStats,
    ran: Vec<String>,
    elapsed: Duration,
}

impl PhaseReport {
    pub fn phase(&self) -> &str {
        &self.phase
    }

    pub fn stats(&self) -> JobStats {
        self.stats
    }

    /// Names of the jobs that returned `Ok(true)`, sorted.
    pub fn ran(&self) -> &[String] {
        &self.ran
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// Owns the worker pool that every phase runs on.
pub struct Scheduler {
    pool: rayon::ThreadPool,
}

impl Scheduler {
    pub fn new(concurrency: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(concurrency.max(1))
            .thread_name(|i| format!("inkpress-worker-{i}"))
            .build()?;
        Ok(Self { pool })
    }

    pub fn concurrency(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Open a new phase that accepts jobs.
    pub fn phase<'a>(&'a self, name: impl Into<String>) -> Phase<'a> {
        Phase {
            pool: &self.pool,
            name: name.into(),
            jobs: Vec::new(),
        }
    }
}

/// A phase in its accepting state.
pub struct Phase<'a> {
    pool: &'a rayon::ThreadPool,
    name: String,
    jobs: Vec<(String, Work<'a>)>,
}

impl<'a> Phase<'a> {
    pub fn add_job<F>(&mut self, name: impl Into<String>, work: F)
    where
        F: FnOnce() -> Result<bool, BuildError> + Send + 'a,
    {
        self.jobs.push((name.into(), Box::new(work)));
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Run every job and block until all of them finished.
    pub fn wait(self) -> Result<PhaseReport, PhaseFailure> {
        let started = Instant::now();
        let errors: Mutex<Vec<JobError>> = Mutex::new(Vec::new());
        let ran_names: Mutex<Vec<String>> = Mutex::new(Vec::new());
        let ran = AtomicU32::new(0);
        let skipped = AtomicU32::new(0);

        self.pool.scope(|scope| {
            for (name, work) in self.jobs {
                let errors = &errors;
                let ran_names = &ran_names;
                let ran = &ran;
                let skipped = &skipped;
                scope.spawn(move |_| {
                    let job_started = Instant::now();
                    match panic::catch_unwind(AssertUnwindSafe(work)) {
                        Ok(Ok(true)) => {
                            debug!("job"; "{name}: rebuilt in {:?}", job_started.elapsed());
                            ran.fetch_add(1, Ordering::Relaxed);
                            ran_names.lock().push(name);
                        }
                        Ok(Ok(false)) => {
                            debug!("job"; "{name}: unchanged");
                            skipped.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(Err(source)) => {
                            errors.lock().push(JobError::Failed { job: name, source });
                        }
                        Err(payload) => {
                            errors.lock().push(JobError::Panicked {
                                job: name,
                                message: panic_message(payload.as_ref()),
                            });
                        }
                    }
                });
            }
        });

        let mut errors = errors.into_inner();
        if !errors.is_empty() {
            errors.sort_by(|a, b| a.job().cmp(b.job()));
            return Err(PhaseFailure {
                phase: self.name,
                errors,
            });
        }

        let mut ran_names = ran_names.into_inner();
        ran_names.sort();
        Ok(PhaseReport {
            phase: self.name,
            stats: JobStats {
                ran: ran.into_inner(),
                skipped: skipped.into_inner(),
            },
            ran: ran_names,
            elapsed: started.elapsed(),
        })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn empty_phase_succeeds() {
        let scheduler = Scheduler::new(2).unwrap();
        let report = scheduler.phase("empty").wait().unwrap();
        assert_eq!(report.stats(), JobStats::default());
        assert_eq!(report.phase(), "empty");
    }

    #[test]
    fn every_job_runs_before_wait_returns() {
        let scheduler = Scheduler::new(4).unwrap();
        let counter = AtomicUsize::new(0);

        let mut phase = scheduler.phase("count");
        for i in 0..50 {
            let counter = &counter;
            phase.add_job(format!("job {i}"), move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            });
        }
        let report = phase.wait().unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 50);
        assert_eq!(report.stats().ran, 50);
        assert_eq!(report.ran().len(), 50);
    }

    #[test]
    fn skipped_jobs_are_counted_separately() {
        let scheduler = Scheduler::new(2).unwrap();
        let mut phase = scheduler.phase("mixed");
        phase.add_job("a", || Ok(true));
        phase.add_job("b", || Ok(false));
        phase.add_job("c", || Ok(false));
        let report = phase.wait().unwrap();

        assert_eq!(report.stats(), JobStats { ran: 1, skipped: 2 });
        assert_eq!(report.ran(), ["a"]);
    }

    #[test]
    fn all_errors_are_collected() {
        let scheduler = Scheduler::new(3).unwrap();
        let finished = AtomicUsize::new(0);

        let mut phase = scheduler.phase("render");
        phase.add_job("bad one", || Err(BuildError::validation("x.md", "missing title")));
        phase.add_job("bad two", || Err(BuildError::parse("y.md", "bad toml")));
        for i in 0..5 {
            let finished = &finished;
            phase.add_job(format!("good {i}"), move || {
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            });
        }
        let failure = phase.wait().unwrap_err();

        assert_eq!(failure.phase, "render");
        assert_eq!(failure.errors.len(), 2);
        assert_eq!(failure.errors[0].job(), "bad one");
        assert_eq!(failure.errors[1].job(), "bad two");
        // No short-circuit: the healthy jobs still ran
        assert_eq!(finished.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn panicking_job_becomes_job_error() {
        let scheduler = Scheduler::new(2).unwrap();
        let mut phase = scheduler.phase("p");
        phase.add_job("boom", || panic!("exploded"));
        phase.add_job("fine", || Ok(true));
        let failure = phase.wait().unwrap_err();

        assert_eq!(failure.errors.len(), 1);
        match &failure.errors[0] {
            JobError::Panicked { job, message } => {
                assert_eq!(job, "boom");
                assert_eq!(message, "exploded");
            }
            other => panic!("expected panic error, got {other:?}"),
        }
    }

    #[test]
    fn phases_are_sequential() {
        let scheduler = Scheduler::new(4).unwrap();
        let first_done = AtomicUsize::new(0);

        let mut first = scheduler.phase("first");
        for _ in 0..20 {
            let first_done = &first_done;
            first.add_job("w", move || {
                std::thread::sleep(Duration::from_millis(1));
                first_done.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            });
        }
        first.wait().unwrap();

        let seen = AtomicUsize::new(0);
        let mut second = scheduler.phase("second");
        second.add_job("r", || {
            seen.store(first_done.load(Ordering::SeqCst), Ordering::SeqCst);
            Ok(true)
        });
        second.wait().unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn failure_message_counts_errors() {
        let scheduler = Scheduler::new(1).unwrap();
        let mut phase = scheduler.phase("render");
        phase.add_job("a", || Err(BuildError::render("a.html", "oops")));
        let failure = phase.wait().unwrap_err();
        assert_eq!(failure.to_string(), "phase `render` failed: 1 job error(s)");
        assert_eq!(
            failure.errors[0].to_string(),
            "a: render error in a.html: oops"
        );
    }

    #[test]
    fn job_stats_display() {
        assert_eq!(JobStats { ran: 3, skipped: 0 }.to_string(), "3 rebuilt");
        assert_eq!(
            JobStats { ran: 1, skipped: 4 }.to_string(),
            "1 rebuilt, 4 unchanged (5 total)"
        );
    }

    #[test]
    fn job_stats_add() {
        let total = JobStats { ran: 1, skipped: 2 } + JobStats { ran: 3, skipped: 4 };
        assert_eq!(total, JobStats { ran: 4, skipped: 6 });
    }
}
