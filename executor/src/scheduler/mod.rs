mod parallel;
mod serial;

pub use parallel::ParallelScheduler;
pub use serial::SerialScheduler;

/// Default execute-task count when the configured cap is zero.
pub fn optimal_parallelism() -> usize {
    num_cpus::get()
}
