//! Cache-control policies for responses that change while a job runs.

/// Job status and datadump parts must be revalidated before reuse.
pub const NO_CACHE_MUST_REVALIDATE: &str = "no-cache, must-revalidate";

/// Header tuple for job-tracking responses.
pub const fn job_tracking_header() -> (&'static str, &'static str) {
    ("Cache-Control", NO_CACHE_MUST_REVALIDATE)
}
