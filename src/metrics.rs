//! Request metrics as collected by Goose, reduced to what the thresholds need.
//!
//! Goose counts a request as failed when it isn't a 2xx, or when a transaction
//! flags it with `set_failure` after a check failed. The `http_req_failed`
//! threshold only cares about the transport: no response at all, or a status
//! of 400 and above. It is therefore derived from Goose's per-status-code
//! counters rather than from its fail counts.

use goose::metrics::{GooseMetrics, GooseRequestMetricAggregate};
use num_format::{Locale, ToFormattedString};
use std::collections::BTreeMap;
use std::fmt;

/// Whether a completed request counts as failed.
///
/// `status_code` is `0` when no response was received.
pub fn request_failed(status_code: u16) -> bool {
    status_code == 0 || status_code >= 400
}

/// Timings and status codes of one request, or of several folded together.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestStats {
    /// Response time in milliseconds, as rounded by Goose, -> number of responses.
    pub times: BTreeMap<usize, usize>,
    /// Fastest response, not rounded.
    pub minimum_time: usize,
    /// Slowest response, not rounded.
    pub maximum_time: usize,
    /// Sum of all response times.
    pub total_time: usize,
    /// Number of timed requests.
    pub counter: usize,
    /// Status code -> number of responses, `0` meaning no response.
    pub status_code_counts: BTreeMap<u16, usize>,
}

impl From<&GooseRequestMetricAggregate> for RequestStats {
    fn from(request: &GooseRequestMetricAggregate) -> Self {
        RequestStats {
            times: request.raw_data.times.clone(),
            minimum_time: request.raw_data.minimum_time,
            maximum_time: request.raw_data.maximum_time,
            total_time: request.raw_data.total_time,
            counter: request.raw_data.counter,
            status_code_counts: request
                .status_code_counts
                .iter()
                .map(|(status_code, count)| (*status_code, *count))
                .collect(),
        }
    }
}

impl RequestStats {
    pub fn count(&self) -> usize {
        self.counter
    }

    /// Number of responses with a status code, failed or not.
    pub fn status_count(&self) -> usize {
        self.status_code_counts.values().sum()
    }

    /// Number of responses counted as failed by [`request_failed`].
    pub fn failed_count(&self) -> usize {
        self.status_code_counts
            .iter()
            .filter(|(status_code, _)| request_failed(**status_code))
            .map(|(_, count)| count)
            .sum()
    }

    pub fn merge(&mut self, other: &RequestStats) {
        if other.counter > 0 {
            if self.counter == 0 || other.minimum_time < self.minimum_time {
                self.minimum_time = other.minimum_time;
            }
            self.maximum_time = self.maximum_time.max(other.maximum_time);
            self.total_time += other.total_time;
            self.counter += other.counter;
            for (time, count) in &other.times {
                *self.times.entry(*time).or_insert(0) += count;
            }
        }
        for (status_code, count) in &other.status_code_counts {
            *self.status_code_counts.entry(*status_code).or_insert(0) += count;
        }
    }

    pub fn average_time(&self) -> f64 {
        match self.counter {
            0 => 0.0,
            counter => self.total_time as f64 / counter as f64,
        }
    }

    /// Response time under which `percent` of the requests completed.
    ///
    /// Walks the rounded histogram the way Goose's report does, clamping the
    /// result to the observed minimum and maximum.
    pub fn percentile(&self, percent: f64) -> usize {
        let percentile_request = (self.counter as f64 * percent).round() as usize;

        let mut total_count: usize = 0;
        for (value, counter) in &self.times {
            total_count += counter;
            if total_count >= percentile_request {
                return (*value).clamp(self.minimum_time, self.maximum_time);
            }
        }
        0
    }
}

/// Every request of a finished run, keyed the way Goose keys them, ie
/// `POST /api/public/login`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestSummary {
    pub requests: BTreeMap<String, RequestStats>,
}

impl RequestSummary {
    /// Copy the request metrics returned by [`GooseAttack::execute`](goose::GooseAttack::execute).
    pub fn from_metrics(metrics: &GooseMetrics) -> Self {
        let requests: BTreeMap<String, RequestStats> = metrics
            .requests
            .iter()
            .map(|(key, request)| (key.clone(), RequestStats::from(request)))
            .collect();
        if requests.values().any(|request| request.counter > request.status_count()) {
            warn!("status codes are missing from the Goose metrics, request failures are undercounted");
        }
        RequestSummary { requests }
    }

    /// All requests folded together.
    pub fn aggregate(&self) -> RequestStats {
        let mut aggregate = RequestStats::default();
        for request in self.requests.values() {
            aggregate.merge(request);
        }
        aggregate
    }

    /// Fraction of failed requests, `None` if nothing was requested.
    pub fn failed_rate(&self) -> Option<f64> {
        let aggregate = self.aggregate();
        match aggregate.status_count() {
            0 => None,
            count => Some(aggregate.failed_count() as f64 / count as f64),
        }
    }
}

impl fmt::Display for RequestSummary {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.requests.is_empty() {
            return Ok(());
        }

        writeln!(
            fmt,
            "\n === REQUEST DURATIONS ===\n ------------------------------------------------------------------------------"
        )?;
        writeln!(
            fmt,
            " {:<24} | {:>10} | {:>10} | {:>8} | {:>8} | {:>8}",
            "Name", "# reqs", "# fails", "avg", "p95", "max"
        )?;
        writeln!(
            fmt,
            " ------------------------------------------------------------------------------"
        )?;
        let aggregate = self.aggregate();
        let rows = self
            .requests
            .iter()
            .map(|(name, request)| (name.as_str(), request))
            .chain(std::iter::once(("Aggregated", &aggregate)));
        for (name, request) in rows {
            writeln!(
                fmt,
                " {:<24} | {:>10} | {:>10} | {:>8.2} | {:>8} | {:>8}",
                name,
                request.count().to_formatted_string(&Locale::en),
                request.failed_count().to_formatted_string(&Locale::en),
                request.average_time(),
                request.percentile(0.95).to_formatted_string(&Locale::en),
                request.maximum_time.to_formatted_string(&Locale::en),
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
impl RequestStats {
    /// `count` requests of `time` milliseconds, all answered with `status_code`.
    pub(crate) fn uniform(time: usize, status_code: u16, count: usize) -> Self {
        RequestStats {
            times: BTreeMap::from([(time, count)]),
            minimum_time: time,
            maximum_time: time,
            total_time: time * count,
            counter: count,
            status_code_counts: BTreeMap::from([(status_code, count)]),
        }
    }
}
